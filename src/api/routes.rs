// API route configuration

use crate::api::handlers;
use actix_web::web;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(handlers::health_check))
        .route("/", web::get().to(handlers::health_check))
        .route("/sitemap.xml", web::get().to(handlers::sitemap_xml))
        .service(
            web::scope("/api")
                .route("/products", web::get().to(handlers::list_products))
                .route("/products/{id}", web::get().to(handlers::get_product))
                .route("/image", web::get().to(handlers::proxy_image)),
        );
}
