// HTTP request handlers for API endpoints

use crate::api::image::{self, IMAGE_CACHE_CONTROL, PASSTHROUGH_HEADERS};
use crate::api::models::*;
use crate::api::server::AppState;
use crate::catalog::query::{self, PARAM_CURSOR};
use crate::catalog::{AllowedValues, SearchParams, DEFAULT_PAGE_LIMIT};
use crate::error::{FetchError, ValidationError};
use crate::sitemap;
use actix_web::http::{header, StatusCode};
use actix_web::{web, HttpRequest, HttpResponse, ResponseError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Upstream credentials are not configured.
    #[error("Unknown Error")]
    NotConfigured,
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotConfigured => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Fetch(FetchError::Validation(_)) => StatusCode::BAD_REQUEST,
            ApiError::Fetch(FetchError::Upstream(err)) => err
                .http_status()
                .and_then(|s| StatusCode::from_u16(s).ok())
                .filter(|s| s.is_client_error() || s.is_server_error())
                .unwrap_or(StatusCode::BAD_GATEWAY),
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            ApiError::NotConfigured => HttpResponse::InternalServerError()
                .content_type("text/plain; charset=utf-8")
                .body(self.to_string()),
            ApiError::Fetch(FetchError::Validation(err)) => {
                HttpResponse::BadRequest().json(ApiResponse::failure(
                    err.to_string(),
                    ErrorDetail {
                        code: "invalid_filters".to_string(),
                        message: err.to_string(),
                        field: validation_field(err),
                    },
                ))
            }
            ApiError::Fetch(FetchError::Upstream(err)) => HttpResponse::build(self.status_code())
                .json(ApiResponse::<()>::error(err.to_string())),
        }
    }
}

fn validation_field(err: &ValidationError) -> Option<String> {
    match err {
        ValidationError::NonIntegerPrice { bound, .. }
        | ValidationError::NegativePrice { bound, .. } => Some(bound.to_string()),
        ValidationError::InvertedPriceRange { .. } => None,
    }
}

/// Health check endpoint
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let (listings, products) = state
        .catalog
        .as_ref()
        .map(|c| (c.page_cache().len(), c.product_cache().len()))
        .unwrap_or((0, 0));

    let response = ApiResponse::success(HealthResponse {
        status: "healthy".to_string(),
        upstream: if state.catalog.is_some() {
            "configured"
        } else {
            "missing"
        }
        .to_string(),
        cached_listings: listings,
        cached_products: products,
        uptime_seconds: state.started_at.elapsed().as_secs(),
    });

    HttpResponse::Ok().json(response)
}

/// One listing page. Filters use the storefront's URL parameters; `cursor`
/// selects a later page.
pub async fn list_products(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let catalog = state.catalog()?;
    let params = SearchParams::from_query(req.query_string());
    let mut criteria = query::decode(&params, &AllowedValues::default());
    criteria.limit.get_or_insert(DEFAULT_PAGE_LIMIT);
    let cursor = params.get(PARAM_CURSOR).filter(|c| !c.is_empty());

    tracing::debug!(key = %criteria.key(), cursor = ?cursor, "listing request");

    let _observer = catalog.observe(&criteria);
    let page = catalog.page(&criteria, cursor).await.map_err(|err| {
        if let FetchError::Upstream(upstream) = &err {
            tracing::warn!(error = %upstream, "listing request failed upstream");
        }
        ApiError::from(err)
    })?;

    Ok(HttpResponse::Ok().json(page))
}

pub async fn get_product(
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let catalog = state.catalog()?;
    let product = catalog.product(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(product))
}

/// Stream a remote image through this origin.
pub async fn proxy_image(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    let params = SearchParams::from_query(req.query_string());
    let target = match image::parse_target(params.get("url")) {
        Ok(url) => url,
        Err(err) => {
            return HttpResponse::BadRequest()
                .content_type("text/plain; charset=utf-8")
                .body(err.to_string())
        }
    };

    let upstream = match state.images.fetch(&target).await {
        Ok(resp) => resp,
        Err(err) => {
            tracing::warn!(url = %target, error = %err, "image fetch failed");
            return HttpResponse::BadGateway()
                .content_type("text/plain; charset=utf-8")
                .body("Upstream image fetch failed");
        }
    };

    let status =
        StatusCode::from_u16(upstream.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    let copied: Vec<(&'static str, String)> = PASSTHROUGH_HEADERS
        .iter()
        .filter_map(|name| {
            let value = upstream.headers().get(*name)?.to_str().ok()?;
            Some((*name, value.to_string()))
        })
        .collect();

    let mut builder = HttpResponse::build(status);
    for (name, value) in copied {
        builder.insert_header((name, value));
    }
    builder.insert_header((header::CACHE_CONTROL, IMAGE_CACHE_CONTROL));
    builder.streaming(upstream.bytes_stream())
}

pub async fn sitemap_xml(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    let host = req.connection_info().host().to_string();
    let site_url = sitemap::resolve_site_url(state.site_url.as_deref(), &host);

    let ids = match &state.source {
        Some(source) => sitemap::collect_product_ids(source.as_ref()).await,
        None => Vec::new(),
    };

    HttpResponse::Ok()
        .content_type("application/xml; charset=utf-8")
        .body(sitemap::build_sitemap_xml(&site_url, &ids))
}
