// API server implementation using actix-web

use crate::api::handlers::ApiError;
use crate::api::image::ImageProxy;
use crate::api::{middleware, routes};
use crate::config::AppConfig;
use crate::fetch::{CachePolicy, ProductCatalog};
use crate::upstream::{ProductSource, ProductsClient};
use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared state handed to every worker.
pub struct AppState {
    pub source: Option<Arc<dyn ProductSource>>,
    pub catalog: Option<ProductCatalog>,
    pub images: ImageProxy,
    pub site_url: Option<String>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        source: Option<Arc<dyn ProductSource>>,
        policy: CachePolicy,
        images: ImageProxy,
        site_url: Option<String>,
    ) -> Self {
        let catalog = source
            .as_ref()
            .map(|source| ProductCatalog::new(Arc::clone(source), policy));
        Self {
            source,
            catalog,
            images,
            site_url,
            started_at: Instant::now(),
        }
    }

    /// The catalog, or the "not configured" error when the upstream
    /// credentials are missing.
    pub fn catalog(&self) -> Result<&ProductCatalog, ApiError> {
        self.catalog.as_ref().ok_or(ApiError::NotConfigured)
    }
}

pub struct ApiServer {
    config: AppConfig,
}

impl ApiServer {
    pub fn from_config(config: AppConfig) -> Self {
        Self { config }
    }

    /// Create server from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self::from_config(AppConfig::from_env()?))
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    fn build_state(&self) -> Result<AppState> {
        let source: Option<Arc<dyn ProductSource>> = match &self.config.upstream {
            Some(upstream) => {
                let client = ProductsClient::new(
                    &upstream.base_url,
                    &upstream.api_key,
                    Some(upstream.timeout_secs),
                )
                .context("Failed to build products API client")?;
                Some(Arc::new(client))
            }
            None => None,
        };
        let timeout = self
            .config
            .upstream
            .as_ref()
            .map(|u| u.timeout_secs)
            .unwrap_or(15);
        Ok(AppState::new(
            source,
            self.config.cache,
            ImageProxy::new(timeout)?,
            self.config.site_url.clone(),
        ))
    }

    /// Evict unobserved cache entries on a fixed interval.
    fn spawn_sweeper(catalog: ProductCatalog, every: Duration) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let evicted = catalog.sweep();
                if evicted > 0 {
                    tracing::debug!(evicted, "cache sweep");
                }
            }
        });
    }

    /// Start the HTTP server
    pub async fn run(self) -> Result<()> {
        let bind_addr = self.config.bind_addr();
        self.config.log_snapshot();

        let state = web::Data::new(self.build_state()?);
        if let Some(catalog) = state.catalog.clone() {
            Self::spawn_sweeper(catalog, self.config.sweep_interval);
        }

        tracing::info!(
            host = %self.config.host,
            port = %self.config.port,
            "Starting takonbini API server"
        );

        let allowed_origins = self.config.allowed_origins.clone();

        HttpServer::new(move || {
            let (logger, compress) = middleware::setup_middleware();
            let cors = middleware::setup_cors(&allowed_origins);

            App::new()
                .app_data(state.clone())
                .wrap(logger)
                .wrap(compress)
                .wrap(cors)
                .configure(routes::configure_routes)
        })
        .bind(&bind_addr)
        .with_context(|| format!("Failed to bind to {}", bind_addr))?
        .run()
        .await
        .context("HTTP server error")?;

        Ok(())
    }
}
