// Image proxy: fetches remote product images so the storefront can serve
// them from its own origin with long-lived cache headers.

use anyhow::Context;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub const USER_AGENT: &str = "TakonbiniImageProxy/1.0";

/// One day in browsers, seven days at the edge.
pub const IMAGE_CACHE_CONTROL: &str =
    "public, max-age=86400, s-maxage=604800, stale-while-revalidate=86400";

/// Upstream response headers copied onto the proxied response.
pub const PASSTHROUGH_HEADERS: [&str; 3] = ["content-type", "etag", "last-modified"];

/// Rejections of the `url` query parameter; the message is the response body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImageRequestError {
    #[error("Missing url parameter")]
    Missing,
    #[error("Invalid url parameter")]
    Invalid,
    #[error("Unsupported protocol")]
    UnsupportedProtocol,
}

pub fn parse_target(raw: Option<&str>) -> Result<Url, ImageRequestError> {
    let raw = raw.filter(|s| !s.is_empty()).ok_or(ImageRequestError::Missing)?;
    let url = Url::parse(raw).map_err(|_| ImageRequestError::Invalid)?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        _ => Err(ImageRequestError::UnsupportedProtocol),
    }
}

#[derive(Debug, Clone)]
pub struct ImageProxy {
    http: Client,
}

impl ImageProxy {
    pub fn new(timeout_secs: u64) -> anyhow::Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()
            .context("build image proxy client")?;
        Ok(Self { http })
    }

    /// Issue the upstream request. The body is left unread so the caller can
    /// stream it through.
    pub async fn fetch(&self, target: &Url) -> Result<reqwest::Response, reqwest::Error> {
        self.http.get(target.clone()).send().await
    }
}
