//! Error types shared by the catalog, the fetch layer and the HTTP surface.

use thiserror::Error;

/// Maximum number of characters of an upstream response body kept for logs.
pub const MAX_LOGGED_BODY: usize = 2000;

/// Which price bound a validation error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceBound {
    Min,
    Max,
}

impl std::fmt::Display for PriceBound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PriceBound::Min => f.write_str("minPrice"),
            PriceBound::Max => f.write_str("maxPrice"),
        }
    }
}

/// Invalid filter input. Blocks submission and never reaches the network.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{bound} must be a whole number, got {value}")]
    NonIntegerPrice { bound: PriceBound, value: f64 },

    #[error("{bound} must not be negative, got {value}")]
    NegativePrice { bound: PriceBound, value: f64 },

    #[error("minPrice {min} is greater than maxPrice {max}")]
    InvertedPriceRange { min: f64, max: f64 },
}

impl ValidationError {
    /// True for the errors the filter panel reports with the "whole number" message.
    pub fn is_integer_error(&self) -> bool {
        matches!(
            self,
            ValidationError::NonIntegerPrice { .. } | ValidationError::NegativePrice { .. }
        )
    }
}

/// Failure talking to the upstream product API.
///
/// Cloneable so a single in-flight request can hand the same failure to every
/// caller waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpstreamError {
    #[error("upstream transport error: {0}")]
    Transport(String),

    #[error("upstream responded with status {status}")]
    Status { status: u16, body: String },

    #[error("upstream payload could not be decoded: {0}")]
    Decode(String),
}

impl UpstreamError {
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        let mut body = body.into();
        if body.chars().count() > MAX_LOGGED_BODY {
            body = body.chars().take(MAX_LOGGED_BODY).collect();
        }
        UpstreamError::Status { status, body }
    }

    /// Upstream HTTP status, when the failure carried one.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            UpstreamError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            UpstreamError::Decode(err.to_string())
        } else {
            UpstreamError::Transport(err.to_string())
        }
    }
}

/// Error returned by the fetch controller.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_body_is_truncated() {
        let err = UpstreamError::status(503, "x".repeat(MAX_LOGGED_BODY + 50));
        match err {
            UpstreamError::Status { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body.len(), MAX_LOGGED_BODY);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn validation_messages_name_the_bound() {
        let err = ValidationError::NonIntegerPrice {
            bound: PriceBound::Min,
            value: 1.5,
        };
        assert_eq!(err.to_string(), "minPrice must be a whole number, got 1.5");
        assert!(err.is_integer_error());
        assert!(!ValidationError::InvertedPriceRange { min: 5.0, max: 1.0 }.is_integer_error());
    }
}
