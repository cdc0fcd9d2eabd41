//! Error types for the catalog API client.

use crate::query::Retryable;

#[derive(Debug, thiserror::Error)]
pub enum CatalogApiError {
    #[error("{resource} not found")]
    NotFound { resource: String },
    #[error("catalog returned HTTP {status} for {url}")]
    Status { status: u16, url: String },
    #[error("Failed to parse response")]
    ParseFailed {
        status: u16,
        url: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("catalog request failed")]
    Transport(#[from] reqwest::Error),
    #[error(transparent)]
    RequestFailed(#[from] anyhow::Error),
}

impl CatalogApiError {
    /// Whether this error is worth another attempt: transport failures,
    /// server errors and throttling. A 404 or a malformed body will not
    /// change on retry.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::NotFound { .. } | Self::ParseFailed { .. } => false,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::Transport(e) => !e.is_builder() && !e.is_decode(),
            Self::RequestFailed(_) => true,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl Retryable for CatalogApiError {
    fn is_retryable(&self) -> bool {
        self.is_transient()
    }
}
