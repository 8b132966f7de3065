use crate::reconcile::ReconcileError;
use document_store::StoreError;
use hyper::StatusCode;
use record_fetcher::FetchError;
use thiserror::Error;

/// Errors that can occur while handling a webhook delivery
#[derive(Error, Debug)]
pub enum WebhookError {
    #[error("missing or invalid webhook secret")]
    Unauthorized,

    #[error("failed to read request body: {0}")]
    RequestBodyError(String),

    #[error("invalid webhook payload: {0}")]
    InvalidPayload(String),

    #[error("upstream fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("upstream returned record {received} when asked for {requested}")]
    RecordMismatch { requested: String, received: String },

    #[error("stored record could not be decoded: {0}")]
    StoredRecord(serde_json::Error),

    #[error("reconciliation failed: {0}")]
    Reconcile(#[from] ReconcileError),

    #[error("document could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("persistence failed: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WebhookError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            WebhookError::Unauthorized => StatusCode::UNAUTHORIZED,
            WebhookError::RequestBodyError(_) | WebhookError::InvalidPayload(_) => {
                StatusCode::BAD_REQUEST
            }
            WebhookError::Fetch(_) | WebhookError::RecordMismatch { .. } => StatusCode::BAD_GATEWAY,
            WebhookError::Reconcile(_) => StatusCode::UNPROCESSABLE_ENTITY,
            WebhookError::StoredRecord(_)
            | WebhookError::Encode(_)
            | WebhookError::Store(_)
            | WebhookError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short label used to tag failure metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            WebhookError::Unauthorized => "unauthorized",
            WebhookError::RequestBodyError(_) | WebhookError::InvalidPayload(_) => "payload",
            WebhookError::Fetch(_) | WebhookError::RecordMismatch { .. } => "upstream",
            WebhookError::Reconcile(_) => "reconcile",
            WebhookError::StoredRecord(_) | WebhookError::Encode(_) | WebhookError::Store(_) => {
                "store"
            }
            WebhookError::Io(_) => "io",
        }
    }
}
