use document_store::{DocumentStoreConfig, validate_collection};
use http::HeaderName;
use record_fetcher::config::UpstreamConfig;
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("Shared secret cannot be empty")]
    EmptySharedSecret,

    #[error("Invalid secret header name: {0}")]
    InvalidSecretHeader(String),

    #[error("Webhook path must start with '/': {0}")]
    InvalidPath(String),

    #[error("Invalid collection name: {0:?}")]
    InvalidCollection(String),

    #[error("Events and records must use different collections")]
    SameCollection,
}

fn default_path() -> String {
    "/".into()
}

fn default_secret_header() -> String {
    "x-webhook-secret".into()
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    pub host: String,
    pub port: u16,
}

impl Listener {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Collections {
    /// Append-only log of every accepted delivery.
    pub events: String,
    /// One reconciled record per identifier.
    pub records: String,
}

impl Default for Collections {
    fn default() -> Self {
        Collections {
            events: "events".into(),
            records: "records".into(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Listener for webhook deliveries
    pub listener: Listener,
    /// Listener for health and readiness probes
    pub admin_listener: Listener,
    /// Route that accepts deliveries
    #[serde(default = "default_path")]
    pub path: String,
    /// Header carrying the pre-shared secret
    #[serde(default = "default_secret_header")]
    pub secret_header: String,
    pub shared_secret: String,
    #[serde(default)]
    pub collections: Collections,
    pub upstream: UpstreamConfig,
    pub store: DocumentStoreConfig,
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        self.admin_listener.validate()?;

        if self.shared_secret.is_empty() {
            return Err(ValidationError::EmptySharedSecret);
        }

        self.secret_header_name()?;

        if !self.path.starts_with('/') {
            return Err(ValidationError::InvalidPath(self.path.clone()));
        }

        for name in [&self.collections.events, &self.collections.records] {
            validate_collection(name)
                .map_err(|_| ValidationError::InvalidCollection(name.clone()))?;
        }
        if self.collections.events == self.collections.records {
            return Err(ValidationError::SameCollection);
        }

        Ok(())
    }

    pub fn secret_header_name(&self) -> Result<HeaderName, ValidationError> {
        HeaderName::try_from(self.secret_header.as_str())
            .map_err(|_| ValidationError::InvalidSecretHeader(self.secret_header.clone()))
    }
}
