//! Management of the upstream webhook subscriptions that feed the receiver.

use crate::client::{FetchError, UpstreamClient, check_status};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// The only event type the upstream API currently emits.
pub const APP_COMPLETED_EVENT: &str = "catalog.app.completed";

/// Catalog wildcard accepted by the upstream API.
pub const ALL_CATALOGS: &str = "all";

/// A registered webhook as reported by the upstream API.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Webhook {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub events: Vec<String>,
    #[serde(default)]
    pub catalogs: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookRegistration {
    pub url: String,
    pub events: Vec<String>,
    pub catalogs: Vec<String>,
    /// Headers the upstream will send with every delivery, e.g. the shared secret.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_headers: BTreeMap<String, String>,
}

impl WebhookRegistration {
    /// A registration for app completion events. An empty `catalogs` means every catalog.
    pub fn new(url: String, catalogs: Vec<String>) -> Self {
        let catalogs = if catalogs.is_empty() {
            vec![ALL_CATALOGS.to_string()]
        } else {
            catalogs
        };

        WebhookRegistration {
            url,
            events: vec![APP_COMPLETED_EVENT.to_string()],
            catalogs,
            custom_headers: BTreeMap::new(),
        }
    }

    pub fn with_header<K: Into<String>, V: Into<String>>(mut self, name: K, value: V) -> Self {
        self.custom_headers.insert(name.into(), value.into());
        self
    }
}

impl UpstreamClient {
    pub async fn list_webhooks(&self) -> Result<Vec<Webhook>, FetchError> {
        let url = self.url(["webhooks"])?;
        let response = check_status(self.http().get(url).send().await?).await?;
        Ok(response.json().await?)
    }

    /// Returns the upstream's description of the new webhook.
    pub async fn register_webhook(
        &self,
        registration: &WebhookRegistration,
    ) -> Result<Value, FetchError> {
        let url = self.url(["webhooks"])?;
        let response = self.http().post(url).json(registration).send().await?;
        let response = check_status(response).await?;

        tracing::info!(url = %registration.url, catalogs = ?registration.catalogs, "Registered webhook");
        Ok(response.json().await?)
    }

    pub async fn unregister_webhook(&self, id: &str) -> Result<(), FetchError> {
        let url = self.url(["webhooks", id])?;
        check_status(self.http().delete(url).send().await?).await?;

        tracing::info!(id, "Unregistered webhook");
        Ok(())
    }

    /// Removes every registered webhook and returns how many were removed.
    pub async fn unregister_all_webhooks(&self) -> Result<usize, FetchError> {
        let webhooks = self.list_webhooks().await?;
        for webhook in &webhooks {
            self.unregister_webhook(&webhook.id).await?;
        }
        Ok(webhooks.len())
    }
}
