use chrono::{DateTime, SecondsFormat, Utc};
use record_fetcher::UserType;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The fields of an inbound delivery that the receiver acts on.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    pub record: String,
    pub catalog: String,
    pub app: String,
    pub user_type: UserType,
}

/// An accepted delivery, stamped with its arrival time. Stored append-only.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub record: String,
    pub catalog: String,
    pub app: String,
    pub user_type: UserType,
    pub received_at: String,
    /// The delivery body exactly as received.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub payload: Value,
}

impl Event {
    pub fn new(payload: WebhookPayload, raw: Value, received_at: DateTime<Utc>) -> Self {
        Event {
            record: payload.record,
            catalog: payload.catalog,
            app: payload.app,
            user_type: payload.user_type,
            received_at: format_timestamp(received_at),
            payload: raw,
        }
    }

    pub fn received_now(payload: WebhookPayload, raw: Value) -> Self {
        Event::new(payload, raw, Utc::now())
    }
}

/// ISO-8601, UTC, millisecond precision, `Z` suffix.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}
