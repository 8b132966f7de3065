use crate::config::Collections;
use crate::errors::WebhookError;
use crate::event::{Event, WebhookPayload};
use crate::metrics_defs::WEBHOOK_PERSISTED;
use crate::reconcile::reconcile;
use crate::record_locks::RecordLocks;
use document_store::{DocumentStore, Filter};
use record_fetcher::{Record, RecordFetcher};
use serde_json::Value;
use shared::counter;
use std::sync::Arc;

/// Turns an accepted delivery into a persisted, reconciled record.
///
/// For one event: fetch the current record, load the previous snapshot,
/// reconcile, append the event to the event log, then upsert the record.
/// Nothing is written unless the fetch and the reconciliation succeed.
pub struct WebhookHandler {
    fetcher: Arc<dyn RecordFetcher>,
    store: Arc<dyn DocumentStore>,
    collections: Collections,
    locks: RecordLocks,
}

impl WebhookHandler {
    pub fn new(
        fetcher: Arc<dyn RecordFetcher>,
        store: Arc<dyn DocumentStore>,
        collections: Collections,
    ) -> Self {
        WebhookHandler {
            fetcher,
            store,
            collections,
            locks: RecordLocks::new(),
        }
    }

    pub async fn handle(&self, payload: WebhookPayload, raw: Value) -> Result<Record, WebhookError> {
        self.process(Event::received_now(payload, raw)).await
    }

    pub async fn process(&self, event: Event) -> Result<Record, WebhookError> {
        let _guard = self.locks.lock(&event.record).await;

        let mut fresh = self.fetcher.fetch(&event.record, &event.catalog).await?;
        if fresh.id != event.record {
            return Err(WebhookError::RecordMismatch {
                requested: event.record.clone(),
                received: fresh.id,
            });
        }
        if fresh.catalog.is_empty() {
            fresh.catalog = event.catalog.clone();
        }

        let filter = Filter::eq("id", event.record.as_str());
        let previous = self.load_previous(&filter).await?;
        if previous.is_none() {
            tracing::debug!(record_id = %event.record, "No stored snapshot for record");
        }

        let merged = reconcile(fresh, previous.as_ref(), &event)?;

        self.store
            .insert_one(&self.collections.events, serde_json::to_value(&event)?)
            .await?;
        let outcome = self
            .store
            .replace_one(
                &self.collections.records,
                &filter,
                serde_json::to_value(&merged)?,
                true,
            )
            .await?;

        counter!(WEBHOOK_PERSISTED).increment(1);
        tracing::info!(
            record_id = %event.record,
            catalog = %event.catalog,
            app = %event.app,
            ?outcome,
            "Persisted reconciled record"
        );

        Ok(merged)
    }

    async fn load_previous(&self, filter: &Filter) -> Result<Option<Record>, WebhookError> {
        self.store
            .find_one(&self.collections.records, filter)
            .await?
            .map(serde_json::from_value)
            .transpose()
            .map_err(WebhookError::StoredRecord)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::reconcile::ReconcileError;
    use async_trait::async_trait;
    use document_store::{MemoryDocumentStore, SqliteDocumentStore, StoreError};
    use parking_lot::Mutex;
    use record_fetcher::{AppEntry, FetchError, UserType};
    use reqwest::StatusCode;
    use serde_json::json;
    use std::collections::HashMap;
    use std::time::Duration;

    /// Serves canned records, as upstream would: never with annotations.
    #[derive(Default)]
    pub(crate) struct StaticFetcher {
        records: Mutex<HashMap<String, Record>>,
        delay: Option<Duration>,
    }

    impl StaticFetcher {
        pub(crate) fn with_record(self, id: &str, apps: &[&str]) -> Self {
            let record = Record::new(id, "", apps.iter().map(|a| AppEntry::new(*a)).collect());
            self.records.lock().insert(id.to_string(), record);
            self
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }
    }

    #[async_trait]
    impl RecordFetcher for StaticFetcher {
        async fn fetch(&self, record_id: &str, _catalog: &str) -> Result<Record, FetchError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.records
                .lock()
                .get(record_id)
                .cloned()
                .ok_or_else(|| FetchError::Status {
                    status: StatusCode::NOT_FOUND,
                    body: "not found".into(),
                })
        }
    }

    fn payload(record: &str, app: &str, user_type: UserType) -> WebhookPayload {
        WebhookPayload {
            record: record.into(),
            catalog: "Main".into(),
            app: app.into(),
            user_type,
        }
    }

    fn event(record: &str, app: &str, user_type: UserType, received_at: &str) -> Event {
        Event {
            record: record.into(),
            catalog: "Main".into(),
            app: app.into(),
            user_type,
            received_at: received_at.into(),
            payload: Value::Null,
        }
    }

    fn handler(fetcher: StaticFetcher) -> (WebhookHandler, Arc<MemoryDocumentStore>) {
        let store = Arc::new(MemoryDocumentStore::new());
        let handler = WebhookHandler::new(Arc::new(fetcher), store.clone(), Collections::default());
        (handler, store)
    }

    async fn stored_record(store: &MemoryDocumentStore, id: &str) -> Record {
        let doc = store
            .find_one("records", &Filter::eq("id", id))
            .await
            .unwrap()
            .unwrap();
        serde_json::from_value(doc).unwrap()
    }

    #[tokio::test]
    async fn test_first_delivery_annotates_app() {
        let (handler, store) = handler(StaticFetcher::default().with_record("R1", &["Intake"]));

        handler
            .handle(payload("R1", "Intake", UserType::External), json!({"record": "R1"}))
            .await
            .unwrap();

        let logged = store
            .find_one("events", &Filter::eq("record", "R1"))
            .await
            .unwrap()
            .unwrap();
        let logged: Event = serde_json::from_value(logged).unwrap();

        let record = stored_record(&store, "R1").await;
        let intake = record.app("Intake").unwrap();
        assert_eq!(intake.created_date.as_deref(), Some(logged.received_at.as_str()));
        assert_eq!(intake.user_type, Some(UserType::External));
        assert_eq!(record.catalog, "Main");
        assert_eq!(logged.payload, json!({"record": "R1"}));
    }

    #[tokio::test]
    async fn test_repeat_delivery_keeps_created_date() {
        let (handler, store) = handler(StaticFetcher::default().with_record("R1", &["Intake"]));

        handler
            .process(event("R1", "Intake", UserType::External, "2024-05-01T00:00:00.000Z"))
            .await
            .unwrap();
        let merged = handler
            .process(event("R1", "Intake", UserType::Regular, "2024-06-01T00:00:00.000Z"))
            .await
            .unwrap();

        let intake = merged.app("Intake").unwrap();
        assert_eq!(intake.created_date.as_deref(), Some("2024-05-01T00:00:00.000Z"));
        assert_eq!(intake.user_type, Some(UserType::External));

        assert_eq!(stored_record(&store, "R1").await, merged);
        assert_eq!(store.count("records").await.unwrap(), 1);
        assert_eq!(store.count("events").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_repeat_delivery_with_sqlite_store() {
        let store = Arc::new(SqliteDocumentStore::in_memory().unwrap());
        store.create_index("records", "id").await.unwrap();
        let handler = WebhookHandler::new(
            Arc::new(StaticFetcher::default().with_record("R1", &["Intake", "Review"])),
            store.clone(),
            Collections::default(),
        );

        handler
            .process(event("R1", "Intake", UserType::External, "2024-05-01T00:00:00.000Z"))
            .await
            .unwrap();
        handler
            .process(event("R1", "Review", UserType::Api, "2024-06-01T00:00:00.000Z"))
            .await
            .unwrap();

        let doc = store
            .find_one("records", &Filter::eq("id", "R1"))
            .await
            .unwrap()
            .unwrap();
        let record: Record = serde_json::from_value(doc).unwrap();
        let intake = record.app("Intake").unwrap();
        assert_eq!(intake.created_date.as_deref(), Some("2024-05-01T00:00:00.000Z"));
        assert_eq!(intake.user_type, Some(UserType::External));
        assert_eq!(
            record.app("Review").unwrap().created_date.as_deref(),
            Some("2024-06-01T00:00:00.000Z")
        );
        assert_eq!(store.count("records").await.unwrap(), 1);
        assert_eq!(store.count("events").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_fetch_failure_persists_nothing() {
        let (handler, store) = handler(StaticFetcher::default());

        let err = handler
            .process(event("R1", "Intake", UserType::Api, "T"))
            .await
            .unwrap_err();

        assert!(matches!(err, WebhookError::Fetch(_)));
        assert_eq!(store.count("events").await.unwrap(), 0);
        assert_eq!(store.count("records").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unknown_app_persists_nothing() {
        let (handler, store) = handler(StaticFetcher::default().with_record("R1", &["Intake"]));

        let err = handler
            .process(event("R1", "Review", UserType::Api, "T"))
            .await
            .unwrap_err();

        match err {
            WebhookError::Reconcile(ReconcileError::AppNotFound {
                requested,
                available,
            }) => {
                assert_eq!(requested, "Review");
                assert_eq!(available, vec!["Intake"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(store.count("events").await.unwrap(), 0);
        assert_eq!(store.count("records").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_corrupt_stored_record() {
        let (handler, store) = handler(StaticFetcher::default().with_record("R1", &["Intake"]));
        store
            .insert_one("records", json!({"id": "R1", "apps": "not a list"}))
            .await
            .unwrap();

        let err = handler
            .process(event("R1", "Intake", UserType::Api, "T"))
            .await
            .unwrap_err();
        assert!(matches!(err, WebhookError::StoredRecord(_)));
    }

    #[tokio::test]
    async fn test_record_id_mismatch() {
        let fetcher = StaticFetcher::default();
        fetcher
            .records
            .lock()
            .insert("R1".into(), Record::new("R2", "Main", vec![AppEntry::new("Intake")]));
        let (handler, store) = handler(fetcher);

        let err = handler
            .process(event("R1", "Intake", UserType::Api, "T"))
            .await
            .unwrap_err();
        assert!(matches!(err, WebhookError::RecordMismatch { .. }));
        assert_eq!(store.count("records").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_store_failure_is_propagated() {
        let store = Arc::new(MemoryDocumentStore::new());
        let collections = Collections {
            events: "bad/events".into(),
            records: "records".into(),
        };
        let handler = WebhookHandler::new(
            Arc::new(StaticFetcher::default().with_record("R1", &["Intake"])),
            store.clone(),
            collections,
        );

        let err = handler
            .process(event("R1", "Intake", UserType::Api, "T"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WebhookError::Store(StoreError::InvalidCollection(_))
        ));
        assert_eq!(store.count("records").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_deliveries_for_same_record() {
        let fetcher = StaticFetcher::default()
            .with_record("R1", &["Intake", "Review"])
            .with_delay(Duration::from_millis(20));
        let (handler, store) = handler(fetcher);
        let handler = Arc::new(handler);

        let first = {
            let handler = handler.clone();
            tokio::spawn(async move {
                handler
                    .process(event("R1", "Intake", UserType::Regular, "T1"))
                    .await
            })
        };
        let second = {
            let handler = handler.clone();
            tokio::spawn(async move {
                handler
                    .process(event("R1", "Review", UserType::Api, "T2"))
                    .await
            })
        };
        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();

        // Without per-record serialization one of the annotations would be lost.
        let record = stored_record(&store, "R1").await;
        assert_eq!(record.app("Intake").unwrap().created_date.as_deref(), Some("T1"));
        assert_eq!(record.app("Review").unwrap().created_date.as_deref(), Some("T2"));
    }
}
