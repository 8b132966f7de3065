pub mod config;
pub mod errors;
pub mod event;
pub mod handler;
pub mod metrics_defs;
pub mod reconcile;
pub mod record_locks;
pub mod service;

use crate::config::ValidationError;
use crate::errors::WebhookError;
use crate::handler::WebhookHandler;
use crate::service::WebhookService;
use document_store::StoreError;
use record_fetcher::{FetchError, UpstreamClient};
use shared::admin_service::AdminService;
use shared::http::{run_http_service, serve_listener};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::net::TcpListener;

#[derive(thiserror::Error, Debug)]
pub enum WebhookReceiverError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ValidationError),
    #[error("could not create upstream client: {0}")]
    Upstream(#[from] FetchError),
    #[error("document store error: {0}")]
    Store(#[from] StoreError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("server error: {0}")]
    Server(#[from] WebhookError),
}

/// Runs the webhook listener and the admin listener until either fails.
pub async fn run(config: config::Config) -> Result<(), WebhookReceiverError> {
    config.validate()?;

    let fetcher = Arc::new(UpstreamClient::new(&config.upstream)?);
    let store = document_store::get_store(&config.store)?;
    store.create_index(&config.collections.records, "id").await?;
    let handler = WebhookHandler::new(fetcher, store, config.collections.clone());
    let service = WebhookService::new(handler, &config)?;

    let ready = Arc::new(AtomicBool::new(false));
    let listener =
        TcpListener::bind(format!("{}:{}", config.listener.host, config.listener.port)).await?;
    tracing::info!(
        host = %config.listener.host,
        port = config.listener.port,
        path = %config.path,
        "Accepting webhook deliveries"
    );
    ready.store(true, Ordering::Relaxed);

    let admin_ready = ready.clone();
    let admin_service: AdminService<_, WebhookError> =
        AdminService::new(move || admin_ready.load(Ordering::Relaxed));

    let webhook_task = serve_listener(listener, service);
    let admin_task = run_http_service(
        &config.admin_listener.host,
        config.admin_listener.port,
        admin_service,
    );

    tokio::try_join!(webhook_task, admin_task)?;
    Ok(())
}
