mod config;
mod observability;

use clap::{Args, Parser, Subcommand};
use config::{Config, ConfigError};
use document_store::{DocumentStore, DocumentStoreConfig, StoreError};
use observability::SetupError;
use record_fetcher::FetchError;
use record_fetcher::UpstreamClient;
use record_fetcher::webhooks::{APP_COMPLETED_EVENT, WebhookRegistration};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use webhook_receiver::WebhookReceiverError;
use webhook_receiver::config::ValidationError;

#[derive(Parser)]
#[command(name = "appbridge", about = "Receives document automation webhooks and stores reconciled records")]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Run the webhook receiver
    Run(ConfigArgs),
    /// Manage the upstream webhook subscriptions
    Webhooks {
        #[command(flatten)]
        args: ConfigArgs,
        #[command(subcommand)]
        command: WebhooksCommand,
    },
    /// Maintain the document store
    Store {
        #[command(flatten)]
        args: ConfigArgs,
        #[command(subcommand)]
        command: StoreCommand,
    },
}

#[derive(Args)]
struct ConfigArgs {
    #[arg(long)]
    config_path: PathBuf,
}

#[derive(Subcommand)]
enum WebhooksCommand {
    List,
    /// Subscribe `url` to app completion events. Deliveries carry the shared secret.
    Register {
        #[arg(long)]
        url: String,
        #[arg(long = "event")]
        events: Vec<String>,
        /// Defaults to every catalog
        #[arg(long = "catalog")]
        catalogs: Vec<String>,
    },
    Unregister {
        id: String,
    },
    UnregisterAll,
}

#[derive(Subcommand)]
enum StoreCommand {
    /// Remove every document from a collection, keeping its indexes
    Clear { collection: String },
    /// Remove a collection together with its indexes
    Drop { collection: String },
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Setup(#[from] SetupError),
    #[error(transparent)]
    Receiver(#[from] WebhookReceiverError),
    #[error(transparent)]
    Upstream(#[from] FetchError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("the memory store holds nothing outside a running receiver; configure a persistent store")]
    EphemeralStore,
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("could not start runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Exiting with error");
            eprintln!("appbridge: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config_path = match &cli.command {
        CliCommand::Run(args)
        | CliCommand::Webhooks { args, .. }
        | CliCommand::Store { args, .. } => &args.config_path,
    };
    let config = Config::from_file(config_path)?;

    let _sentry = observability::init_logging(&config.logging)?;

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    match cli.command {
        CliCommand::Run(_) => {
            observability::init_metrics(config.metrics.as_ref())?;
            tracing::info!("Starting webhook receiver");
            rt.block_on(webhook_receiver::run(config.webhook_receiver))?;
        }
        CliCommand::Webhooks { command, .. } => {
            rt.block_on(manage_webhooks(&config, command))?;
        }
        CliCommand::Store { command, .. } => {
            rt.block_on(maintain_store(&config, command))?;
        }
    }
    Ok(())
}

async fn manage_webhooks(config: &Config, command: WebhooksCommand) -> Result<(), CliError> {
    let receiver = &config.webhook_receiver;
    let client = UpstreamClient::new(&receiver.upstream)?;

    match command {
        WebhooksCommand::List => {
            let webhooks = client.list_webhooks().await?;
            println!("{}", serde_json::to_string_pretty(&webhooks)?);
        }
        WebhooksCommand::Register {
            url,
            events,
            catalogs,
        } => {
            receiver.validate()?;
            let mut registration = WebhookRegistration::new(url, catalogs)
                .with_header(receiver.secret_header.as_str(), receiver.shared_secret.as_str());
            if !events.is_empty() {
                registration.events = events;
            }
            if registration.events.iter().any(|e| e != APP_COMPLETED_EVENT) {
                tracing::warn!(events = ?registration.events, "Registering for events the receiver does not handle");
            }

            let created = client.register_webhook(&registration).await?;
            println!("{}", serde_json::to_string_pretty(&created)?);
        }
        WebhooksCommand::Unregister { id } => {
            client.unregister_webhook(&id).await?;
            println!("Unregistered webhook {id}");
        }
        WebhooksCommand::UnregisterAll => {
            let removed = client.unregister_all_webhooks().await?;
            println!("Unregistered {removed} webhook(s)");
        }
    }
    Ok(())
}

/// Opens the configured store for offline maintenance.
fn open_persistent_store(config: &DocumentStoreConfig) -> Result<Arc<dyn DocumentStore>, CliError> {
    match config {
        DocumentStoreConfig::Memory => Err(CliError::EphemeralStore),
        DocumentStoreConfig::Sqlite { .. } => Ok(document_store::get_store(config)?),
    }
}

async fn maintain_store(config: &Config, command: StoreCommand) -> Result<(), CliError> {
    let store = open_persistent_store(&config.webhook_receiver.store)?;

    match command {
        StoreCommand::Clear { collection } => {
            let before = store.count(&collection).await?;
            store.clear_collection(&collection).await?;
            println!("Removed {before} document(s) from {collection}");
        }
        StoreCommand::Drop { collection } => {
            let before = store.count(&collection).await?;
            store.drop_collection(&collection).await?;
            println!("Dropped {collection} with {before} document(s)");
        }
    }
    Ok(())
}
