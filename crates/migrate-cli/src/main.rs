//! Process entry point (analogous to `kimberlite-cli`): loads configuration,
//! builds the metadata store, source client, and destination provider,
//! assembles both HTTP surfaces, and runs the orchestrator to completion or
//! cancellation.

use std::path::PathBuf;
use std::sync::Arc;

use axum::http::StatusCode;
use axum::routing::any;
use axum::Router;
use clap::{Parser, Subcommand};
use migrate_core::{DestinationStateProvider, Orchestrator};
use migrate_forward::{ActorCallRouter, ForwardingPredicate, MetadataForwardingPredicate};
use migrate_metadata::MemoryMetadataStore;
use migrate_server::DestinationState;
use migrate_source_client::{HttpSourceClient, SourceClient};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

/// Migration platform CLI: copies a keyspace from the legacy KVS to its
/// replacement and forwards actor traffic until cutover.
#[derive(Parser)]
#[command(name = "migrate")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the migration and serve both HTTP surfaces until cutover or
    /// Ctrl-C.
    Run {
        /// Address the destination's HTTP surface binds to.
        #[arg(long, default_value = "0.0.0.0:8080")]
        address: String,

        /// Directory to look for a project `migrate.toml` in (defaults to
        /// the current directory).
        #[arg(long)]
        config_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { address, config_dir } => run(&address, config_dir).await,
    }
}

async fn run(address: &str, config_dir: Option<PathBuf>) -> anyhow::Result<()> {
    let mut loader = migrate_config::ConfigLoader::new();
    if let Some(dir) = config_dir {
        loader = loader.with_project_dir(dir);
    }
    let settings = Arc::new(loader.load()?);
    tracing::info!(source = %settings.source_service_uri, "configuration loaded");

    // `MemoryMetadataStore` is the in-process stand-in for the external
    // replicated dictionary a single-partition binary runs against, same as
    // `migrate-core`'s reference `DestinationStateProvider`: the real
    // replicated-collection store is an external system this workspace
    // doesn't implement.
    let metadata = Arc::new(MemoryMetadataStore::new());

    // One pool for every outbound call to the legacy service: both the
    // migration driver's source client and the forwarding dispatcher talk to
    // the same partition primary, so they share it rather than each opening
    // their own (spec.md §6).
    let source_http = reqwest::Client::builder().timeout(settings.operation_timeout()).build()?;
    let source: Arc<dyn SourceClient> = Arc::new(HttpSourceClient::new(
        settings.source_service_uri.clone(),
        settings.retry_policy.clone(),
        source_http.clone(),
    ));
    let destination: Arc<dyn DestinationStateProvider> = Arc::new(migrate_core::testing::MemoryStateProvider::new());
    let cancel = CancellationToken::new();

    let destination_state = DestinationState {
        metadata: Arc::clone(&metadata),
        source: Arc::clone(&source),
        destination: Arc::clone(&destination),
        settings: Arc::clone(&settings),
        cancel: cancel.clone(),
    };

    let predicate: Arc<dyn ForwardingPredicate> = Arc::new(MetadataForwardingPredicate::new(
        Arc::clone(&metadata),
        settings.metadata_lease(),
    ));
    let actor_router = Arc::new(ActorCallRouter::new(
        predicate,
        source_http,
        settings.kvs_actor_service_uri.clone(),
    ));

    // The actual actor-call RPC surface is outside this workspace's scope
    // (spec.md §1 Non-goals: "no RPC transport implementation"); this route
    // is where the destination's real handler would be mounted, wrapped by
    // the forwarding middleware ahead of it.
    let app = Router::new()
        .merge(migrate_server::destination_router(destination_state))
        .route("/actor/{*path}", any(actor_call_not_mounted))
        .layer(axum::middleware::from_fn_with_state(actor_router, migrate_forward::forward_or_handle))
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(address).await?;
    tracing::info!(%address, "destination http surface listening");

    let orchestrator_cancel = cancel.clone();
    let orchestrator_task = tokio::spawn(async move {
        let orchestrator = Orchestrator::new(
            metadata.as_ref(),
            source.as_ref(),
            destination.as_ref(),
            settings.as_ref(),
            orchestrator_cancel,
        );
        orchestrator.run().await
    });

    tokio::select! {
        result = axum::serve(listener, app) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received ctrl-c, cancelling migration and shutting down");
            cancel.cancel();
        }
    }

    match orchestrator_task.await {
        Ok(Ok(result)) => tracing::info!(status = %result.status, phase = %result.current_phase, "migration driver loop exited"),
        Ok(Err(err)) => tracing::error!(error = %err, "migration driver loop failed"),
        Err(join_err) => tracing::error!(error = %join_err, "migration driver loop task panicked"),
    }

    Ok(())
}

async fn actor_call_not_mounted() -> StatusCode {
    StatusCode::NOT_IMPLEMENTED
}
