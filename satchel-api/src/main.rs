//! satchel-api - Family document service
//!
//! Upload intake, analysis worker, tenants and invitations, push
//! notifications and the public calendar feed behind one HTTP listener.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use satchel_common::config::{
    resolve_root_folder, LogFormat, QueueKind, ServiceConfig, BLOB_DIR, DATABASE_FILE,
};
use satchel_common::db::init_database;
use satchel_common::ports::{DocumentClassifier, JobQueue, UserRepository};
use satchel_api::adapters::{
    requeue_unfinished, spawn_dispatcher, FsBlobStorage, HttpClassifier, HttpJobQueue,
    HttpPushTransport, LocalJobQueue, UnconfiguredClassifier,
};
use satchel_api::auth::JwtIdentityVerifier;
use satchel_api::db::SqliteUserRepository;
use satchel_api::{build_router, AppState, Ports};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Command-line arguments for satchel-api
#[derive(Parser, Debug)]
#[command(name = "satchel-api")]
#[command(about = "Family document processing service")]
#[command(version)]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long, env = "SATCHEL_CONFIG")]
    config: Option<PathBuf>,

    /// Root folder holding the database and stored uploads
    #[arg(short, long, env = "SATCHEL_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP service (default)
    Serve,
    /// Mark an identity as activated (operator action)
    Activate {
        #[arg(long)]
        identity: String,
    },
}

fn init_tracing(config: &ServiceConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},tower_http=info", config.logging.level)));

    match config.logging.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Log level and format come from the config file
    let config = ServiceConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    init_tracing(&config);

    info!(
        "Starting satchel-api v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let root_folder = resolve_root_folder(args.root_folder.as_deref(), &config);
    std::fs::create_dir_all(&root_folder)
        .with_context(|| format!("Failed to create root folder {}", root_folder.display()))?;
    info!("Root folder: {}", root_folder.display());

    let pool = init_database(&root_folder.join(DATABASE_FILE))
        .await
        .context("Failed to initialize database")?;

    match args.command.unwrap_or(Command::Serve) {
        Command::Activate { identity } => {
            let users = SqliteUserRepository::new(pool);
            if users.set_activated(&identity, true).await? {
                info!(identity = %identity, "Identity activated");
                Ok(())
            } else {
                Err(anyhow!("unknown identity {}", identity))
            }
        }
        Command::Serve => serve(config, root_folder, pool).await,
    }
}

async fn serve(config: ServiceConfig, root_folder: PathBuf, pool: sqlx::SqlitePool) -> Result<()> {
    let cancel_token = CancellationToken::new();

    let blobs = Arc::new(FsBlobStorage::new(root_folder.join(BLOB_DIR)));

    let (queue, local_jobs): (Arc<dyn JobQueue>, _) = match config.worker.queue {
        QueueKind::Local => {
            let (queue, jobs) = LocalJobQueue::channel();
            let queue: Arc<dyn JobQueue> = Arc::new(queue);
            (queue, Some(jobs))
        }
        QueueKind::Http => {
            let endpoint = config
                .worker
                .endpoint
                .clone()
                .ok_or_else(|| anyhow!("worker.endpoint is required for the http queue"))?;
            let principal = config
                .worker
                .principal
                .clone()
                .ok_or_else(|| anyhow!("worker.principal is required for the http queue"))?;
            let secret = config
                .worker
                .token_secret
                .clone()
                .ok_or_else(|| anyhow!("worker token secret is required for the http queue"))?;
            let queue: Arc<dyn JobQueue> = Arc::new(HttpJobQueue::new(endpoint, principal, secret)?);
            (queue, None)
        }
    };

    let classifier: Arc<dyn DocumentClassifier> = match &config.classifier.endpoint {
        Some(endpoint) => Arc::new(HttpClassifier::new(
            endpoint.clone(),
            Duration::from_secs(config.classifier.timeout_secs),
        )?),
        None => {
            warn!("No classifier endpoint configured, analysis jobs will fail");
            Arc::new(UnconfiguredClassifier)
        }
    };

    let push = Arc::new(HttpPushTransport::new(config.push.ttl_secs)?);

    if config.auth.token_secret.is_none() {
        warn!("No client token secret configured, every client request will be rejected");
    }
    let verifier = Arc::new(JwtIdentityVerifier::new(config.auth.token_secret.as_deref()));

    let bind = config.server.bind.clone();
    let concurrency = config.worker.concurrency;

    let ports = Ports::sqlite(pool, blobs, queue.clone(), classifier, push, verifier);
    let state = AppState::new(config, ports);

    let dispatcher = local_jobs.map(|jobs| {
        let handle = spawn_dispatcher(jobs, state.worker.clone(), concurrency, cancel_token.clone());

        // Nothing outside this process redelivers local jobs
        let documents = state.documents.clone();
        tokio::spawn(async move {
            if let Err(e) = requeue_unfinished(documents.as_ref(), queue.as_ref()).await {
                error!(error = %e, "Failed to requeue unfinished documents");
            }
        });

        handle
    });

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind to {}", bind))?;
    info!("satchel-api listening on http://{}", bind);
    info!("Health check: http://{}/health", bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    cancel_token.cancel();
    if let Some(handle) = dispatcher {
        if let Err(e) = handle.await {
            error!("Dispatcher task failed: {}", e);
        }
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
