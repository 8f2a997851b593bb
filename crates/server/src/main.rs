use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dossier_core::{
    create_audit_system, load_config, validate_config, ArtifactStore, AuditEvent, AuditStore,
    CaseStore, JobDispatcher, Notifier, Orchestrator, SessionFactory, SqliteAuditStore,
    SqliteCaseStore, WebDriverSessionFactory, WebhookNotifier,
};
use dossier_server::api::create_router;
use dossier_server::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Buffer size for audit event channel
const AUDIT_BUFFER_SIZE: usize = 1000;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = std::env::var("DOSSIER_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Portal: {}", config.portal.base_url);
    info!("Database path: {:?}", config.database.path);
    info!("Data directory: {:?}", config.storage.data_dir);

    // Short hash of the effective config for the audit trail
    let config_json = serde_json::to_string(&config).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    let config_hash_short = &config_hash[..16];

    let audit_store: Arc<dyn AuditStore> = Arc::new(
        SqliteAuditStore::new(&config.database.path).context("Failed to create audit store")?,
    );
    info!("Audit store initialized");

    let case_store: Arc<dyn CaseStore> = Arc::new(
        SqliteCaseStore::new(&config.database.path).context("Failed to create case store")?,
    );
    info!("Case store initialized");

    let (audit_handle, audit_writer) =
        create_audit_system(Arc::clone(&audit_store), AUDIT_BUFFER_SIZE);
    let writer_handle = tokio::spawn(audit_writer.run());

    audit_handle
        .emit(AuditEvent::ServiceStarted {
            version: VERSION.to_string(),
            config_hash: config_hash_short.to_string(),
        })
        .await;

    let artifacts = Arc::new(ArtifactStore::new(&config.storage));
    artifacts
        .ensure_layout()
        .context("Failed to prepare artifact directories")?;
    info!("Artifacts stored under {:?}", artifacts.cases_dir());

    let sessions: Arc<dyn SessionFactory> = Arc::new(
        WebDriverSessionFactory::new(
            config.webdriver.clone(),
            config.portal.clone(),
            config.acquisition.step_timeout(),
        )
        .context("Failed to create WebDriver session factory")?,
    );
    info!("Using WebDriver at {}", config.webdriver.url);

    let orchestrator = Arc::new(Orchestrator::new(
        config.acquisition.clone(),
        config.portal.clone(),
        sessions,
        Arc::clone(&case_store),
        artifacts,
        Some(audit_handle.clone()),
    ));

    let notifier: Arc<dyn Notifier> = Arc::new(
        WebhookNotifier::new(Duration::from_secs(config.notification.timeout_secs))
            .context("Failed to create webhook notifier")?,
    );
    match &config.notification.target {
        Some(target) => info!("Notifications go to {}", target),
        None => info!("No notification target configured; only per-request callbacks are used"),
    }

    let dispatcher = JobDispatcher::new(
        Arc::clone(&orchestrator),
        notifier,
        config.dispatcher.clone(),
        config.notification.clone(),
        Some(audit_handle.clone()),
    );
    info!(
        "Dispatcher ready (concurrency limit {})",
        dispatcher.concurrency_limit()
    );

    let state = Arc::new(AppState::new(
        config.clone(),
        dispatcher.clone(),
        orchestrator,
        case_store,
        audit_store,
    ));

    let app = create_router(state);

    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // A running acquisition never outlives its overall deadline
    let grace = config.acquisition.overall_deadline();
    info!("Stopping dispatcher (grace period {:?})...", grace);
    dispatcher.shutdown(grace).await;
    info!("Dispatcher stopped");

    audit_handle
        .emit(AuditEvent::ServiceStopped {
            reason: "graceful_shutdown".to_string(),
        })
        .await;

    // The writer exits once every AuditHandle clone is gone.
    drop(dispatcher);
    drop(audit_handle);

    let _ = writer_handle.await;
    info!("Audit writer stopped");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
