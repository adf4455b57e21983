use bingo_wallet_backend::api::{self, AppState};
use bingo_wallet_backend::config::{AppConfig, StorageBackend};
use bingo_wallet_backend::database::memory::{InMemoryTransactionLedger, InMemoryWalletStore};
use bingo_wallet_backend::database::repository::{TransactionLedger, WalletStore};
use bingo_wallet_backend::database::transaction_repository::TransactionRepository;
use bingo_wallet_backend::database::wallet_repository::WalletRepository;
use bingo_wallet_backend::database::{init_pool_from_config, run_migrations};
use bingo_wallet_backend::logging::init_tracing;
use bingo_wallet_backend::payments::provider::PaymentGateway;
use bingo_wallet_backend::payments::providers::ChapaProvider;
use bingo_wallet_backend::workers::pending_reconciler::{
    PendingReconcilerConfig, PendingReconcilerWorker,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
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
                error!(error = %e, "Failed to install SIGTERM handler");
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

    info!("Shutdown signal received, starting graceful shutdown");
}

async fn shutdown_signal_with_notify(shutdown_tx: watch::Sender<bool>) {
    shutdown_signal().await;
    let _ = shutdown_tx.send(true);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    config.validate()?;
    init_tracing(&config.logging);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        storage = ?config.storage,
        "🚀 Starting bingo wallet backend"
    );

    let (ledger, wallets): (Arc<dyn TransactionLedger>, Arc<dyn WalletStore>) =
        match (&config.storage, &config.database) {
            (StorageBackend::Postgres, Some(db_config)) => {
                info!("📊 Connecting to Postgres...");
                let pool = init_pool_from_config(db_config).await?;
                run_migrations(&pool).await?;
                info!("✅ Database ready");
                let ledger: Arc<dyn TransactionLedger> =
                    Arc::new(TransactionRepository::new(pool.clone()));
                let wallets: Arc<dyn WalletStore> = Arc::new(WalletRepository::new(pool));
                (ledger, wallets)
            }
            (StorageBackend::Postgres, None) => {
                anyhow::bail!("DATABASE_URL is required when STORAGE_BACKEND=postgres");
            }
            (StorageBackend::Memory, _) => {
                warn!("⚠️  Using in-memory storage; balances are lost on restart");
                let ledger: Arc<dyn TransactionLedger> = Arc::new(InMemoryTransactionLedger::new());
                let wallets: Arc<dyn WalletStore> = Arc::new(InMemoryWalletStore::new());
                (ledger, wallets)
            }
        };

    let gateway: Arc<dyn PaymentGateway> = Arc::new(ChapaProvider::new(config.chapa.clone())?);
    info!(
        base_url = %config.chapa.base_url,
        signed_webhooks = gateway.requires_signature(),
        "💳 Chapa gateway configured"
    );

    let state = AppState::new(ledger.clone(), wallets, gateway);

    let (worker_shutdown_tx, worker_shutdown_rx) = watch::channel(false);
    let sweeper_config = PendingReconcilerConfig::from_env();
    let sweeper_handle = if sweeper_config.enabled {
        let worker =
            PendingReconcilerWorker::new(ledger, state.reconciler.clone(), sweeper_config);
        Some(tokio::spawn(worker.run(worker_shutdown_rx)))
    } else {
        info!("Pending deposit sweeper disabled (PENDING_SWEEP_ENABLED=false)");
        None
    };

    let app = api::router(state).layer(api::cors_layer(&config.server));

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!("❌ Failed to bind to address {}: {}", addr, e);
        e
    })?;

    info!(address = %addr, "🚀 Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_with_notify(worker_shutdown_tx.clone()))
        .await?;

    let _ = worker_shutdown_tx.send(true);
    if let Some(handle) = sweeper_handle {
        if tokio::time::timeout(Duration::from_secs(5), handle).await.is_err() {
            error!("Timed out waiting for pending deposit sweeper shutdown");
        }
    }

    info!("👋 Server shutdown complete");
    Ok(())
}
