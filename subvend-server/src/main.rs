//! Subvend Server
//!
//! Prepaid subscription vending: unreferenced on-chain deposits are matched
//! to orders by exact amount, balances fund queued purchases, and an
//! external provider fulfills them with at-most-once settlement.

mod api;
mod config;
mod server;
mod shutdown;
mod state;

use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use subvend_core::clients::api_gate;
use subvend_core::clients::indexer::HttpChainIndexer;
use subvend_core::clients::provider::HttpProvider;
use subvend_core::clients::wallet::WalletRpc;
use subvend_core::config::ConfigStore;
use subvend_core::fulfill::FulfillmentClient;
use subvend_core::matcher::{DepositMatcher, MatcherSettings};
use subvend_core::notify::{BotApiNotifier, Notifications, Notifier};
use subvend_core::processors::{DepositPoller, ExpirySweeper, QueueDrain, RetentionSweeper};
use subvend_core::queue::{DEFAULT_MAX_RETRIES, FulfillmentQueue};
use subvend_core::store::{PgStore, Store};

use config::{ConfigLoader, get_database_url};
use server::{build_router, run_server};
use state::{AppState, AuthState};

/// Subvend - prepaid subscription vending pipeline
#[derive(Parser, Debug)]
#[command(name = "subvend-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "./subvend-config.toml")]
    config: PathBuf,

    /// Override the listen address (e.g., 0.0.0.0:3000)
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Run schema bootstrap on startup
    #[arg(long, default_value = "false")]
    migrate: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = Args::parse();

    tracing::info!("Starting subvend-server v{}", env!("CARGO_PKG_VERSION"));

    let config_loader = Arc::new(ConfigLoader::new(&args.config, args.listen));
    let loaded = config_loader.load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;
    tracing::info!("Configuration loaded from {:?}", args.config);

    let database_url = get_database_url().map_err(|e| {
        tracing::error!("DATABASE_URL environment variable not set");
        e
    })?;

    tracing::info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .map_err(|e| {
            tracing::error!("Failed to connect to database: {}", e);
            e
        })?;
    tracing::info!("Database connection established");

    let pg_store = PgStore::new(db_pool.clone());
    if args.migrate {
        tracing::info!("Bootstrapping schema...");
        pg_store.migrate().await?;
        tracing::info!("Schema bootstrap complete");
    }
    let store: Arc<dyn Store> = Arc::new(pg_store);

    // Collaborator adapters, all behind the shared rate gate.
    let gate = api_gate();
    let indexer = Arc::new(HttpChainIndexer::new(
        loaded.indexer.base_url.clone(),
        loaded.indexer.token_contract.clone(),
        gate.clone(),
    ));
    let notifier = Arc::new(BotApiNotifier::new(
        loaded.notifier.base_url.clone(),
        loaded.notifier.token.clone(),
        gate.clone(),
    ));
    let notifications = Notifications::new(notifier as Arc<dyn Notifier>);
    let provider = Arc::new(HttpProvider::new(
        loaded.provider.api_url.clone(),
        loaded.provider.session_cookie.clone(),
        gate.clone(),
    ));
    let wallet = Arc::new(WalletRpc::new(
        loaded.wallet.base_url.clone(),
        loaded.wallet.address.clone(),
        gate,
    ));
    let fulfiller = Arc::new(FulfillmentClient::new(provider, wallet));

    let shop = ConfigStore::new(loaded.shop.clone());
    let matcher = Arc::new(DepositMatcher::new(
        store.clone(),
        indexer,
        notifications.clone(),
        shop.clone(),
        MatcherSettings::default(),
    ));
    let queue = Arc::new(FulfillmentQueue::new(
        store.clone(),
        fulfiller,
        notifications,
        shop.clone(),
        DEFAULT_MAX_RETRIES,
    ));

    // Periodic triggers: deposit polling, expiry sweep, retention sweep,
    // queue drain.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let workers = vec![
        tokio::spawn(
            DepositPoller::new(matcher.clone(), DepositPoller::DEFAULT_INTERVAL)
                .run(shutdown_rx.clone()),
        ),
        tokio::spawn(
            ExpirySweeper::new(matcher.clone(), ExpirySweeper::DEFAULT_INTERVAL)
                .run(shutdown_rx.clone()),
        ),
        tokio::spawn(
            RetentionSweeper::new(matcher.clone(), RetentionSweeper::DEFAULT_INTERVAL)
                .run(shutdown_rx.clone()),
        ),
        tokio::spawn(
            QueueDrain::new(
                queue.clone(),
                QueueDrain::DEFAULT_INTERVAL,
                QueueDrain::DEFAULT_MAX_TASKS,
            )
            .run(shutdown_rx),
        ),
    ];

    let state = AppState {
        store,
        shop,
        matcher,
        queue,
        auth: Arc::new(AuthState {
            service_secret: loaded.service_secret.clone(),
            admin_hash: loaded.admin_hash.clone(),
        }),
        config_loader,
    };

    let router = build_router(state);

    tracing::info!("Starting HTTP server on {}", loaded.listen);
    let result = run_server(router, loaded.listen).await;

    // Stop the periodic triggers and let in-flight passes finish.
    tracing::info!("Signaling processors to stop");
    let _ = shutdown_tx.send(true);
    for worker in workers {
        let _ = worker.await;
    }

    tracing::info!("Closing database connections...");
    db_pool.close().await;
    tracing::info!("Server shutdown complete");

    result.map_err(Into::into)
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
