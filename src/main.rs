use chrono::Duration as ChronoDuration;
use clap::Parser;
use miette::{IntoDiagnostic, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use confirma::application::confirmation::ConfirmationEngine;
use confirma::application::dispatcher::SideEffectDispatcher;
use confirma::application::issuer::ChargeIssuer;
use confirma::application::sweeper::ExpirySweeper;
use confirma::config::AppConfig;
use confirma::domain::ports::{
    AnalyticsSinkArc, ChargeProviderArc, CouponStoreArc, OrderStoreArc,
};
use confirma::infrastructure::analytics::{HttpAnalyticsSink, NoopAnalyticsSink};
use confirma::infrastructure::in_memory::{
    InMemoryCouponStore, InMemoryDeliveryQueue, InMemoryOrderStore,
};
use confirma::infrastructure::psp::card::CardProvider;
use confirma::infrastructure::psp::pix::PixProvider;
#[cfg(feature = "storage-rocksdb")]
use confirma::infrastructure::rocksdb::RocksDbStore;
use confirma::interfaces::http::{AppState, provider_map, router};

#[derive(Parser)]
#[command(author, version, about = "Payment confirmation reconciliation service")]
struct Cli {
    /// Listen address override (falls back to BIND_ADDR, then 0.0.0.0:8080).
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[cfg(feature = "storage-rocksdb")]
    #[arg(long)]
    db_path: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load().into_diagnostic()?;
    let bind = cli.bind.unwrap_or(config.bind_addr);

    #[cfg(feature = "storage-rocksdb")]
    let (orders, coupons): (OrderStoreArc, CouponStoreArc) = match cli.db_path {
        Some(path) => {
            let store = RocksDbStore::open(path).into_diagnostic()?;
            (Arc::new(store.clone()), Arc::new(store))
        }
        None => (
            Arc::new(InMemoryOrderStore::new()),
            Arc::new(InMemoryCouponStore::new()),
        ),
    };
    #[cfg(not(feature = "storage-rocksdb"))]
    let (orders, coupons): (OrderStoreArc, CouponStoreArc) = (
        Arc::new(InMemoryOrderStore::new()),
        Arc::new(InMemoryCouponStore::new()),
    );

    let pix = PixProvider::new(&config.pix.base_url, &config.pix.api_key).into_diagnostic()?;
    let card = CardProvider::new(&config.card.base_url, &config.card.api_key).into_diagnostic()?;
    let providers: Vec<ChargeProviderArc> = vec![Arc::new(pix), Arc::new(card)];

    let analytics: AnalyticsSinkArc = match &config.analytics_url {
        Some(url) => Arc::new(HttpAnalyticsSink::new(url).into_diagnostic()?),
        None => Arc::new(NoopAnalyticsSink),
    };
    let delivery = Arc::new(InMemoryDeliveryQueue::new());

    let dispatcher = SideEffectDispatcher::new(coupons.clone(), analytics, delivery);
    let confirmations = Arc::new(ConfirmationEngine::new(orders.clone(), dispatcher));
    let issuer = Arc::new(ChargeIssuer::new(
        orders.clone(),
        providers.clone(),
        ChronoDuration::minutes(config.charge_window_minutes),
    ));

    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(ExpirySweeper::new(orders.clone(), config.sweep_interval).run(shutdown_rx));

    let state = AppState {
        orders,
        issuer,
        confirmations,
        providers: provider_map(providers),
    };

    let listener = tokio::net::TcpListener::bind(bind).await.into_diagnostic()?;
    info!(%bind, "confirma listening");
    axum::serve(listener, router(state)).await.into_diagnostic()?;

    Ok(())
}
