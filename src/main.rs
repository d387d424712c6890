use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use itembox::config::Config;
use itembox::{ItemStore, Server};

#[tokio::main]
async fn main() -> Result<(), itembox::Error> {
    let cfg = Config::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cfg.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let store = Arc::new(if cfg.seed { ItemStore::seeded() } else { ItemStore::new() });
    info!(items = store.len(), "store ready");

    Server::bind(cfg.addr)
        .read_timeout(cfg.read_timeout())
        .request_timeout(cfg.request_timeout())
        .idle_timeout(cfg.idle_timeout())
        .serve(itembox::app(&store))
        .await
}
