use anyhow::Result;
use tracing_subscriber::EnvFilter;
use vigil_store::Store;

mod config;
mod dbus_interface;
mod engine;

use config::Config;
use dbus_interface::{VigilService, BUS_NAME, OBJECT_PATH};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("vigild starting");

    let config = Config::from_env();
    let policy = config.policy()?;
    let store = Store::open(&config.db_path)?;
    let engine = engine::spawn_engine(store, policy, config.request_queue)?;

    let builder = if config.session_bus {
        zbus::connection::Builder::session()?
    } else {
        zbus::connection::Builder::system()?
    };
    let _connection = builder
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, VigilService::new(engine))?
        .build()
        .await?;

    tracing::info!(bus = BUS_NAME, session = config.session_bus, "vigild ready");

    // Keep running until signaled
    tokio::signal::ctrl_c().await?;
    tracing::info!("vigild shutting down");

    Ok(())
}
