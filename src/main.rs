mod config;
mod dispatch;
mod gpio;
mod mqtt;
mod net;
mod publish;
mod state;
mod totp;

use std::time::Instant;

use color_eyre::{eyre::eyre, Result};
use tokio::sync::mpsc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::gpio::{ChannelRegistry, GpioBackend, MemoryBackend, RppalBackend};
use crate::publish::{PublishStats, TickWorker};
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "relayctl.toml".to_string());
    info!("Loading configuration from {config_path}");
    let config = Config::load(&config_path)?;

    let backend: Box<dyn GpioBackend> = if config.gpio.simulate {
        warn!("GPIO simulation enabled, no hardware will be touched");
        Box::new(MemoryBackend::new())
    } else {
        Box::new(RppalBackend::new().map_err(|e| eyre!("Failed to open GPIO: {e}"))?)
    };

    let now = Instant::now();
    let registry = ChannelRegistry::from_config(backend, &config.gpio, &config.mfa, now)
        .map_err(|e| eyre!("Failed to initialize GPIO channels: {e}"))?;
    let stats = PublishStats::new(now, config.publish.log_queue_limit);
    let state = AppState::new(registry, stats);

    // Inbound payloads flow MQTT link -> dispatcher; the tick worker runs
    // independently on the same shared state.
    let (inbound_tx, inbound_rx) = mpsc::channel(100);
    let (publisher, _link_handle) = mqtt::start_link(&config.mqtt, state.stats.clone(), inbound_tx);

    let dispatcher = Dispatcher::new(state.clone(), &config, inbound_rx);
    let _dispatcher_handle = tokio::spawn(dispatcher.run());

    info!("relayctl running as ClientID {}", config.mqtt.client_id);
    TickWorker::new(state, &config, publisher).run().await;

    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }

    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();
    Ok(())
}
