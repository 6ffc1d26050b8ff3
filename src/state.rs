//! Shared application state.
//!
//! The registry and the publish statistics are mutated from two directions
//! at once: inbound message handling and the periodic tick. Everything is
//! funneled through these two mutexes; when both are needed, the registry
//! lock is always taken first. Neither lock is ever held across a
//! suspension point that can stall (momentary pulse, broker publish, HTTP).

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::gpio::registry::ChannelRegistry;
use crate::publish::stats::PublishStats;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Mutex<ChannelRegistry>>,
    pub stats: Arc<Mutex<PublishStats>>,
}

impl AppState {
    pub fn new(registry: ChannelRegistry, stats: PublishStats) -> Self {
        Self {
            registry: Arc::new(Mutex::new(registry)),
            stats: Arc::new(Mutex::new(stats)),
        }
    }
}
