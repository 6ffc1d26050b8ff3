//! The periodic tick: drain logs, reconcile hardware, publish, notify.

use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};

use crate::config::Config;
use crate::dispatch::message::TIMESTAMP_KEY;
use crate::gpio::registry::ChannelRegistry;
use crate::mqtt::Publisher;
use crate::publish::notify::NotifyFilter;
use crate::publish::policy::{detect_changes, PublishKind, PublishPolicy};
use crate::state::AppState;

pub struct TickWorker {
    state: AppState,
    policy: PublishPolicy,
    notify: NotifyFilter,
    publisher: Publisher,
    tick: Duration,
    client_id: String,
}

impl TickWorker {
    pub fn new(state: AppState, config: &Config, publisher: Publisher) -> Self {
        Self {
            state,
            policy: config.publish.policy(),
            notify: NotifyFilter::new(config.notify.pins.iter().copied()),
            publisher,
            tick: Duration::from_secs(config.publish.tick_secs),
            client_id: config.mqtt.client_id.clone(),
        }
    }

    pub async fn run(mut self) {
        info!("Starting tick loop, period {}s", self.tick.as_secs());
        loop {
            tokio::time::sleep(self.tick).await;
            self.tick_once().await;
        }
    }

    async fn tick_once(&mut self) {
        // Queued log lines go out first. The snapshot publish below can
        // stall for a long time on a degraded link, and lines queued in the
        // meantime must neither vanish nor repeat.
        let lines = { self.state.stats.lock().await.drain_logs() };
        for line in lines {
            if let Err(e) = self.publisher.publish_text(&line).await {
                warn!("Failed to publish log line: {}", e);
            }
        }

        let any_dirty = {
            let mut registry = self.state.registry.lock().await;
            detect_changes(&mut registry)
        };

        let now = Instant::now();
        let kind = {
            let mut stats = self.state.stats.lock().await;
            if stats.first_run {
                stats.push_log(format!("Subscribed for ClientID: {}", self.client_id));
            }
            self.policy.decide(&mut stats, any_dirty, now)
        };
        let Some(kind) = kind else { return };

        let (payload, dirty_pins) = {
            let registry = self.state.registry.lock().await;
            build_snapshot(&registry, kind)
        };

        match self.publisher.publish_json(&payload).await {
            Ok(()) => {
                let event = {
                    let mut registry = self.state.registry.lock().await;
                    clear_published(&mut registry, kind, &dirty_pins);
                    self.notify.event(&registry, &dirty_pins)
                };
                if let Some(event) = event {
                    self.state.stats.lock().await.push_log(event);
                }
            }
            Err(e) => warn!("Failed to publish status snapshot: {}", e),
        }
    }
}

/// Builds the outbound snapshot plus the list of channels that were dirty
/// at publish time. The `UTC` key marks the payload as device-originated so
/// receivers (including this process) can tell it apart from requests.
pub fn build_snapshot(
    registry: &ChannelRegistry,
    kind: PublishKind,
) -> (serde_json::Value, Vec<u8>) {
    let mut map = serde_json::Map::new();
    let mut dirty_pins = Vec::new();

    for channel in registry.channels() {
        if channel.dirty {
            dirty_pins.push(channel.pin);
        }
        if kind == PublishKind::Full || channel.dirty {
            let _ = map.insert(channel.name(), json!(channel.status));
        }
    }

    let _ = map.insert(
        TIMESTAMP_KEY.to_string(),
        json!(Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()),
    );
    (serde_json::Value::Object(map), dirty_pins)
}

/// Partial publishes consume the dirty flags of the channels they carried;
/// full snapshots leave them alone (a full send can happen for reasons
/// unrelated to which deltas the client has consumed).
pub fn clear_published(registry: &mut ChannelRegistry, kind: PublishKind, dirty_pins: &[u8]) {
    if kind == PublishKind::Partial {
        for &pin in dirty_pins {
            registry.clear_dirty(pin);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GpioConfig, MfaConfig};
    use crate::gpio::backend::MemoryBackend;

    fn registry() -> ChannelRegistry {
        let gpio = GpioConfig {
            relay_pins: vec![16, 17],
            contact_pins: vec![2],
            ..GpioConfig::default()
        };
        ChannelRegistry::from_config(
            Box::new(MemoryBackend::new()),
            &gpio,
            &MfaConfig::default(),
            Instant::now(),
        )
        .unwrap()
    }

    #[test]
    fn full_snapshot_lists_every_channel_in_pin_order() {
        let registry = registry();
        let (payload, dirty) = build_snapshot(&registry, PublishKind::Full);
        let keys: Vec<&String> = payload.as_object().unwrap().keys().collect();
        assert_eq!(keys, ["GP2", "GP16", "GP17", "UTC"]);
        assert!(dirty.is_empty());
    }

    #[test]
    fn partial_snapshot_carries_only_dirty_channels() {
        let mut registry = registry();
        registry.set_status(16, 1);
        registry.mark_dirty(16);

        let (payload, dirty) = build_snapshot(&registry, PublishKind::Partial);
        let object = payload.as_object().unwrap();
        assert_eq!(object.len(), 2); // GP16 + UTC
        assert_eq!(object["GP16"], 1);
        assert!(object.contains_key("UTC"));
        assert_eq!(dirty, vec![16]);
    }

    #[test]
    fn partial_clear_touches_only_included_channels() {
        let mut registry = registry();
        registry.mark_dirty(16);
        registry.mark_dirty(17);

        // 17 was not part of the publish (say it went dirty mid-send).
        clear_published(&mut registry, PublishKind::Partial, &[16]);
        assert!(!registry.channel(16).unwrap().dirty);
        assert!(registry.channel(17).unwrap().dirty);
    }

    #[test]
    fn full_publish_leaves_dirty_flags_alone() {
        let mut registry = registry();
        registry.mark_dirty(16);
        clear_published(&mut registry, PublishKind::Full, &[16]);
        assert!(registry.channel(16).unwrap().dirty);
    }
}
