//! Watch-list alerts: a reduced `{"NOTIFY": {...}}` event for a configured
//! subset of channels, derived from whatever the last publish carried.

use std::collections::BTreeSet;

use serde_json::json;

use crate::gpio::channel::channel_name;
use crate::gpio::registry::ChannelRegistry;

pub struct NotifyFilter {
    pins: BTreeSet<u8>,
}

impl NotifyFilter {
    pub fn new(pins: impl IntoIterator<Item = u8>) -> Self {
        Self {
            pins: pins.into_iter().collect(),
        }
    }

    /// Filters the just-published dirty channels down to the allow-list and
    /// renders the NOTIFY event, ascending pin order. `None` when nothing
    /// on the watch list changed.
    pub fn event(&self, registry: &ChannelRegistry, published_dirty: &[u8]) -> Option<String> {
        let mut inner = serde_json::Map::new();
        let mut pins: Vec<u8> = published_dirty
            .iter()
            .copied()
            .filter(|p| self.pins.contains(p))
            .collect();
        pins.sort_unstable();
        pins.dedup();

        for pin in pins {
            if let Some(status) = registry.status(pin) {
                let _ = inner.insert(channel_name(pin), json!(status));
            }
        }

        if inner.is_empty() {
            None
        } else {
            Some(json!({ "NOTIFY": inner }).to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GpioConfig, MfaConfig};
    use crate::gpio::backend::MemoryBackend;
    use crate::gpio::registry::ChannelRegistry;
    use std::time::Instant;

    fn registry() -> ChannelRegistry {
        let gpio = GpioConfig {
            relay_pins: vec![16, 17],
            contact_pins: vec![1],
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
    fn filters_to_allow_list_in_pin_order() {
        let mut registry = registry();
        registry.set_status(16, 1);
        registry.set_status(1, 1);

        let filter = NotifyFilter::new([1, 16]);
        let event = filter.event(&registry, &[17, 16, 1]).unwrap();
        assert_eq!(event, r#"{"NOTIFY":{"GP1":1,"GP16":1}}"#);
    }

    #[test]
    fn no_event_when_nothing_watched_changed() {
        let registry = registry();
        let filter = NotifyFilter::new([1]);
        assert!(filter.event(&registry, &[16, 17]).is_none());

        let empty = NotifyFilter::new([]);
        assert!(empty.event(&registry, &[1, 16]).is_none());
    }
}
