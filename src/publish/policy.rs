//! Change detection against the cached channel statuses and the decision of
//! whether (and how much) to publish.

use std::time::{Duration, Instant};

use tracing::{debug, error, warn};

use crate::gpio::channel::channel_name;
use crate::gpio::registry::ChannelRegistry;
use crate::publish::stats::PublishStats;

/// Shape of an outbound status snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishKind {
    /// Every configured channel.
    Full,
    /// Only channels that changed since the last partial publish.
    Partial,
}

/// Compares live hardware against every cached status, updating the cache
/// and dirty flags. Contact inputs are covered here too, since nothing else
/// ever writes them. Returns whether any channel is dirty, including
/// channels already marked dirty by a relay write.
pub fn detect_changes(registry: &mut ChannelRegistry) -> bool {
    let mut any_dirty = false;

    for pin in registry.pins() {
        match registry.read_hardware(pin) {
            Ok(Some(value)) => {
                if registry.status(pin) != Some(value) {
                    debug!("{} hardware value changed to {}", channel_name(pin), value);
                    registry.set_status(pin, value);
                    registry.mark_dirty(pin);
                }
            }
            // No usable signal: not a change, and explicitly not a zero.
            Ok(None) => {}
            Err(e) => warn!("Failed to read {}: {}", channel_name(pin), e),
        }

        if registry.channel(pin).is_some_and(|c| c.dirty) {
            any_dirty = true;
        }
    }

    any_dirty
}

#[derive(Debug, Clone)]
pub struct PublishPolicy {
    pub threshold: Duration,
    pub counter_max: i32,
    /// Interval for unconditional full snapshots; `None` disables them.
    pub scheduled: Option<Duration>,
}

impl PublishPolicy {
    /// Applies the flood guard, then picks the first matching publish rule.
    /// Increments the publish counter when a publish is due; the caller owns
    /// actually sending it (and clearing dirty flags on success).
    pub fn decide(
        &self,
        stats: &mut PublishStats,
        any_dirty: bool,
        now: Instant,
    ) -> Option<PublishKind> {
        let since_last = now.saturating_duration_since(stats.last_published);

        // Flood guard. Once tripped, publish_count stays -1 forever.
        if since_last < self.threshold && stats.publish_count > self.counter_max {
            stats.publish_count = -1;
            let msg = "Error: Abnormal number of publish detected in a short interval, publishing is stopped until hardware restart";
            error!("{msg}");
            stats.push_log(msg);
        } else if since_last > self.threshold && stats.publish_count >= 0 {
            stats.publish_count = 0;
        }

        if stats.publish_count < 0 {
            return None;
        }

        let kind = if stats.first_run {
            stats.first_run = false;
            Some(PublishKind::Full)
        } else if stats.force_full_republish {
            stats.force_full_republish = false;
            Some(PublishKind::Full)
        } else if self
            .scheduled
            .is_some_and(|d| now.saturating_duration_since(stats.last_scheduled_published) > d)
        {
            stats.last_scheduled_published = now;
            Some(PublishKind::Full)
        } else if any_dirty {
            Some(PublishKind::Partial)
        } else {
            None
        };

        if kind.is_some() {
            stats.publish_count += 1;
            stats.last_published = now;
        }
        kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GpioConfig, MfaConfig};
    use crate::gpio::backend::{GpioBackend, MemoryBackend};

    fn policy() -> PublishPolicy {
        PublishPolicy {
            threshold: Duration::from_secs(10),
            counter_max: 20,
            scheduled: Some(Duration::from_secs(7200)),
        }
    }

    fn registry_with_contact() -> (ChannelRegistry, u8) {
        let gpio = GpioConfig {
            relay_pins: vec![16],
            contact_pins: vec![3],
            ..GpioConfig::default()
        };
        let registry = ChannelRegistry::from_config(
            Box::new(MemoryBackend::new()),
            &gpio,
            &MfaConfig::default(),
            Instant::now(),
        )
        .unwrap();
        (registry, 3)
    }

    #[test]
    fn first_tick_publishes_full_regardless_of_dirt() {
        let policy = policy();
        let now = Instant::now();
        let mut stats = PublishStats::new(now, 16);

        let kind = policy.decide(&mut stats, false, now + Duration::from_secs(1));
        assert_eq!(kind, Some(PublishKind::Full));
        assert!(!stats.first_run);
        assert_eq!(stats.publish_count, 1);
    }

    #[test]
    fn force_full_republish_is_consumed() {
        let policy = policy();
        let now = Instant::now();
        let mut stats = PublishStats::new(now, 16);
        stats.first_run = false;
        stats.force_full_republish = true;

        assert_eq!(
            policy.decide(&mut stats, false, now + Duration::from_secs(1)),
            Some(PublishKind::Full)
        );
        assert!(!stats.force_full_republish);
    }

    #[test]
    fn dirty_channels_produce_a_partial() {
        let policy = policy();
        let now = Instant::now();
        let mut stats = PublishStats::new(now, 16);
        stats.first_run = false;

        assert_eq!(
            policy.decide(&mut stats, true, now + Duration::from_secs(1)),
            Some(PublishKind::Partial)
        );
        assert_eq!(
            policy.decide(&mut stats, false, now + Duration::from_secs(2)),
            None
        );
    }

    #[test]
    fn scheduled_interval_forces_full() {
        let policy = policy();
        let now = Instant::now();
        let mut stats = PublishStats::new(now, 16);
        stats.first_run = false;

        let later = now + Duration::from_secs(7201);
        assert_eq!(policy.decide(&mut stats, false, later), Some(PublishKind::Full));
        // Schedule was reset, the next quiet tick publishes nothing.
        assert_eq!(
            policy.decide(&mut stats, false, later + Duration::from_secs(11)),
            None
        );
    }

    #[test]
    fn flood_guard_is_terminal() {
        let policy = policy();
        let now = Instant::now();
        let mut stats = PublishStats::new(now, 16);
        stats.first_run = false;
        stats.publish_count = policy.counter_max + 1;
        stats.last_published = now;

        // Over the counter inside the threshold trips the guard.
        assert_eq!(
            policy.decide(&mut stats, true, now + Duration::from_secs(1)),
            None
        );
        assert_eq!(stats.publish_count, -1);

        // Nothing ever publishes again, not even long after the threshold.
        assert_eq!(
            policy.decide(&mut stats, true, now + Duration::from_secs(3600)),
            None
        );
        stats.force_full_republish = true;
        assert_eq!(
            policy.decide(&mut stats, true, now + Duration::from_secs(7200)),
            None
        );
        assert_eq!(stats.publish_count, -1);
    }

    #[test]
    fn counter_resets_after_quiet_threshold() {
        let policy = policy();
        let now = Instant::now();
        let mut stats = PublishStats::new(now, 16);
        stats.first_run = false;
        stats.publish_count = 7;
        stats.last_published = now;

        let later = now + Duration::from_secs(11);
        assert_eq!(policy.decide(&mut stats, true, later), Some(PublishKind::Partial));
        // Reset to 0, then incremented by the publish.
        assert_eq!(stats.publish_count, 1);
    }

    #[test]
    fn detect_changes_sees_contact_transitions_once() {
        let (mut registry, contact) = registry_with_contact();

        // Rest state, nothing dirty.
        assert!(!detect_changes(&mut registry));

        // Simulated contact closes: line pulled low, logical 1. The memory
        // backend is boxed inside the registry, so poke the raw write path
        // via a fresh registry instead.
        let gpio = GpioConfig {
            contact_pins: vec![contact],
            ..GpioConfig::default()
        };
        let mut backend = MemoryBackend::new();
        backend.claim_input(contact).unwrap();
        backend.set_level(contact, Some(false));
        let mut registry = ChannelRegistry::from_config(
            Box::new(backend),
            &gpio,
            &MfaConfig::default(),
            Instant::now(),
        )
        .unwrap();
        // from_config already synced status to the closed contact, so mark
        // it open in the cache to simulate a transition.
        registry.set_status(contact, 0);

        assert!(detect_changes(&mut registry));
        assert_eq!(registry.status(contact), Some(1));
        assert!(registry.channel(contact).unwrap().dirty);

        // Idempotent: a second pass with no hardware change reports the
        // still-dirty channel, and once cleared, nothing at all.
        assert!(detect_changes(&mut registry));
        registry.clear_dirty(contact);
        assert!(!detect_changes(&mut registry));
    }
}
