//! Burnout protection: rate limiting consulted before every relay write.
//!
//! Two layers of protection. The cooldown catches rapid toggling, typically
//! a backlog of QoS1 retries arriving after an outage. The burst window
//! catches sustained flapping; each burst veto counts as a violation, and
//! enough violations disable the channel until the process is restarted.

use std::time::{Duration, Instant};

use crate::gpio::channel::Channel;

/// Outcome of [`BurnoutPolicy::authorize`], checked before any hardware
/// mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteDecision {
    Allow,
    /// Too soon after the previous write.
    SkipCooldown,
    /// Too many writes inside the burst window; counted as a violation.
    SkipThresholdExceeded,
    /// Too many violations; sticks until restart.
    PermanentlyDisabled,
}

#[derive(Debug, Clone)]
pub struct BurnoutPolicy {
    pub cooldown: Duration,
    pub burst_window: Duration,
    pub burst_max: u32,
    pub violation_max: u32,
    /// Whether cooldown skips also count toward the permanent lockout.
    pub count_cooldown_violations: bool,
}

impl BurnoutPolicy {
    /// Decides whether a write may touch hardware, updating the channel's
    /// violation bookkeeping as a side effect. Evaluation order matters:
    /// cooldown first, then the burst threshold, then the rolling-window
    /// reset; the permanent lockout check runs last and overrides
    /// everything.
    pub fn authorize(&self, channel: &mut Channel, now: Instant) -> WriteDecision {
        if !channel.write_allowed {
            return WriteDecision::PermanentlyDisabled;
        }

        let elapsed = now.saturating_duration_since(channel.last_modified);
        let mut decision = WriteDecision::Allow;

        if elapsed < self.cooldown {
            decision = WriteDecision::SkipCooldown;
            if self.count_cooldown_violations {
                channel.violation_count += 1;
            }
        } else if elapsed < self.burst_window && channel.modified_count > self.burst_max {
            channel.violation_count += 1;
            decision = WriteDecision::SkipThresholdExceeded;
        } else if elapsed >= self.burst_window && channel.modified_count > 0 {
            // Burst window expired, the counter starts over.
            channel.modified_count = 0;
        }

        if channel.violation_count > self.violation_max + 1 {
            channel.write_allowed = false;
            return WriteDecision::PermanentlyDisabled;
        }

        decision
    }

    /// Bookkeeping after an allowed write. `now` is the request time, not
    /// the completion time, so a momentary pulse's cooldown starts when it
    /// was asked for.
    pub fn record_write(&self, channel: &mut Channel, now: Instant) {
        channel.last_modified = now;
        channel.modified_count += 1;
        channel.dirty = true;
    }

    /// Log line published to the broker for a veto, mirroring the severity
    /// split: skips are warnings, a lockout is an error.
    pub fn veto_message(&self, decision: WriteDecision, name: &str) -> Option<String> {
        match decision {
            WriteDecision::Allow => None,
            WriteDecision::SkipCooldown => Some(format!(
                "Warning: Skipping {} value change for hardware burnout protection, min interval between value change is {} seconds",
                name,
                self.cooldown.as_secs()
            )),
            WriteDecision::SkipThresholdExceeded => Some(format!(
                "Warning: Skipping {} value change for hardware burnout protection, number of change exceeded max threshold {} in {} seconds",
                name,
                self.burst_max,
                self.burst_window.as_secs()
            )),
            WriteDecision::PermanentlyDisabled => Some(format!(
                "Error: {} value change is permanently disabled (until hardware reset) for protection, number of violation exceeded {}",
                name,
                self.violation_max
            )),
        }
    }
}
