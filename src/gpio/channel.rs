use std::time::{Duration, Instant};

/// Wire-name prefix, e.g. pin 16 appears as `GP16` in payloads.
pub const GPIO_PREFIX: &str = "GP";

/// Fixed role of a channel, decided once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelRole {
    /// Relay that holds whatever value was last written.
    OutputRelay,
    /// Relay that pulses and returns to rest (e.g. a garage door remote).
    MomentaryRelay,
    /// Read-only contact such as a magnetic door sensor.
    ContactInput,
}

impl ChannelRole {
    pub fn is_relay(self) -> bool {
        matches!(self, ChannelRole::OutputRelay | ChannelRole::MomentaryRelay)
    }
}

/// One physical I/O line and its cached state.
///
/// `status` is in human polarity: 1 = on/connected, which is the inverse of
/// the electrical level under the pull-up convention. The timing fields and
/// counters only carry meaning for relay roles; the burnout guard is their
/// sole consumer.
#[derive(Debug, Clone)]
pub struct Channel {
    pub pin: u8,
    pub role: ChannelRole,
    /// Cached logical value, mirrors the last hardware read.
    pub status: u8,
    /// Value changed since the last successful partial publish.
    pub dirty: bool,
    /// Cleared permanently by the burnout guard; only a restart recovers.
    pub write_allowed: bool,
    pub last_modified: Instant,
    pub modified_count: u32,
    pub violation_count: u32,
    /// Pulse width for momentary relays.
    pub momentary_wait: Duration,
    /// Base32 secrets allowed to actuate this channel; empty = no MFA.
    pub mfa_secrets: Vec<String>,
}

impl Channel {
    pub fn new(
        pin: u8,
        role: ChannelRole,
        momentary_wait: Duration,
        mfa_secrets: Vec<String>,
        now: Instant,
    ) -> Self {
        // Start well outside any cooldown so the first write after boot is
        // not vetoed.
        let last_modified = now
            .checked_sub(Duration::from_secs(3600))
            .unwrap_or(now);

        Self {
            pin,
            role,
            status: 0,
            dirty: false,
            write_allowed: true,
            last_modified,
            modified_count: 0,
            violation_count: 0,
            momentary_wait,
            mfa_secrets,
        }
    }

    pub fn name(&self) -> String {
        channel_name(self.pin)
    }
}

/// `16` -> `"GP16"`.
pub fn channel_name(pin: u8) -> String {
    format!("{GPIO_PREFIX}{pin}")
}

/// `"GP16"` -> `Some(16)`, anything else -> `None`.
pub fn parse_channel_name(name: &str) -> Option<u8> {
    name.strip_prefix(GPIO_PREFIX)?.parse().ok()
}
