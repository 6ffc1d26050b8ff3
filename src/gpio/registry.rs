//! Single owner of all channel records and the only module that converts
//! between raw electrical levels and logical values.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::config::{GpioConfig, MfaConfig};
use crate::gpio::backend::{GpioBackend, GpioError};
use crate::gpio::channel::{channel_name, Channel, ChannelRole};

/// Owns the backend plus one [`Channel`] record per configured pin. The
/// `BTreeMap` keeps iteration in ascending pin order, which is what every
/// outbound payload wants ("GP2" before "GP16", numerically, not lexically).
pub struct ChannelRegistry {
    backend: Box<dyn GpioBackend>,
    channels: BTreeMap<u8, Channel>,
}

impl ChannelRegistry {
    /// Claims every configured pin and seeds each cached status from a
    /// hardware read.
    pub fn from_config(
        mut backend: Box<dyn GpioBackend>,
        gpio: &GpioConfig,
        mfa: &MfaConfig,
        now: Instant,
    ) -> Result<Self, GpioError> {
        let default_wait = Duration::from_secs(gpio.momentary_wait_secs);
        let mut channels = BTreeMap::new();

        for &pin in &gpio.relay_pins {
            backend.claim_output(pin, true)?;
            let channel = Channel::new(
                pin,
                ChannelRole::OutputRelay,
                default_wait,
                mfa.secrets_for(pin),
                now,
            );
            let _ = channels.insert(pin, channel);
        }

        for &pin in &gpio.momentary_pins {
            backend.claim_output(pin, true)?;
            let wait = gpio.momentary_wait_for(pin).unwrap_or(default_wait);
            let channel = Channel::new(
                pin,
                ChannelRole::MomentaryRelay,
                wait,
                mfa.secrets_for(pin),
                now,
            );
            let _ = channels.insert(pin, channel);
        }

        for &pin in &gpio.contact_pins {
            backend.claim_input(pin)?;
            let channel = Channel::new(
                pin,
                ChannelRole::ContactInput,
                default_wait,
                Vec::new(),
                now,
            );
            let _ = channels.insert(pin, channel);
        }

        let mut registry = Self { backend, channels };
        for pin in registry.pins() {
            registry.sync_from_hardware(pin)?;
        }

        info!("Initialized {} GPIO channels", registry.channels.len());
        Ok(registry)
    }

    /// Logical hardware read. `None` means the pin produced no usable
    /// reading; callers must treat that as "no change", never as 0.
    pub fn read_hardware(&self, pin: u8) -> Result<Option<u8>, GpioError> {
        let raw = self.backend.read(pin)?;
        // Pull-up convention: high = inactive = logical 0.
        Ok(raw.map(|high| if high { 0 } else { 1 }))
    }

    /// Writes a logical value to an output pin.
    pub fn write_hardware(&mut self, pin: u8, logical: u8) -> Result<(), GpioError> {
        if !self.channels.contains_key(&pin) {
            return Err(GpioError::UnknownPin(pin));
        }
        self.backend.write(pin, logical == 0)
    }

    /// Refreshes the cached status from hardware. An unavailable reading
    /// leaves the cache untouched.
    pub fn sync_from_hardware(&mut self, pin: u8) -> Result<(), GpioError> {
        if let Some(value) = self.read_hardware(pin)? {
            if let Some(channel) = self.channels.get_mut(&pin) {
                channel.status = value;
            }
        }
        Ok(())
    }

    pub fn status(&self, pin: u8) -> Option<u8> {
        self.channels.get(&pin).map(|c| c.status)
    }

    pub fn set_status(&mut self, pin: u8, value: u8) {
        if let Some(channel) = self.channels.get_mut(&pin) {
            if channel.status != value {
                debug!("{} status {} -> {}", channel_name(pin), channel.status, value);
            }
            channel.status = value;
        }
    }

    pub fn mark_dirty(&mut self, pin: u8) {
        if let Some(channel) = self.channels.get_mut(&pin) {
            channel.dirty = true;
        }
    }

    pub fn clear_dirty(&mut self, pin: u8) {
        if let Some(channel) = self.channels.get_mut(&pin) {
            channel.dirty = false;
        }
    }

    /// All pins in ascending numeric order.
    pub fn pins(&self) -> Vec<u8> {
        self.channels.keys().copied().collect()
    }

    pub fn channels(&self) -> impl Iterator<Item = &Channel> {
        self.channels.values()
    }

    pub fn channel(&self, pin: u8) -> Option<&Channel> {
        self.channels.get(&pin)
    }

    pub fn channel_mut(&mut self, pin: u8) -> Option<&mut Channel> {
        self.channels.get_mut(&pin)
    }
}
