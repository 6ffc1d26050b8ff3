//! Hardware abstraction for the pins the controller owns.
//!
//! The registry talks to a [`GpioBackend`] and never to rppal directly, so
//! the whole policy layer can run against the in-memory backend on a dev
//! machine and in tests. Levels at this seam are raw electrical levels
//! (`true` = high); the logical inversion happens in the registry.

use std::collections::{HashMap, HashSet};

use rppal::gpio::{Gpio, InputPin, OutputPin};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum GpioError {
    #[error("GPIO backend error: {0}")]
    Backend(String),

    #[error("pin {0} is not registered")]
    UnknownPin(u8),

    #[error("pin {0} is not an output")]
    NotAnOutput(u8),
}

pub trait GpioBackend: Send {
    /// Claims a pin as an output relay driver, set to `initial_high` (high =
    /// relay off under the pull-up convention).
    fn claim_output(&mut self, pin: u8, initial_high: bool) -> Result<(), GpioError>;

    /// Claims a pin as a pull-up input.
    fn claim_input(&mut self, pin: u8) -> Result<(), GpioError>;

    /// Raw level; `None` when the hardware cannot produce a reading right
    /// now. Callers must treat `None` as "no change", never as low.
    fn read(&self, pin: u8) -> Result<Option<bool>, GpioError>;

    fn write(&mut self, pin: u8, high: bool) -> Result<(), GpioError>;
}

enum PinHandle {
    Output(OutputPin),
    Input(InputPin),
}

/// Real hardware via rppal.
pub struct RppalBackend {
    gpio: Gpio,
    pins: HashMap<u8, PinHandle>,
}

impl RppalBackend {
    pub fn new() -> Result<Self, GpioError> {
        let gpio = Gpio::new().map_err(|e| GpioError::Backend(e.to_string()))?;
        Ok(Self {
            gpio,
            pins: HashMap::new(),
        })
    }
}

impl GpioBackend for RppalBackend {
    fn claim_output(&mut self, pin: u8, initial_high: bool) -> Result<(), GpioError> {
        let raw = self
            .gpio
            .get(pin)
            .map_err(|e| GpioError::Backend(e.to_string()))?;
        let output = if initial_high {
            raw.into_output_high()
        } else {
            raw.into_output_low()
        };
        debug!("Claimed GPIO {} as output (initial_high={})", pin, initial_high);
        let _ = self.pins.insert(pin, PinHandle::Output(output));
        Ok(())
    }

    fn claim_input(&mut self, pin: u8) -> Result<(), GpioError> {
        let raw = self
            .gpio
            .get(pin)
            .map_err(|e| GpioError::Backend(e.to_string()))?;
        debug!("Claimed GPIO {} as pull-up input", pin);
        let _ = self.pins.insert(pin, PinHandle::Input(raw.into_input_pullup()));
        Ok(())
    }

    fn read(&self, pin: u8) -> Result<Option<bool>, GpioError> {
        match self.pins.get(&pin) {
            Some(PinHandle::Output(out)) => Ok(Some(out.is_set_high())),
            Some(PinHandle::Input(input)) => Ok(Some(input.is_high())),
            None => Err(GpioError::UnknownPin(pin)),
        }
    }

    fn write(&mut self, pin: u8, high: bool) -> Result<(), GpioError> {
        match self.pins.get_mut(&pin) {
            Some(PinHandle::Output(out)) => {
                if high {
                    out.set_high();
                } else {
                    out.set_low();
                }
                Ok(())
            }
            Some(PinHandle::Input(_)) => Err(GpioError::NotAnOutput(pin)),
            None => Err(GpioError::UnknownPin(pin)),
        }
    }
}

/// Simulation backend: plain levels in a map. Used when `gpio.simulate` is
/// set and throughout the test suite.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    levels: HashMap<u8, Option<bool>>,
    outputs: HashSet<u8>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forces a raw level from "outside", e.g. a contact opening in a test.
    /// `None` simulates a pin that cannot be read.
    pub fn set_level(&mut self, pin: u8, level: Option<bool>) {
        let _ = self.levels.insert(pin, level);
    }
}

impl GpioBackend for MemoryBackend {
    fn claim_output(&mut self, pin: u8, initial_high: bool) -> Result<(), GpioError> {
        let _ = self.levels.insert(pin, Some(initial_high));
        let _ = self.outputs.insert(pin);
        Ok(())
    }

    fn claim_input(&mut self, pin: u8) -> Result<(), GpioError> {
        // Pull-up rest state: high until something pulls the line down. A
        // level forced via `set_level` before the claim survives it.
        let _ = self.levels.entry(pin).or_insert(Some(true));
        Ok(())
    }

    fn read(&self, pin: u8) -> Result<Option<bool>, GpioError> {
        self.levels
            .get(&pin)
            .copied()
            .ok_or(GpioError::UnknownPin(pin))
    }

    fn write(&mut self, pin: u8, high: bool) -> Result<(), GpioError> {
        if !self.outputs.contains(&pin) {
            if self.levels.contains_key(&pin) {
                return Err(GpioError::NotAnOutput(pin));
            }
            return Err(GpioError::UnknownPin(pin));
        }
        let _ = self.levels.insert(pin, Some(high));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_backend_tracks_levels() {
        let mut backend = MemoryBackend::new();
        backend.claim_output(16, true).unwrap();
        assert_eq!(backend.read(16).unwrap(), Some(true));

        backend.write(16, false).unwrap();
        assert_eq!(backend.read(16).unwrap(), Some(false));
    }

    #[test]
    fn memory_backend_rejects_writes_to_inputs() {
        let mut backend = MemoryBackend::new();
        backend.claim_input(3).unwrap();
        assert!(matches!(backend.write(3, false), Err(GpioError::NotAnOutput(3))));
        assert!(matches!(backend.write(9, false), Err(GpioError::UnknownPin(9))));
    }

    #[test]
    fn unavailable_reading_is_distinguishable() {
        let mut backend = MemoryBackend::new();
        backend.claim_input(3).unwrap();
        backend.set_level(3, None);
        assert_eq!(backend.read(3).unwrap(), None);
    }
}
