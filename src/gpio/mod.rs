//! # GPIO Channel Layer
//!
//! Everything that touches physical pins lives here:
//!
//! ```text
//! gpio/
//! ├── backend.rs  - hardware abstraction (rppal on a Pi, in-memory otherwise)
//! ├── channel.rs  - channel records and their roles
//! ├── registry.rs - the single owner of all channel state
//! └── burnout.rs  - rate limiting before any hardware write
//! ```
//!
//! All pins use the pull-up convention: 0 V on the wire means asserted.
//! The registry converts between that raw electrical level and the logical
//! 0/1 the rest of the application (and the MQTT payloads) speak, so no
//! other module ever sees a raw level.

pub mod backend;
pub mod burnout;
pub mod channel;
pub mod registry;

pub use backend::{GpioBackend, MemoryBackend, RppalBackend};
pub use registry::ChannelRegistry;
