//! # Inbound Message Dispatch
//!
//! The subscribed topic is shared: remote clients publish requests on it
//! and this device publishes its own status, logs and responses right back
//! to it. Everything that arrives is therefore parsed defensively:
//!
//! - payloads that are not JSON objects are dropped silently (they are
//!   usually our own plain-text log lines echoing back),
//! - objects carrying a response key (`IP`, `NOTIFY`, `UTC`) are our own
//!   output and are ignored,
//! - everything else becomes a typed request list, processed in sorted key
//!   order so an MFA code is seen before the channel write it authorizes,
//!   no matter where it sat in the raw payload.
//!
//! Channel actuations and commands are spawned into a `JoinSet` so a
//! momentary pulse or a slow HTTP lookup never blocks the next message.

pub mod commands;
pub mod dispatcher;
pub mod message;

pub use dispatcher::Dispatcher;
