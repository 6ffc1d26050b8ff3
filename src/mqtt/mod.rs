//! # MQTT Link
//!
//! Thin wrapper around rumqttc: one background task owns the event loop,
//! re-subscribes on every (re)connect, counts outages, and forwards
//! payloads arriving on the subscribed topic to the dispatcher. Outbound
//! traffic goes through the cloneable [`Publisher`].
//!
//! The link is deliberately dumb. Reconnect pacing is a sleep between poll
//! errors; delivery guarantees are whatever the configured QoS gives us.
//! All policy about *what* to send lives in the publish module.

pub mod handler;

pub use handler::{start_link, Publisher};
