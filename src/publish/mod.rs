//! # Status Publication
//!
//! Decides when the channel snapshot goes out and in what shape:
//!
//! ```text
//! publish/
//! ├── stats.rs  - process-wide publish statistics and the bounded log queue
//! ├── policy.rs - change detection and the full/partial publish decision
//! ├── notify.rs - allow-list alert events (NOTIFY)
//! └── worker.rs - the periodic tick driving all of the above
//! ```
//!
//! Per tick, strictly in order: drain queued log lines, compare hardware
//! against the cached statuses, decide whether to publish, send, then derive
//! the NOTIFY event. The ordering matters because a publish can stall for a
//! long time while the link is degraded and queued log lines must survive
//! that unscathed.

pub mod notify;
pub mod policy;
pub mod stats;
pub mod worker;

pub use stats::PublishStats;
pub use worker::TickWorker;
