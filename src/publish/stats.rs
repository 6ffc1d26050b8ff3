use std::collections::VecDeque;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::debug;

/// Process-wide publish statistics.
///
/// `publish_count == -1` is a terminal safety state: the flood guard sets it
/// once and nothing ever clears it, so publishing stays disabled until the
/// process restarts.
pub struct PublishStats {
    pub publish_count: i32,
    pub last_published: Instant,
    pub last_scheduled_published: Instant,
    /// True exactly once, for the very first tick.
    pub first_run: bool,
    /// A veto or an MFA failure left the remote client with a stale value;
    /// the next tick must send a full snapshot to correct it.
    pub force_full_republish: bool,
    pub outage_count: u32,
    pub link_up: bool,
    pub last_clock_sync: DateTime<Utc>,
    /// Most recent MFA code seen in any inbound message. Deliberately
    /// process-wide: the code and the channel set it authorizes may arrive
    /// in separate messages.
    pub last_seen_mfa: Option<u32>,
    pub started: Instant,

    log_lines: VecDeque<String>,
    log_limit: usize,
    /// Lines discarded because the queue was full during an outage.
    pub dropped_log_lines: u64,
}

impl PublishStats {
    pub fn new(now: Instant, log_limit: usize) -> Self {
        Self {
            publish_count: 0,
            last_published: now,
            last_scheduled_published: now,
            first_run: true,
            force_full_republish: false,
            outage_count: 0,
            link_up: false,
            last_clock_sync: Utc::now(),
            last_seen_mfa: None,
            started: now,
            log_lines: VecDeque::new(),
            log_limit,
            dropped_log_lines: 0,
        }
    }

    /// Queues a line for the next tick's drain. Bounded: when the queue is
    /// full (e.g. during a long outage) the oldest line is dropped.
    pub fn push_log(&mut self, line: impl Into<String>) {
        if self.log_lines.len() >= self.log_limit {
            let _ = self.log_lines.pop_front();
            self.dropped_log_lines += 1;
            debug!("Log queue full, dropped oldest line");
        }
        self.log_lines.push_back(line.into());
    }

    /// Takes all queued lines, oldest first.
    pub fn drain_logs(&mut self) -> Vec<String> {
        self.log_lines.drain(..).collect()
    }

    pub fn queued_logs(&self) -> usize {
        self.log_lines.len()
    }
}
