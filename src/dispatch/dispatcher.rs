//! Routes parsed requests: records MFA codes, spawns commands and channel
//! actuations, and runs the burnout-guarded write path itself.

use std::time::Instant;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::dispatch::commands;
use crate::dispatch::message::{parse_requests, CommandKind, Request};
use crate::gpio::burnout::{BurnoutPolicy, WriteDecision};
use crate::gpio::channel::ChannelRole;
use crate::state::AppState;
use crate::totp;

pub struct Dispatcher {
    state: AppState,
    burnout: BurnoutPolicy,
    mfa_window: usize,
    ip_provider: String,
    inbound: mpsc::Receiver<Vec<u8>>,
    tasks: JoinSet<()>,
}

impl Dispatcher {
    pub fn new(state: AppState, config: &Config, inbound: mpsc::Receiver<Vec<u8>>) -> Self {
        Self {
            state,
            burnout: config.burnout.policy(),
            mfa_window: config.mfa.window,
            ip_provider: config.net.ip_provider.clone(),
            inbound,
            tasks: JoinSet::new(),
        }
    }

    pub async fn run(mut self) {
        info!("Dispatcher started");
        while let Some(payload) = self.inbound.recv().await {
            self.handle_payload(&payload).await;
            // Reap whatever actuations have finished; nothing to do with
            // their results, they log for themselves.
            while self.tasks.try_join_next().is_some() {}
        }
        // Channel closed: let in-flight pulses finish their de-assert.
        while self.tasks.join_next().await.is_some() {}
        info!("Dispatcher stopped");
    }

    async fn handle_payload(&mut self, payload: &[u8]) {
        // Not a request (malformed, or our own echo): drop without logging,
        // the shared topic makes this a normal occurrence.
        let Some(requests) = parse_requests(payload) else {
            return;
        };

        // First pass: any MFA code is recorded before channel sets are
        // evaluated, regardless of where it sat in the payload.
        for request in &requests {
            if let Request::Mfa(code) = request {
                self.state.stats.lock().await.last_seen_mfa = Some(*code);
                debug!("Recorded inbound MFA code");
            }
        }

        for request in requests {
            match request {
                Request::Command(kind) => self.spawn_command(kind),
                Request::ChannelSet { pin, value } => self.spawn_channel_set(pin, value),
                Request::Mfa(_) => {}
            }
        }
    }

    fn spawn_command(&mut self, kind: CommandKind) {
        let state = self.state.clone();
        match kind {
            CommandKind::Stats => {
                let _ = self.tasks.spawn(commands::run_stats(state));
            }
            CommandKind::Refresh => {
                let _ = self.tasks.spawn(async move {
                    state.stats.lock().await.force_full_republish = true;
                    info!("Full republish requested");
                });
            }
            CommandKind::GetIp => {
                let provider = self.ip_provider.clone();
                let _ = self.tasks.spawn(commands::run_getip(state, provider));
            }
        }
    }

    fn spawn_channel_set(&mut self, pin: u8, value: u8) {
        let state = self.state.clone();
        let burnout = self.burnout.clone();
        let mfa_window = self.mfa_window;
        let _ = self
            .tasks
            .spawn(async move { actuate(state, burnout, mfa_window, pin, value).await });
    }
}

/// One burnout-guarded actuation attempt against a single relay channel.
pub async fn actuate(
    state: AppState,
    policy: BurnoutPolicy,
    mfa_window: usize,
    pin: u8,
    value: u8,
) {
    let now = Instant::now();
    let mut registry = state.registry.lock().await;

    let Some(channel) = registry.channel(pin) else {
        return;
    };
    if !channel.role.is_relay() {
        debug!("Ignoring set request for non-relay {}", channel.name());
        return;
    }
    // No change requested: nothing to do (this also swallows the echo of
    // our own partial publishes).
    if channel.status == value {
        return;
    }

    let name = channel.name();
    let momentary = channel.role == ChannelRole::MomentaryRelay;
    let wait = channel.momentary_wait;
    let secrets = channel.mfa_secrets.clone();

    if !secrets.is_empty() {
        let code = { state.stats.lock().await.last_seen_mfa };
        let now_unix = Utc::now().timestamp().max(0) as u64;
        let authorized =
            code.is_some_and(|c| totp::code_in_window(c, &secrets, now_unix, mfa_window));
        if !authorized {
            drop(registry);
            let mut stats = state.stats.lock().await;
            let msg = format!("Warning: MFA code is missing, invalid or expired, skipping {name} value change");
            warn!("{msg}");
            stats.push_log(msg);
            // Client must be corrected back to the true value. No burnout
            // counters move for an authentication failure.
            stats.force_full_republish = true;
            return;
        }
    }

    let Some(channel) = registry.channel_mut(pin) else {
        return;
    };
    let decision = policy.authorize(channel, now);
    if decision != WriteDecision::Allow {
        let msg = policy.veto_message(decision, &name);
        drop(registry);
        let mut stats = state.stats.lock().await;
        if let Some(msg) = msg {
            warn!("{msg}");
            stats.push_log(msg);
        }
        stats.force_full_republish = true;
        return;
    }

    if momentary {
        // Assert, release every lock for the pulse width, then de-assert.
        // Cooldown bookkeeping uses the request time, not completion time.
        if let Err(e) = registry.write_hardware(pin, 1) {
            warn!("Failed to assert {}: {}", name, e);
            return;
        }
        if let Some(channel) = registry.channel_mut(pin) {
            policy.record_write(channel, now);
        }
        drop(registry);

        tokio::time::sleep(wait).await;

        let mut registry = state.registry.lock().await;
        if let Err(e) = registry.write_hardware(pin, 0) {
            warn!("Failed to de-assert {}: {}", name, e);
        }
        if let Err(e) = registry.sync_from_hardware(pin) {
            warn!("Failed to re-read {}: {}", name, e);
        }
        // The pulse ends back in the rest state, so plain change detection
        // would never see it. Mark dirty explicitly.
        registry.mark_dirty(pin);
        info!("{} pulsed for {:?}", name, wait);
    } else {
        if let Err(e) = registry.write_hardware(pin, value) {
            warn!("Failed to write {}: {}", name, e);
            return;
        }
        if let Some(channel) = registry.channel_mut(pin) {
            policy.record_write(channel, now);
        }
        if let Err(e) = registry.sync_from_hardware(pin) {
            warn!("Failed to re-read {}: {}", name, e);
        }
        info!("{} set to {}", name, value);
    }
}
