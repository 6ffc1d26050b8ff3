//! Device commands: everything a `{"CMD": ...}` request can trigger.
//!
//! Responses never go to the broker directly from here; they ride the log
//! queue and are drained by the next tick, which keeps publish calls out of
//! the inbound handling path entirely.

use chrono::Utc;
use serde_json::json;
use sysinfo::{Components, System};
use tracing::{info, warn};

use crate::dispatch::message::IP_KEY;
use crate::net;
use crate::state::AppState;

/// `{"CMD": "stats"}`: one human-readable summary line.
pub async fn run_stats(state: AppState) {
    let line = {
        let stats = state.stats.lock().await;
        let uptime = format_duration(stats.started.elapsed().as_secs());
        format!(
            "Stats: Uptime={}, Outages={}, DroppedLogs={}, Memory={}, Temp={}, ClockSync={}, Rtc={}",
            uptime,
            stats.outage_count,
            stats.dropped_log_lines,
            memory_usage(),
            temperature(),
            stats.last_clock_sync.format("%Y-%m-%d %H:%M:%S"),
            Utc::now().format("%Y-%m-%d %H:%M:%S"),
        )
    };
    info!("{line}");
    state.stats.lock().await.push_log(line);
}

/// `{"CMD": "getip"}`: look up the public address and queue the JSON reply.
pub async fn run_getip(state: AppState, provider: String) {
    match net::public_ip(&provider).await {
        Ok(ip) => {
            info!("Public IP: {ip}");
            state
                .stats
                .lock()
                .await
                .push_log(json!({ IP_KEY: ip }).to_string());
        }
        Err(e) => {
            warn!("Public IP lookup failed: {e}");
            state
                .stats
                .lock()
                .await
                .push_log(format!("Warning: Unable to fetch public IP address: {e}"));
        }
    }
}

/// `86465` -> `"1d 0h 1m 5s"`.
fn format_duration(mut seconds: u64) -> String {
    let days = seconds / 86_400;
    seconds %= 86_400;
    let hours = seconds / 3_600;
    seconds %= 3_600;
    let minutes = seconds / 60;
    seconds %= 60;
    format!("{days}d {hours}h {minutes}m {seconds}s")
}

fn memory_usage() -> String {
    let mut sys = System::new();
    sys.refresh_memory();
    let total = sys.total_memory();
    if total == 0 {
        return "n/a".to_string();
    }
    format!("{:.2}%", sys.used_memory() as f64 / total as f64 * 100.0)
}

fn temperature() -> String {
    let components = Components::new_with_refreshed_list();
    let max = components
        .iter()
        .map(|c| c.temperature())
        .fold(f32::NEG_INFINITY, f32::max);
    if max.is_finite() {
        format!("{max:.1}C")
    } else {
        "n/a".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GpioConfig, MfaConfig};
    use crate::gpio::backend::MemoryBackend;
    use crate::gpio::registry::ChannelRegistry;
    use crate::publish::stats::PublishStats;
    use std::time::Instant;

    fn test_state() -> AppState {
        let registry = ChannelRegistry::from_config(
            Box::new(MemoryBackend::new()),
            &GpioConfig::default(),
            &MfaConfig::default(),
            Instant::now(),
        )
        .unwrap();
        AppState::new(registry, PublishStats::new(Instant::now(), 16))
    }

    #[test]
    fn duration_formatting() {
        assert_eq!(format_duration(0), "0d 0h 0m 0s");
        assert_eq!(format_duration(86_465), "1d 0h 1m 5s");
        assert_eq!(format_duration(3_725), "0d 1h 2m 5s");
    }

    #[tokio::test]
    async fn stats_command_queues_one_line() {
        let state = test_state();
        run_stats(state.clone()).await;

        let mut stats = state.stats.lock().await;
        let lines = stats.drain_logs();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("Stats: Uptime="));
        assert!(lines[0].contains("Outages=0"));
    }
}
