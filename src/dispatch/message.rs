//! Typed request model for inbound payloads.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::gpio::channel::parse_channel_name;

/// Key carrying a device command, e.g. `{"CMD": "stats"}`.
pub const COMMAND_KEY: &str = "CMD";
/// Key carrying a one-time code, e.g. `{"MFA": 644133}`.
pub const MFA_KEY: &str = "MFA";
/// Response key: public address reply.
pub const IP_KEY: &str = "IP";
/// Response key: watch-list event.
pub const NOTIFY_KEY: &str = "NOTIFY";
/// Response key: timestamp on every status snapshot.
pub const TIMESTAMP_KEY: &str = "UTC";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Stats,
    Refresh,
    GetIp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Set a channel to a logical value.
    ChannelSet { pin: u8, value: u8 },
    Command(CommandKind),
    Mfa(u32),
}

/// Parses an inbound payload into requests, sorted by key.
///
/// Returns `None` for anything that is not a request for us: malformed
/// JSON, or one of our own responses echoed back on the shared topic.
/// Deserializing into a `BTreeMap` gives both the deterministic key order
/// and last-write-wins for duplicate keys. Unknown keys and out-of-range
/// values are skipped, not errors.
pub fn parse_requests(payload: &[u8]) -> Option<Vec<Request>> {
    let map: BTreeMap<String, Value> = serde_json::from_slice(payload).ok()?;

    if map.contains_key(IP_KEY) || map.contains_key(NOTIFY_KEY) || map.contains_key(TIMESTAMP_KEY)
    {
        return None;
    }

    let mut requests = Vec::new();
    for (key, value) in &map {
        if key == MFA_KEY {
            if let Some(code) = value_as_code(value) {
                requests.push(Request::Mfa(code));
            }
        } else if key == COMMAND_KEY {
            match value.as_str() {
                Some("stats") => requests.push(Request::Command(CommandKind::Stats)),
                Some("refresh") => requests.push(Request::Command(CommandKind::Refresh)),
                Some("getip") => requests.push(Request::Command(CommandKind::GetIp)),
                _ => {}
            }
        } else if let Some(pin) = parse_channel_name(key) {
            if let Some(v @ (0 | 1)) = value.as_u64() {
                requests.push(Request::ChannelSet { pin, value: v as u8 });
            }
        }
    }

    Some(requests)
}

/// MFA codes arrive as integers from the phone apps, but accept a digit
/// string too.
fn value_as_code(value: &Value) -> Option<u32> {
    value
        .as_u64()
        .and_then(|n| u32::try_from(n).ok())
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}
