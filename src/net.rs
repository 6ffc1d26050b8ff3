//! Public address lookup against a JSON IP provider (e.g. jsonip.com).

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider response carried no \"ip\" field")]
    MissingField,
}

/// Asks the provider for this device's public address. The provider answers
/// `{"ip": "..."}`; anything else is an error.
pub async fn public_ip(provider: &str) -> Result<String, NetError> {
    let body: Value = reqwest::get(provider)
        .await?
        .error_for_status()?
        .json()
        .await?;

    body.get("ip")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or(NetError::MissingField)
}
