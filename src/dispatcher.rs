use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::client::ClientHandle;
use crate::error::{ClientError, Result};
use crate::session::Session;

pub const COUNT_STRING_METHOD: &str = "StringOperations.CountString";

/// Parameters for a count request: a one-element list holding the trimmed input.
pub fn count_params(message: &str) -> Value {
    json!([message.trim()])
}

pub async fn count_string(
    session: &Session,
    lifetime: &CancellationToken,
    message: &str,
) -> Result<i64> {
    if lifetime.is_cancelled() {
        return Err(ClientError::Cancelled);
    }

    let result = session
        .call(COUNT_STRING_METHOD, count_params(message), lifetime)
        .await?;
    result
        .as_i64()
        .ok_or_else(|| ClientError::InvalidResult(result.to_string()))
}

/// Send one count request through `client` and log the outcome.
pub async fn send_message(client: &ClientHandle, input: &str) -> Result<i64> {
    match client.count_string(input).await {
        Ok(count) => {
            info!("StringCount result={} as ID:{}", count, client.id());
            Ok(count)
        }
        Err(e) => {
            error!("StringOperations as ID:{}: {}", client.id(), e);
            Err(e)
        }
    }
}
