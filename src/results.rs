//! Result delivery client: one short-lived subscription per armed post,
//! expecting a single verdict payload before the stream closes.

use anyhow::{Context, Result};
use futures_util::StreamExt;
use log::{info, warn};
use tokio_tungstenite::connect_async;
use tokio_util::sync::CancellationToken;

use crate::session::{SessionHandle, SessionMsg};
use crate::verdict::{Verdict, VerdictPayload};

/// Connect to the classifier's per-post stream and forward the first verdict
/// to the session. Every exit path is non-fatal: a session whose stream dies
/// simply keeps capturing until it is torn down.
pub async fn run_subscription(
    url: String,
    base_id: String,
    token: CancellationToken,
    handle: SessionHandle,
) {
    match await_verdict(&url, &base_id, &token).await {
        Ok(Some(verdict)) => {
            handle
                .send(SessionMsg::VerdictArrived { base_id, verdict })
                .await;
        }
        // A teardown-driven cancel is not worth reporting back.
        Ok(None) if !token.is_cancelled() => {
            handle.send(SessionMsg::SubscriptionClosed { base_id }).await;
        }
        Ok(None) => {}
        Err(err) => {
            warn!("analysis stream for {base_id} failed: {err:#}");
            handle.send(SessionMsg::SubscriptionClosed { base_id }).await;
        }
    }
}

async fn await_verdict(
    url: &str,
    base_id: &str,
    token: &CancellationToken,
) -> Result<Option<Verdict>> {
    let (mut stream, _) = connect_async(url)
        .await
        .with_context(|| format!("failed to open analysis stream {url}"))?;
    info!("subscribed to analysis stream for {base_id}");

    loop {
        let message = tokio::select! {
            _ = token.cancelled() => return Ok(None),
            message = stream.next() => message,
        };
        let message = match message {
            None => return Ok(None),
            Some(message) => message.context("analysis stream errored")?,
        };
        if message.is_close() {
            return Ok(None);
        }
        let Ok(text) = message.to_text() else {
            continue;
        };
        if text.is_empty() {
            continue;
        }
        let payload: VerdictPayload =
            serde_json::from_str(text).context("verdict payload did not parse")?;
        return Ok(Some(Verdict::from_payload(base_id.to_string(), payload)));
    }
}
