//! Sensor intake: a loopback WebSocket listener fed by the in-page observer.
//! One client at a time; a disconnect clears the active post and the loop
//! goes straight back to accepting.

use anyhow::{Context, Result};
use futures_util::StreamExt;
use log::{info, warn};
use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;

use crate::protocol;
use crate::session::SessionHandle;

pub async fn run_sensor_intake(addr: String, handle: SessionHandle) -> Result<()> {
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind sensor socket on {addr}"))?;
    info!("sensor intake listening on ws://{addr}");

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(err) => {
                warn!("sensor accept failed: {err}");
                continue;
            }
        };
        let mut socket = match accept_async(stream).await {
            Ok(socket) => socket,
            Err(err) => {
                warn!("sensor handshake with {peer} failed: {err}");
                continue;
            }
        };
        info!("sensor connected from {peer}");

        while let Some(message) = socket.next().await {
            let message = match message {
                Ok(message) => message,
                Err(err) => {
                    warn!("sensor socket error: {err}");
                    break;
                }
            };
            if message.is_close() {
                break;
            }
            let Ok(text) = message.to_text() else {
                continue;
            };
            if text.is_empty() {
                continue;
            }
            handle_frame(text, &handle).await;
        }

        info!("sensor disconnected; clearing active post");
        handle.cleared().await;
    }
}

async fn handle_frame(raw: &str, handle: &SessionHandle) {
    let message = match protocol::parse_location(raw) {
        Ok(message) => message,
        Err(err) => {
            warn!("dropping malformed sensor frame: {err:#}");
            return;
        }
    };
    log::debug!(
        "location from {} (window offset {}, {})",
        message.site,
        message.window_screen_x,
        message.window_screen_y
    );
    match message.post {
        Some(post) => handle.observed(post, message.dpr).await,
        None => handle.cleared().await,
    }
}
