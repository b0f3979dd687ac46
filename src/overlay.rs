//! Overlay window plumbing. The surface itself is a transparent webview; the
//! backend only publishes wholesale [`OverlayState`] records and flips
//! pointer passthrough on request.

use anyhow::{anyhow, Context, Result};
use log::warn;
use serde::Serialize;
use tauri::{AppHandle, Emitter, Manager};

use crate::verdict::VerdictLabel;

pub const OVERLAY_WINDOW: &str = "overlay";
pub const OVERLAY_STATE_EVENT: &str = "overlay-state";

/// The single record the overlay renders. Updates replace it wholesale.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayState {
    pub visible: bool,
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
    pub label: VerdictLabel,
    pub score: f64,
    pub post_id: String,
    pub show_debug_box: bool,
}

impl OverlayState {
    pub fn hidden(show_debug_box: bool) -> Self {
        Self {
            visible: false,
            x: 0.0,
            y: 0.0,
            w: 0.0,
            h: 0.0,
            label: VerdictLabel::Analyzing,
            score: 0.0,
            post_id: String::new(),
            show_debug_box,
        }
    }
}

#[derive(Clone)]
pub struct OverlayHandle {
    app: AppHandle,
}

impl OverlayHandle {
    pub fn new(app: AppHandle) -> Self {
        Self { app }
    }

    pub fn publish(&self, state: &OverlayState) {
        if let Err(err) = self.app.emit(OVERLAY_STATE_EVENT, state) {
            warn!("failed to publish overlay state: {err}");
        }
    }
}

/// Size the overlay over the primary display and make it click-through.
/// The badge re-enables pointer events on demand via `set_interactive`.
pub fn init_overlay_window(app: &AppHandle) -> Result<()> {
    let window = app
        .get_webview_window(OVERLAY_WINDOW)
        .ok_or_else(|| anyhow!("overlay window missing from configuration"))?;

    if let Some(monitor) = window.primary_monitor().context("monitor query failed")? {
        window
            .set_position(*monitor.position())
            .context("failed to position overlay")?;
        window
            .set_size(*monitor.size())
            .context("failed to size overlay")?;
    }

    window
        .set_ignore_cursor_events(true)
        .context("failed to make overlay click-through")?;
    Ok(())
}

/// Toggle pointer passthrough while the badge is expanded.
pub fn set_interactive(app: &AppHandle, interactive: bool) -> Result<()> {
    let window = app
        .get_webview_window(OVERLAY_WINDOW)
        .ok_or_else(|| anyhow!("overlay window missing from configuration"))?;
    window
        .set_ignore_cursor_events(!interactive)
        .context("failed to toggle overlay cursor events")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hidden_state_serializes_for_the_webview() {
        let state = OverlayState::hidden(true);
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["visible"], false);
        assert_eq!(json["showDebugBox"], true);
        assert_eq!(json["label"], "Analyzing…");
    }
}
