//! Per-post session: the state machine that runs the debounced capture loop,
//! keeps exactly one verdict subscription open, and drives the overlay.

pub mod manager;

pub use manager::SessionManager;

use tokio::sync::mpsc;

use crate::capture::{CaptureError, Frame};
use crate::protocol::PostLocation;
use crate::verdict::Verdict;

/// Everything the session state machine can be woken by: sensor events,
/// its own timers, finished captures, verdict delivery, and UI commands.
pub enum SessionMsg {
    Observed { post: PostLocation, dpr: f64 },
    Cleared,
    SettleElapsed { full_id: String },
    CaptureTick { full_id: String },
    CaptureDone { full_id: String, outcome: Result<Frame, CaptureError> },
    VerdictArrived { base_id: String, verdict: Verdict },
    SubscriptionClosed { base_id: String },
    SetEnabled(bool),
    ToggleDebugBox,
}

/// Write side of the session channel. Cloned into the sensor intake, the
/// result client, the hotkey handler and the command surface; none of them
/// hold a reference back into the session.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionMsg>,
}

impl SessionHandle {
    pub(crate) fn new(tx: mpsc::Sender<SessionMsg>) -> Self {
        Self { tx }
    }

    pub async fn observed(&self, post: PostLocation, dpr: f64) {
        let _ = self.tx.send(SessionMsg::Observed { post, dpr }).await;
    }

    pub async fn cleared(&self) {
        let _ = self.tx.send(SessionMsg::Cleared).await;
    }

    pub async fn set_enabled(&self, enabled: bool) {
        let _ = self.tx.send(SessionMsg::SetEnabled(enabled)).await;
    }

    pub async fn toggle_debug_box(&self) {
        let _ = self.tx.send(SessionMsg::ToggleDebugBox).await;
    }

    pub(crate) async fn send(&self, msg: SessionMsg) {
        let _ = self.tx.send(msg).await;
    }
}
