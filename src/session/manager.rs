use chrono::Utc;
use log::{debug, info, warn};
use serde::Serialize;
use tauri::{AppHandle, Emitter};
use tokio::sync::mpsc;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::capture::{self, CaptureError, CaptureRect, Frame, LastFrame};
use crate::config::AppConfig;
use crate::overlay::{OverlayHandle, OverlayState};
use crate::protocol::{self, PostLocation};
use crate::results;
use crate::session::{SessionHandle, SessionMsg};
use crate::verdict::{Verdict, VerdictCache, VerdictLabel};

const CHANNEL_CAPACITY: usize = 64;

pub const DETECTION_CHANGED_EVENT: &str = "detection-changed";

#[derive(Serialize, Clone)]
struct DetectionChangedEvent {
    enabled: bool,
}

enum Phase {
    /// Settle timer running, subscription open, overlay shows `Analyzing…`.
    Arming,
    /// Capture ticker running; every tick is conditional on the cache.
    Capturing,
    /// Verdict rendered; loop and subscription stopped. The session stays
    /// until the active post changes.
    Resolved,
}

struct ActiveSession {
    full_id: String,
    base_id: String,
    rect: CaptureRect,
    dpr: f64,
    phase: Phase,
    verdict: Option<Verdict>,
    settle: CancellationToken,
    capture_loop: CancellationToken,
    subscription: CancellationToken,
    frame_counter: u32,
    capture_inflight: bool,
}

impl ActiveSession {
    fn new(full_id: String, base_id: String, rect: CaptureRect, dpr: f64) -> Self {
        Self {
            full_id,
            base_id,
            rect,
            dpr,
            phase: Phase::Arming,
            verdict: None,
            settle: CancellationToken::new(),
            capture_loop: CancellationToken::new(),
            subscription: CancellationToken::new(),
            frame_counter: 0,
            capture_inflight: false,
        }
    }

    /// Cancellation order is fixed: settle timer, capture loop, subscription.
    fn cancel_all(&self) {
        self.settle.cancel();
        self.capture_loop.cancel();
        self.subscription.cancel();
    }
}

pub struct SessionManager {
    app: AppHandle,
    cfg: AppConfig,
    overlay: OverlayHandle,
    handle: SessionHandle,
    cache: VerdictCache,
    session: Option<ActiveSession>,
    enabled: bool,
    show_debug: bool,
    last_frame: LastFrame,
}

impl SessionManager {
    pub fn spawn(app: AppHandle, cfg: AppConfig, last_frame: LastFrame) -> SessionHandle {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let handle = SessionHandle::new(tx);
        let manager = Self {
            overlay: OverlayHandle::new(app.clone()),
            app,
            cache: VerdictCache::new(cfg.verdict_ttl),
            cfg,
            handle: handle.clone(),
            session: None,
            enabled: true,
            show_debug: false,
            last_frame,
        };
        tauri::async_runtime::spawn(manager.run(rx));
        handle
    }

    async fn run(mut self, mut rx: mpsc::Receiver<SessionMsg>) {
        while let Some(msg) = rx.recv().await {
            match msg {
                SessionMsg::Observed { post, dpr } => self.on_observed(post, dpr),
                SessionMsg::Cleared => self.on_cleared(),
                SessionMsg::SettleElapsed { full_id } => self.on_settle_elapsed(full_id),
                SessionMsg::CaptureTick { full_id } => self.on_capture_tick(full_id),
                SessionMsg::CaptureDone { full_id, outcome } => {
                    self.on_capture_done(full_id, outcome)
                }
                SessionMsg::VerdictArrived { base_id, verdict } => {
                    self.on_verdict(base_id, verdict)
                }
                SessionMsg::SubscriptionClosed { base_id } => {
                    info!("analysis stream for {base_id} closed without a verdict");
                }
                SessionMsg::SetEnabled(enabled) => self.on_set_enabled(enabled),
                SessionMsg::ToggleDebugBox => {
                    self.show_debug = !self.show_debug;
                    self.publish_overlay();
                }
            }
        }
    }

    fn on_observed(&mut self, post: PostLocation, dpr: f64) {
        if !self.enabled {
            return;
        }
        let Some(base_id) = protocol::base_post_id(&post.id).map(str::to_owned) else {
            warn!("sensor reported unrecognized post id {:?}", post.id);
            return;
        };
        let rect = CaptureRect {
            x: post.x,
            y: post.y,
            w: post.w,
            h: post.h,
        };

        // Same post scrolled to a new position: the badge follows, nothing
        // else changes.
        if let Some(session) = self.session.as_mut() {
            if session.base_id == base_id {
                session.rect = rect;
                session.dpr = dpr;
                self.publish_overlay();
                return;
            }
        }

        self.teardown_session();

        // A fresh cached verdict short-circuits Arming entirely.
        if let Some(verdict) = self.cache.get(&post.id) {
            info!("re-entered {} within cache ttl; rendering cached verdict", post.id);
            let mut session = ActiveSession::new(post.id, base_id, rect, dpr);
            session.phase = Phase::Resolved;
            session.verdict = Some(verdict);
            self.session = Some(session);
            self.publish_overlay();
            return;
        }

        info!("arming session for {} ({base_id})", post.id);
        let session = ActiveSession::new(post.id, base_id, rect, dpr);
        self.spawn_subscription(&session);
        self.spawn_settle_timer(&session);
        self.session = Some(session);
        self.publish_overlay();
    }

    fn on_cleared(&mut self) {
        self.teardown_session();
        self.publish_overlay();
    }

    fn on_settle_elapsed(&mut self, full_id: String) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.full_id != full_id || !matches!(session.phase, Phase::Arming) {
            return;
        }
        session.phase = Phase::Capturing;
        session.frame_counter = 0;
        self.spawn_capture_ticker(full_id);
    }

    fn on_capture_tick(&mut self, full_id: String) {
        let active = self
            .session
            .as_ref()
            .is_some_and(|s| s.full_id == full_id && matches!(s.phase, Phase::Capturing));
        if !active {
            return;
        }

        if let Some(verdict) = self.cache.get(&full_id) {
            self.resolve(verdict);
            return;
        }

        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.capture_inflight {
            debug!("capture still in flight for {full_id}; skipping tick");
            return;
        }
        session.capture_inflight = true;

        let rect = session.rect;
        let dpr = session.dpr;
        let handle = self.handle.clone();
        tokio::spawn(async move {
            let outcome = match tokio::task::spawn_blocking(move || capture::capture(rect, dpr))
                .await
            {
                Ok(outcome) => outcome,
                Err(err) => Err(CaptureError::Other(anyhow::anyhow!(
                    "capture worker join failed: {err}"
                ))),
            };
            handle.send(SessionMsg::CaptureDone { full_id, outcome }).await;
        });
    }

    fn on_capture_done(&mut self, full_id: String, outcome: Result<Frame, CaptureError>) {
        let Some(session) = self.session.as_mut() else {
            debug!("discarding late frame for {full_id}; no active post");
            return;
        };
        if session.full_id != full_id {
            debug!(
                "discarding late frame for {full_id}; active post is {}",
                session.full_id
            );
            return;
        }
        session.capture_inflight = false;

        let frame = match outcome {
            Ok(frame) => frame,
            Err(err) => {
                warn!("capture skipped for {full_id}: {err}");
                return;
            }
        };

        let name = protocol::frame_filename(
            &full_id,
            session.frame_counter,
            Utc::now().timestamp_millis(),
        );
        let path = self.cfg.frames_dir.join(&name);
        if let Err(err) = std::fs::write(&path, &frame.jpeg) {
            warn!("failed to write frame {}: {err}", path.display());
            return;
        }
        session.frame_counter += 1;
        debug!("wrote {name} ({}x{})", frame.width, frame.height);

        *self
            .last_frame
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(frame);
    }

    fn on_verdict(&mut self, base_id: String, verdict: Verdict) {
        let Some(session) = self.session.as_ref() else {
            debug!("verdict for {base_id} ignored; no active post");
            return;
        };
        if session.base_id != base_id {
            debug!(
                "verdict for {base_id} ignored; active post is {}",
                session.base_id
            );
            return;
        }
        info!(
            "verdict for {base_id}: {} ({:.2})",
            verdict.label.as_str(),
            verdict.confidence
        );
        self.cache.insert(session.full_id.clone(), verdict.clone());
        self.resolve(verdict);
    }

    fn on_set_enabled(&mut self, enabled: bool) {
        if self.enabled == enabled {
            return;
        }
        self.enabled = enabled;
        info!("detection {}", if enabled { "enabled" } else { "disabled" });
        if !enabled {
            self.teardown_session();
            self.publish_overlay();
        }
        let _ = self
            .app
            .emit(DETECTION_CHANGED_EVENT, DetectionChangedEvent { enabled });
    }

    fn resolve(&mut self, verdict: Verdict) {
        if let Some(session) = self.session.as_mut() {
            session.cancel_all();
            session.phase = Phase::Resolved;
            session.verdict = Some(verdict);
        }
        self.publish_overlay();
    }

    fn teardown_session(&mut self) {
        if let Some(session) = self.session.take() {
            session.cancel_all();
            info!("session for {} torn down", session.base_id);
        }
    }

    fn publish_overlay(&self) {
        let state = match &self.session {
            None => OverlayState::hidden(self.show_debug),
            Some(session) => {
                let (label, score) = match (&session.phase, &session.verdict) {
                    (Phase::Resolved, Some(verdict)) => (verdict.label, verdict.confidence),
                    _ => (VerdictLabel::Analyzing, 0.0),
                };
                OverlayState {
                    visible: true,
                    x: session.rect.x,
                    y: session.rect.y,
                    w: session.rect.w,
                    h: session.rect.h,
                    label,
                    score,
                    post_id: session.full_id.clone(),
                    show_debug_box: self.show_debug,
                }
            }
        };
        self.overlay.publish(&state);
    }

    fn spawn_settle_timer(&self, session: &ActiveSession) {
        let token = session.settle.clone();
        let handle = self.handle.clone();
        let full_id = session.full_id.clone();
        let delay = self.cfg.settle_delay;
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = sleep(delay) => {
                    handle.send(SessionMsg::SettleElapsed { full_id }).await;
                }
            }
        });
    }

    fn spawn_capture_ticker(&self, full_id: String) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        let token = session.capture_loop.clone();
        let handle = self.handle.clone();
        let every = self.cfg.capture_interval;
        tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        handle
                            .send(SessionMsg::CaptureTick { full_id: full_id.clone() })
                            .await;
                    }
                }
            }
        });
    }

    fn spawn_subscription(&self, session: &ActiveSession) {
        let token = session.subscription.clone();
        let url = self.cfg.analysis_stream_url(&session.base_id);
        let base_id = session.base_id.clone();
        let handle = self.handle.clone();
        tokio::spawn(results::run_subscription(url, base_id, token, handle));
    }
}
