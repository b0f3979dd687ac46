//! Frame uploader: watches the frames directory, groups new JPEGs by base
//! post id, and submits the first complete batch per post exactly once.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::classifier::ClassifierClient;
use crate::config::AppConfig;
use crate::protocol;

/// Collapses duplicate filesystem notifications for the same file inside a
/// short window.
struct Debouncer {
    window: Duration,
    recent: HashMap<PathBuf, Instant>,
}

impl Debouncer {
    fn new(window: Duration) -> Self {
        Self {
            window,
            recent: HashMap::new(),
        }
    }

    fn admit(&mut self, path: &Path, now: Instant) -> bool {
        let window = self.window;
        self.recent
            .retain(|_, seen| now.duration_since(*seen) < window);
        if self.recent.contains_key(path) {
            return false;
        }
        self.recent.insert(path.to_path_buf(), now);
        true
    }
}

/// Per-base queues plus the submission ledger. At-most-once per base id is
/// enforced here even if the debouncer lets a duplicate through.
struct BatchPlanner {
    batch_size: usize,
    ledger: HashSet<String>,
    queues: HashMap<String, Vec<PathBuf>>,
}

impl BatchPlanner {
    fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            ledger: HashSet::new(),
            queues: HashMap::new(),
        }
    }

    /// Register a new frame file. Returns a ready batch when this file
    /// completes one, after marking the base id submitted.
    fn offer(&mut self, path: &Path) -> Option<(String, Vec<PathBuf>)> {
        let name = path.file_name()?.to_str()?;
        if !name.ends_with(".jpg") {
            return None;
        }
        let base_id = protocol::base_id_from_filename(name)?.to_string();
        if self.ledger.contains(&base_id) {
            debug!("{base_id} already submitted; ignoring {name}");
            return None;
        }

        let queue = self.queues.entry(base_id.clone()).or_default();
        if queue.iter().any(|queued| queued == path) {
            return None;
        }
        queue.push(path.to_path_buf());

        if queue.len() < self.batch_size {
            return None;
        }
        let batch: Vec<PathBuf> = queue.drain(..self.batch_size).collect();
        self.queues.remove(&base_id);
        self.ledger.insert(base_id.clone());
        Some((base_id, batch))
    }
}

pub async fn run_uploader(cfg: AppConfig, classifier: ClassifierClient) {
    if let Err(err) = watch_and_submit(cfg, classifier).await {
        // Fatal to this task only; cached verdicts keep serving the overlay.
        error!("uploader stopped: {err:#}");
    }
}

async fn watch_and_submit(cfg: AppConfig, classifier: ClassifierClient) -> Result<()> {
    std::fs::create_dir_all(&cfg.frames_dir)
        .with_context(|| format!("failed to create {}", cfg.frames_dir.display()))?;

    let (tx, mut rx) = mpsc::unbounded_channel::<PathBuf>();
    let _watcher = start_watcher(&cfg.frames_dir, tx)?;
    info!("watching frames directory {}", cfg.frames_dir.display());

    let mut debouncer = Debouncer::new(cfg.upload_debounce);
    let mut planner = BatchPlanner::new(cfg.batch_size);

    while let Some(path) = rx.recv().await {
        if !debouncer.admit(&path, Instant::now()) {
            continue;
        }
        let Some((base_id, batch)) = planner.offer(&path) else {
            continue;
        };
        info!("submitting {} frames for {base_id}", batch.len());
        match classifier.submit_batch(&base_id, &batch).await {
            Ok(()) => info!("batch for {base_id} accepted"),
            // Ledger entry stays: one shot per base id per run.
            Err(err) => warn!("batch for {base_id} failed, not retrying: {err:#}"),
        }
    }
    Ok(())
}

/// The notify watcher delivers on its own thread; forward creates and
/// modifies into the async loop. The returned watcher must stay alive.
fn start_watcher(dir: &Path, tx: mpsc::UnboundedSender<PathBuf>) -> Result<RecommendedWatcher> {
    let mut watcher = notify::recommended_watcher(move |event: notify::Result<Event>| {
        let event = match event {
            Ok(event) => event,
            Err(err) => {
                warn!("frames watcher error: {err}");
                return;
            }
        };
        if !matches!(
            event.kind,
            EventKind::Create(_) | EventKind::Modify(_) | EventKind::Any
        ) {
            return;
        }
        for path in event.paths {
            let _ = tx.send(path);
        }
    })
    .context("failed to initialize frames watcher")?;
    watcher
        .watch(dir, RecursiveMode::NonRecursive)
        .with_context(|| format!("failed to watch {}", dir.display()))?;
    Ok(watcher)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_path(full_id: &str, counter: u32) -> PathBuf {
        PathBuf::from("/frames").join(protocol::frame_filename(full_id, counter, 1_700_000_000_000))
    }

    #[test]
    fn batch_fires_once_the_queue_is_full() {
        let mut planner = BatchPlanner::new(3);
        assert!(planner.offer(&frame_path("post_1_1000", 0)).is_none());
        assert!(planner.offer(&frame_path("post_1_1000", 1)).is_none());
        let (base_id, batch) = planner.offer(&frame_path("post_1_1000", 2)).unwrap();
        assert_eq!(base_id, "post_1");
        assert_eq!(batch.len(), 3);
    }

    #[test]
    fn ledger_blocks_a_second_batch_for_the_same_base() {
        let mut planner = BatchPlanner::new(1);
        assert!(planner.offer(&frame_path("post_2_2000", 0)).is_some());
        assert!(planner.offer(&frame_path("post_2_2000", 1)).is_none());
        assert!(planner.offer(&frame_path("post_2_9999", 7)).is_none());
        // A different base id still goes through.
        assert!(planner.offer(&frame_path("post_3_3000", 0)).is_some());
    }

    #[test]
    fn duplicate_notification_is_not_queued_twice() {
        let mut planner = BatchPlanner::new(2);
        let path = frame_path("post_4_4000", 0);
        assert!(planner.offer(&path).is_none());
        assert!(planner.offer(&path).is_none());
        assert_eq!(planner.queues["post_4"].len(), 1);
    }

    #[test]
    fn foreign_files_are_ignored() {
        let mut planner = BatchPlanner::new(1);
        assert!(planner.offer(Path::new("/frames/notes.txt")).is_none());
        assert!(planner.offer(Path::new("/frames/cover.png")).is_none());
        assert!(planner.offer(Path::new("/frames/misc.jpg")).is_none());
    }

    #[test]
    fn debouncer_collapses_rapid_repeats() {
        let mut debouncer = Debouncer::new(Duration::from_millis(150));
        let t0 = Instant::now();
        let path = frame_path("post_5_5000", 0);
        assert!(debouncer.admit(&path, t0));
        assert!(!debouncer.admit(&path, t0 + Duration::from_millis(50)));
        assert!(debouncer.admit(&path, t0 + Duration::from_millis(400)));
    }
}
