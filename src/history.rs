//! History listing for the control surface: every base post with at least
//! one stored frame, joined with the classifier's verdict when it has one.

use std::collections::HashMap;
use std::path::Path;

use log::warn;
use serde::Serialize;

use crate::classifier::ClassifierClient;
use crate::protocol;
use crate::verdict::Verdict;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub base_id: String,
    pub frame_count: usize,
    /// Millisecond timestamp of the newest frame, from its filename.
    pub newest_frame_ms: i64,
    pub verdict: Option<Verdict>,
}

#[derive(Debug, Default, Clone)]
struct FrameGroup {
    count: usize,
    newest_ms: i64,
}

fn scan_frames_dir(dir: &Path) -> HashMap<String, FrameGroup> {
    let mut groups: HashMap<String, FrameGroup> = HashMap::new();
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            warn!("failed to read frames directory {}: {err}", dir.display());
            return groups;
        }
    };
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some(parsed) = protocol::parse_frame_filename(name) else {
            continue;
        };
        let Some(base_id) = protocol::base_post_id(&parsed.full_id) else {
            continue;
        };
        let group = groups.entry(base_id.to_string()).or_default();
        group.count += 1;
        group.newest_ms = group.newest_ms.max(parsed.epoch_ms);
    }
    groups
}

/// Scan the frames directory and poll the classifier for each base id.
/// A classifier that is down degrades to verdict-less entries.
pub async fn build_history(dir: &Path, classifier: &ClassifierClient) -> Vec<HistoryEntry> {
    let groups = scan_frames_dir(dir);
    let mut entries = Vec::with_capacity(groups.len());
    for (base_id, group) in groups {
        let verdict = match classifier.fetch_verdict(&base_id).await {
            Ok(payload) => payload.map(|payload| Verdict::from_payload(base_id.clone(), payload)),
            Err(err) => {
                warn!("verdict lookup for {base_id} failed: {err:#}");
                None
            }
        };
        entries.push(HistoryEntry {
            base_id,
            frame_count: group.count,
            newest_frame_ms: group.newest_ms,
            verdict,
        });
    }
    entries.sort_by(|a, b| b.newest_frame_ms.cmp(&a.newest_frame_ms));
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::frame_filename;

    #[test]
    fn scan_groups_by_base_id_and_keeps_newest() {
        let dir = tempfile::tempdir().unwrap();
        for (full_id, counter, ts) in [
            ("post_1_1000", 0, 1_700_000_000_000_i64),
            ("post_1_1000", 1, 1_700_000_001_000),
            ("post_2_2000", 0, 1_700_000_005_000),
        ] {
            std::fs::write(dir.path().join(frame_filename(full_id, counter, ts)), b"jpg").unwrap();
        }
        std::fs::write(dir.path().join("stray.txt"), b"x").unwrap();

        let groups = scan_frames_dir(dir.path());
        assert_eq!(groups.len(), 2);
        assert_eq!(groups["post_1"].count, 2);
        assert_eq!(groups["post_1"].newest_ms, 1_700_000_001_000);
        assert_eq!(groups["post_2"].count, 1);
    }

    #[test]
    fn scan_of_missing_directory_is_empty() {
        assert!(scan_frames_dir(Path::new("/definitely/not/here")).is_empty());
    }
}
