//! Wire types for the in-page sensor and the naming scheme shared by the
//! capturer, uploader and history view.

use anyhow::{bail, Context, Result};
use serde::Deserialize;

/// One text frame from the in-page observer. Unknown fields are ignored;
/// missing required fields fail parsing.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationMessage {
    pub site: String,
    pub dpr: f64,
    pub window_screen_x: i32,
    pub window_screen_y: i32,
    #[serde(default)]
    pub post: Option<PostLocation>,
}

/// Screen-space rectangle of the post the user is looking at, in CSS pixels.
/// Coordinates are absolute (the sensor already folds in the browser window
/// offset) and may be negative when the post is partially off-screen.
#[derive(Debug, Clone, Deserialize)]
pub struct PostLocation {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
    pub visibility: f64,
}

pub fn parse_location(raw: &str) -> Result<LocationMessage> {
    let message: LocationMessage =
        serde_json::from_str(raw).context("location frame is not valid JSON")?;
    if !(message.dpr > 0.0) {
        bail!("location frame carries non-positive dpr {}", message.dpr);
    }
    Ok(message)
}

/// The `post_<n>` prefix of a full `post_<n>_<epoch-ms>` id. This is the
/// stable key for batching, uploading, subscribing and result lookup.
pub fn base_post_id(full_id: &str) -> Option<&str> {
    let digits = full_id.strip_prefix("post_")?;
    let run = digits.chars().take_while(|c| c.is_ascii_digit()).count();
    if run == 0 {
        return None;
    }
    Some(&full_id[..("post_".len() + run)])
}

pub fn frame_filename(full_id: &str, counter: u32, epoch_ms: i64) -> String {
    format!("{full_id}_frame{counter}_{epoch_ms}.jpg")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameName {
    pub full_id: String,
    pub counter: u32,
    pub epoch_ms: i64,
}

/// Inverse of [`frame_filename`]. Returns `None` for files that were not
/// produced by the capturer.
pub fn parse_frame_filename(name: &str) -> Option<FrameName> {
    let stem = name.strip_suffix(".jpg")?;
    let (head, epoch) = stem.rsplit_once('_')?;
    let epoch_ms: i64 = epoch.parse().ok()?;
    let (full_id, counter) = head.rsplit_once("_frame")?;
    let counter: u32 = counter.parse().ok()?;
    base_post_id(full_id)?;
    Some(FrameName {
        full_id: full_id.to_string(),
        counter,
        epoch_ms,
    })
}

/// Base id for any file in the frames directory: strip the extension, then
/// take the `post_<n>` prefix.
pub fn base_id_from_filename(name: &str) -> Option<&str> {
    let stem = name.rsplit_once('.').map(|(s, _)| s).unwrap_or(name);
    base_post_id(stem)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_location_frame() {
        let raw = r#"{
            "site": "instagram",
            "dpr": 2.0,
            "windowScreenX": 14,
            "windowScreenY": -8,
            "post": {"id": "post_4_1699999999999", "x": -30.5, "y": 110.0, "w": 420.0, "h": 780.0, "visibility": 0.93}
        }"#;
        let message = parse_location(raw).unwrap();
        assert_eq!(message.site, "instagram");
        let post = message.post.unwrap();
        assert_eq!(post.id, "post_4_1699999999999");
        assert!(post.x < 0.0);
    }

    #[test]
    fn null_post_means_nothing_in_view() {
        let raw = r#"{"site":"x","dpr":1.0,"windowScreenX":0,"windowScreenY":0,"post":null}"#;
        assert!(parse_location(raw).unwrap().post.is_none());
    }

    #[test]
    fn missing_post_field_is_tolerated() {
        let raw = r#"{"site":"x","dpr":1.5,"windowScreenX":0,"windowScreenY":0}"#;
        assert!(parse_location(raw).unwrap().post.is_none());
    }

    #[test]
    fn rejects_garbage_and_bad_dpr() {
        assert!(parse_location("not json").is_err());
        assert!(parse_location(r#"{"site":"x"}"#).is_err());
        assert!(
            parse_location(r#"{"site":"x","dpr":0.0,"windowScreenX":0,"windowScreenY":0}"#)
                .is_err()
        );
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let raw = r#"{"site":"x","dpr":1.0,"windowScreenX":0,"windowScreenY":0,"extra":true}"#;
        assert!(parse_location(raw).is_ok());
    }

    #[test]
    fn base_id_is_the_numbered_prefix() {
        assert_eq!(base_post_id("post_1_1000"), Some("post_1"));
        assert_eq!(base_post_id("post_123_1699999999999"), Some("post_123"));
        assert_eq!(base_post_id("post_9"), Some("post_9"));
        assert_eq!(base_post_id("post_"), None);
        assert_eq!(base_post_id("story_1_1000"), None);
    }

    #[test]
    fn filename_round_trips() {
        let name = frame_filename("post_12_1699999999999", 3, 1700000001234);
        assert_eq!(name, "post_12_1699999999999_frame3_1700000001234.jpg");
        let parsed = parse_frame_filename(&name).unwrap();
        assert_eq!(parsed.full_id, "post_12_1699999999999");
        assert_eq!(parsed.counter, 3);
        assert_eq!(parsed.epoch_ms, 1700000001234);
        assert_eq!(base_id_from_filename(&name), Some("post_12"));
    }

    #[test]
    fn parse_rejects_foreign_files() {
        assert!(parse_frame_filename("notes.txt").is_none());
        assert!(parse_frame_filename("post_1_1000.jpg").is_none());
        assert!(base_id_from_filename("cover.png").is_none());
    }
}
