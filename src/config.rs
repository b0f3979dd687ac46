use std::env;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:8000";
const DEFAULT_SENSOR_ADDR: &str = "127.0.0.1:8765";
const FRAMES_DIR_NAME: &str = "screenshots";
const DEBUG_DIR_NAME: &str = "debug_screenshots";

/// Runtime configuration, resolved once at startup. Everything except the
/// classifier base URL ships with compiled defaults; `API_BASE_URL` is the
/// only supported override.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_base_url: String,
    pub sensor_addr: String,
    pub frames_dir: PathBuf,
    pub debug_dir: PathBuf,
    /// Delay between a post becoming active and the first capture, so scroll
    /// snap can finish before pixels are read.
    pub settle_delay: Duration,
    pub capture_interval: Duration,
    pub verdict_ttl: Duration,
    /// Frames per submission. The classifier's multi-frame analyzer treats a
    /// batch of this size as one unit of work per post.
    pub batch_size: usize,
    pub upload_debounce: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        let root = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            sensor_addr: DEFAULT_SENSOR_ADDR.to_string(),
            frames_dir: root.join(FRAMES_DIR_NAME),
            debug_dir: root.join(DEBUG_DIR_NAME),
            settle_delay: Duration::from_millis(400),
            capture_interval: Duration::from_secs(1),
            verdict_ttl: Duration::from_secs(5),
            batch_size: 10,
            upload_debounce: Duration::from_millis(150),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = env::var("API_BASE_URL") {
            let trimmed = url.trim().trim_end_matches('/');
            if !trimmed.is_empty() {
                config.api_base_url = trimmed.to_string();
            }
        }
        config
    }

    /// WebSocket URL for the per-post verdict stream, derived from the HTTP
    /// base so the override covers both protocols.
    pub fn analysis_stream_url(&self, base_id: &str) -> String {
        let ws_base = if let Some(rest) = self.api_base_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.api_base_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            self.api_base_url.clone()
        };
        format!("{ws_base}/ws/analysis/{base_id}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_loopback() {
        let config = AppConfig::default();
        assert_eq!(config.api_base_url, "http://127.0.0.1:8000");
        assert_eq!(config.sensor_addr, "127.0.0.1:8765");
        assert_eq!(config.batch_size, 10);
        assert!(config.frames_dir.ends_with("screenshots"));
    }

    #[test]
    fn analysis_stream_url_switches_scheme() {
        let mut config = AppConfig::default();
        assert_eq!(
            config.analysis_stream_url("post_7"),
            "ws://127.0.0.1:8000/ws/analysis/post_7"
        );
        config.api_base_url = "https://lens.example.com".into();
        assert_eq!(
            config.analysis_stream_url("post_7"),
            "wss://lens.example.com/ws/analysis/post_7"
        );
    }
}
