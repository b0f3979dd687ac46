//! Thin REST client for the external classifier service.

use std::path::PathBuf;

use anyhow::{Context, Result};
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::verdict::{Severity, VerdictPayload};

/// Education payload passed through to the webview unchanged (field names
/// are the classifier's own).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EducationPayload {
    #[serde(default)]
    pub frames: Vec<String>,
    pub explanation: String,
    #[serde(default)]
    pub indicators: Vec<String>,
    pub detection_summary: DetectionSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionSummary {
    pub is_ai: bool,
    pub confidence: f64,
    pub severity: Severity,
}

#[derive(Clone)]
pub struct ClassifierClient {
    http: reqwest::Client,
    base_url: String,
}

impl ClassifierClient {
    pub fn new(http: reqwest::Client, base_url: String) -> Self {
        Self { http, base_url }
    }

    /// Submit one batch of frames for a base post id. Called at most once
    /// per base id per run; the uploader owns that guarantee.
    pub async fn submit_batch(&self, base_id: &str, frames: &[PathBuf]) -> Result<()> {
        let mut form = Form::new();
        for path in frames {
            let bytes = tokio::fs::read(path)
                .await
                .with_context(|| format!("failed to read frame {}", path.display()))?;
            let file_name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "frame.jpg".to_string());
            let part = Part::bytes(bytes)
                .file_name(file_name)
                .mime_str("image/jpeg")
                .context("invalid frame mime type")?;
            form = form.part("files", part);
        }

        self.http
            .post(format!("{}/analyze/{base_id}", self.base_url))
            .multipart(form)
            .send()
            .await
            .context("batch submission failed")?
            .error_for_status()
            .context("classifier rejected the batch")?;
        Ok(())
    }

    /// Poll the finished verdict for a base id. `None` while the classifier
    /// is still working (404).
    pub async fn fetch_verdict(&self, base_id: &str) -> Result<Option<VerdictPayload>> {
        let response = self
            .http
            .get(format!("{}/analyze/{base_id}", self.base_url))
            .send()
            .await
            .context("verdict poll failed")?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let payload = response
            .error_for_status()
            .context("verdict poll rejected")?
            .json::<VerdictPayload>()
            .await
            .context("verdict payload did not parse")?;
        Ok(Some(payload))
    }

    pub async fn educate(&self, base_id: &str) -> Result<EducationPayload> {
        self.http
            .get(format!("{}/educate/{base_id}", self.base_url))
            .send()
            .await
            .context("education request failed")?
            .error_for_status()
            .context("education request rejected")?
            .json::<EducationPayload>()
            .await
            .context("education payload did not parse")
    }

    pub async fn health(&self) -> bool {
        match self.http.get(format!("{}/health", self.base_url)).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn education_payload_parses_classifier_shape() {
        let raw = r#"{
            "frames": ["aGVsbG8="],
            "explanation": "Texture repeats in the background.",
            "indicators": ["repeating texture", "warped text"],
            "detection_summary": {"is_ai": true, "confidence": 0.87, "severity": "MEDIUM"}
        }"#;
        let payload: EducationPayload = serde_json::from_str(raw).unwrap();
        assert_eq!(payload.frames.len(), 1);
        assert_eq!(payload.indicators.len(), 2);
        assert!(payload.detection_summary.is_ai);
    }
}
