//! Classifier verdicts, the label function the UI renders, and the short-TTL
//! cache that suppresses redundant capture on post re-entry.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Uncertain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VerdictLabel {
    #[serde(rename = "Analyzing…")]
    Analyzing,
    #[serde(rename = "Likely Real")]
    LikelyReal,
    #[serde(rename = "Unclear")]
    Unclear,
    #[serde(rename = "Possibly AI")]
    PossiblyAi,
    #[serde(rename = "Likely AI")]
    LikelyAi,
}

impl VerdictLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            VerdictLabel::Analyzing => "Analyzing…",
            VerdictLabel::LikelyReal => "Likely Real",
            VerdictLabel::Unclear => "Unclear",
            VerdictLabel::PossiblyAi => "Possibly AI",
            VerdictLabel::LikelyAi => "Likely AI",
        }
    }
}

/// Total over all inputs. Confidence below 0.60 is never conclusive in
/// either direction.
pub fn label_for(is_ai: bool, confidence: f64) -> VerdictLabel {
    if confidence < 0.60 {
        VerdictLabel::Unclear
    } else if is_ai {
        if confidence >= 0.80 {
            VerdictLabel::LikelyAi
        } else {
            VerdictLabel::PossiblyAi
        }
    } else {
        VerdictLabel::LikelyReal
    }
}

/// Verdict payload as the classifier serializes it, shared by the GET
/// endpoint and the per-post stream.
#[derive(Debug, Clone, Deserialize)]
pub struct VerdictPayload {
    pub is_ai: bool,
    pub confidence: f64,
    pub severity: Severity,
    #[serde(default)]
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Verdict {
    pub post_id: String,
    pub is_ai: bool,
    pub confidence: f64,
    pub severity: Severity,
    pub reasons: Vec<String>,
    pub label: VerdictLabel,
}

impl Verdict {
    pub fn from_payload(post_id: String, payload: VerdictPayload) -> Self {
        let label = label_for(payload.is_ai, payload.confidence);
        Self {
            post_id,
            is_ai: payload.is_ai,
            confidence: payload.confidence,
            severity: payload.severity,
            reasons: payload.reasons,
            label,
        }
    }
}

/// Full post id → (verdict, insert time). Entries expire after the TTL;
/// provisional `Analyzing…` states are refused so a hit is always terminal.
pub struct VerdictCache {
    ttl: Duration,
    entries: HashMap<String, (Verdict, Instant)>,
}

impl VerdictCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    pub fn insert(&mut self, full_id: String, verdict: Verdict) {
        self.insert_at(full_id, verdict, Instant::now());
    }

    pub fn get(&mut self, full_id: &str) -> Option<Verdict> {
        self.get_at(full_id, Instant::now())
    }

    fn insert_at(&mut self, full_id: String, verdict: Verdict, now: Instant) {
        if verdict.label == VerdictLabel::Analyzing {
            return;
        }
        self.entries.insert(full_id, (verdict, now));
    }

    fn get_at(&mut self, full_id: &str, now: Instant) -> Option<Verdict> {
        let ttl = self.ttl;
        self.entries
            .retain(|_, (_, inserted)| now.duration_since(*inserted) < ttl);
        self.entries.get(full_id).map(|(verdict, _)| verdict.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verdict(label_source: (bool, f64)) -> Verdict {
        Verdict::from_payload(
            "post_1_1000".into(),
            VerdictPayload {
                is_ai: label_source.0,
                confidence: label_source.1,
                severity: Severity::High,
                reasons: vec![],
            },
        )
    }

    #[test]
    fn label_table_holds_at_the_boundaries() {
        assert_eq!(label_for(true, 0.59), VerdictLabel::Unclear);
        assert_eq!(label_for(true, 0.60), VerdictLabel::PossiblyAi);
        assert_eq!(label_for(true, 0.79), VerdictLabel::PossiblyAi);
        assert_eq!(label_for(true, 0.80), VerdictLabel::LikelyAi);
        assert_eq!(label_for(false, 0.59), VerdictLabel::Unclear);
        assert_eq!(label_for(false, 0.60), VerdictLabel::LikelyReal);
        assert_eq!(label_for(false, 0.99), VerdictLabel::LikelyReal);
        assert_eq!(label_for(true, 0.50), VerdictLabel::Unclear);
        assert_eq!(label_for(true, 0.92), VerdictLabel::LikelyAi);
    }

    #[test]
    fn human_verdicts_never_strengthen_into_ai_labels() {
        let mut c = 0.0;
        while c <= 1.0 {
            let label = label_for(false, c);
            assert!(matches!(label, VerdictLabel::Unclear | VerdictLabel::LikelyReal));
            c += 0.01;
        }
    }

    #[test]
    fn payload_severity_parses_uppercase() {
        let payload: VerdictPayload = serde_json::from_str(
            r#"{"is_ai":true,"confidence":0.92,"severity":"HIGH","reasons":["synthetic texture"],"risk_factors":{}}"#,
        )
        .unwrap();
        assert_eq!(payload.severity, Severity::High);
        assert_eq!(payload.reasons.len(), 1);
    }

    #[test]
    fn cache_expires_after_ttl() {
        let mut cache = VerdictCache::new(Duration::from_secs(5));
        let t0 = Instant::now();
        cache.insert_at("post_3_3000".into(), verdict((false, 0.9)), t0);
        assert!(cache
            .get_at("post_3_3000", t0 + Duration::from_secs(3))
            .is_some());
        assert!(cache
            .get_at("post_3_3000", t0 + Duration::from_secs(6))
            .is_none());
    }

    #[test]
    fn cache_refuses_provisional_entries() {
        let mut cache = VerdictCache::new(Duration::from_secs(5));
        let mut provisional = verdict((true, 0.9));
        provisional.label = VerdictLabel::Analyzing;
        let t0 = Instant::now();
        cache.insert_at("post_3_3000".into(), provisional, t0);
        assert!(cache.get_at("post_3_3000", t0).is_none());
    }
}
