use crate::core::fallback::{fallback_score, round1, summarize, DEFAULT_AGE_SPAN};
use crate::models::{
    CompatibilityBreakdown, CompatibilityResult, Profile, Provenance, RemoteScoreResponse,
};
use crate::services::{ProfileError, ProfileStore, RemoteScorer, ScorerError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Remote overall scores further than this from the breakdown mean are replaced
const OVERALL_TOLERANCE: f64 = 1.0;

/// Caller-visible compatibility failures. Scorer failures never appear here.
#[derive(Debug, Error)]
pub enum CompatibilityError {
    #[error("Profile not found: {0}")]
    NotFound(String),

    #[error("Profile lookup failed: {0}")]
    Profiles(#[from] ProfileError),
}

/// Scores two profiles with the remote scorer, falling back to the local
/// deterministic score on timeout, transport error or malformed output.
pub struct CompatibilityEngine {
    profiles: Arc<dyn ProfileStore>,
    remote: Arc<dyn RemoteScorer>,
    timeout_ms: u64,
    age_span: f64,
}

impl CompatibilityEngine {
    pub fn new(
        profiles: Arc<dyn ProfileStore>,
        remote: Arc<dyn RemoteScorer>,
        timeout_ms: u64,
    ) -> Self {
        Self {
            profiles,
            remote,
            timeout_ms,
            age_span: DEFAULT_AGE_SPAN,
        }
    }

    pub fn with_age_span(mut self, age_span: f64) -> Self {
        self.age_span = age_span;
        self
    }

    /// Score two profiles by id. Only unreadable profiles are errors.
    pub async fn score(
        &self,
        profile_a: &str,
        profile_b: &str,
    ) -> Result<CompatibilityResult, CompatibilityError> {
        let (a, b) = tokio::try_join!(
            self.profiles.get_profile(profile_a),
            self.profiles.get_profile(profile_b)
        )?;
        let a = a.ok_or_else(|| CompatibilityError::NotFound(profile_a.to_string()))?;
        let b = b.ok_or_else(|| CompatibilityError::NotFound(profile_b.to_string()))?;

        Ok(self.score_profiles(&a, &b).await)
    }

    /// Score two already-loaded profiles. Never fails.
    pub async fn score_profiles(&self, a: &Profile, b: &Profile) -> CompatibilityResult {
        match self.try_remote(a, b).await {
            Ok(result) => {
                tracing::debug!(
                    "Remote compatibility {} <-> {}: {:.1}",
                    a.id,
                    b.id,
                    result.overall
                );
                result
            }
            Err(e) => {
                tracing::warn!(
                    "Remote scorer failed for {} <-> {}, using fallback: {}",
                    a.id,
                    b.id,
                    e
                );
                fallback_score(a, b, self.age_span)
            }
        }
    }

    async fn try_remote(
        &self,
        a: &Profile,
        b: &Profile,
    ) -> Result<CompatibilityResult, ScorerError> {
        // The outer timeout bounds the call even if the scorer ignores its own deadline
        let call = self.remote.remote_score(a, b, self.timeout_ms);
        let response = tokio::time::timeout(Duration::from_millis(self.timeout_ms), call)
            .await
            .map_err(|_| ScorerError::Timeout(self.timeout_ms))??;

        normalize_remote(response)
    }
}

/// Validate and clip a remote payload so the result obeys the same
/// invariants as the fallback: factors in [0, 100], overall tied to them.
pub fn normalize_remote(response: RemoteScoreResponse) -> Result<CompatibilityResult, ScorerError> {
    let raw = response
        .breakdown
        .ok_or_else(|| ScorerError::Malformed("missing breakdown".to_string()))?;

    let factor = |name: &str, value: Option<f64>| -> Result<f64, ScorerError> {
        match value {
            Some(v) if v.is_finite() => Ok(round1(v.clamp(0.0, 100.0))),
            Some(_) => Err(ScorerError::Malformed(format!("non-finite {}", name))),
            None => Err(ScorerError::Malformed(format!("missing {}", name))),
        }
    };

    let breakdown = CompatibilityBreakdown {
        temperament: factor("temperament", raw.temperament)?,
        activity: factor("activity", raw.activity)?,
        size: factor("size", raw.size)?,
        age: factor("age", raw.age)?,
        interests: factor("interests", raw.interests)?,
        lifestyle: factor("lifestyle", raw.lifestyle)?,
    };

    let mean = round1(breakdown.mean());
    let overall = match response.overall {
        Some(v) if v.is_finite() && (v - mean).abs() <= OVERALL_TOLERANCE => {
            round1(v.clamp(0.0, 100.0))
        }
        Some(v) => {
            tracing::debug!(
                "Remote overall {} disagrees with breakdown mean {}, replacing",
                v,
                mean
            );
            mean
        }
        None => mean,
    };

    let summary = match response.summary {
        Some(s) if !s.trim().is_empty() => s,
        _ => summarize(overall, &breakdown),
    };

    Ok(CompatibilityResult {
        overall,
        breakdown,
        summary,
        provenance: Provenance::Remote,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RemoteBreakdown;

    fn breakdown(value: f64) -> RemoteBreakdown {
        RemoteBreakdown {
            temperament: Some(value),
            activity: Some(value),
            size: Some(value),
            age: Some(value),
            interests: Some(value),
            lifestyle: Some(value),
        }
    }

    #[test]
    fn test_normalize_keeps_consistent_overall() {
        let result = normalize_remote(RemoteScoreResponse {
            overall: Some(70.5),
            breakdown: Some(breakdown(70.0)),
            summary: Some("Great pair".to_string()),
        })
        .unwrap();
        assert_eq!(result.overall, 70.5);
        assert_eq!(result.summary, "Great pair");
        assert_eq!(result.provenance, Provenance::Remote);
    }

    #[test]
    fn test_normalize_clips_overall_near_the_bounds() {
        let high = normalize_remote(RemoteScoreResponse {
            overall: Some(100.9),
            breakdown: Some(breakdown(100.0)),
            summary: None,
        })
        .unwrap();
        assert_eq!(high.overall, 100.0);

        let low = normalize_remote(RemoteScoreResponse {
            overall: Some(-0.9),
            breakdown: Some(breakdown(0.0)),
            summary: None,
        })
        .unwrap();
        assert_eq!(low.overall, 0.0);
    }

    #[test]
    fn test_normalize_replaces_inconsistent_overall() {
        let mut raw = breakdown(50.0);
        raw.size = Some(180.0);
        let result = normalize_remote(RemoteScoreResponse {
            overall: Some(99.0),
            breakdown: Some(raw),
            summary: None,
        })
        .unwrap();
        assert_eq!(result.breakdown.size, 100.0);
        assert!((result.overall - result.breakdown.mean()).abs() <= 0.05);
        assert!(!result.summary.is_empty());
    }

    #[test]
    fn test_normalize_rejects_missing_factor() {
        let mut raw = breakdown(50.0);
        raw.lifestyle = None;
        let err = normalize_remote(RemoteScoreResponse {
            overall: Some(50.0),
            breakdown: Some(raw),
            summary: None,
        })
        .unwrap_err();
        assert!(matches!(err, ScorerError::Malformed(_)));

        assert!(normalize_remote(RemoteScoreResponse::default()).is_err());
    }
}
