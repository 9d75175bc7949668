use crate::models::{Profile, RemoteScoreResponse};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Failures of the remote scorer. Internal to compatibility scoring.
#[derive(Debug, Error)]
pub enum ScorerError {
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Timed out after {0} ms")]
    Timeout(u64),

    #[error("Malformed response: {0}")]
    Malformed(String),
}

/// Remote compatibility scorer
#[async_trait]
pub trait RemoteScorer: Send + Sync {
    async fn remote_score(
        &self,
        profile_a: &Profile,
        profile_b: &Profile,
        timeout_ms: u64,
    ) -> Result<RemoteScoreResponse, ScorerError>;
}

#[derive(Serialize)]
struct ScoreRequest<'a> {
    #[serde(rename = "profileA")]
    profile_a: &'a Profile,
    #[serde(rename = "profileB")]
    profile_b: &'a Profile,
}

/// Remote scorer reached over HTTP
pub struct HttpRemoteScorer {
    endpoint: String,
    api_key: Option<String>,
    client: Client,
}

impl HttpRemoteScorer {
    pub fn new(endpoint: String, api_key: Option<String>) -> Result<Self, ScorerError> {
        let client = Client::builder().build().map_err(|e| {
            ScorerError::UpstreamUnavailable(format!("failed to build HTTP client: {}", e))
        })?;
        Ok(Self {
            endpoint,
            api_key,
            client,
        })
    }
}

#[async_trait]
impl RemoteScorer for HttpRemoteScorer {
    async fn remote_score(
        &self,
        profile_a: &Profile,
        profile_b: &Profile,
        timeout_ms: u64,
    ) -> Result<RemoteScoreResponse, ScorerError> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .timeout(Duration::from_millis(timeout_ms))
            .json(&ScoreRequest { profile_a, profile_b });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ScorerError::Timeout(timeout_ms)
            } else {
                ScorerError::UpstreamUnavailable(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScorerError::UpstreamUnavailable(format!(
                "remote scorer returned {}",
                status
            )));
        }

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                ScorerError::Timeout(timeout_ms)
            } else {
                ScorerError::UpstreamUnavailable(e.to_string())
            }
        })?;

        serde_json::from_str(&body).map_err(|e| ScorerError::Malformed(e.to_string()))
    }
}

/// Scorer used when no remote endpoint is configured; always falls back
pub struct DisabledScorer;

#[async_trait]
impl RemoteScorer for DisabledScorer {
    async fn remote_score(
        &self,
        _: &Profile,
        _: &Profile,
        _: u64,
    ) -> Result<RemoteScoreResponse, ScorerError> {
        Err(ScorerError::UpstreamUnavailable("remote scorer disabled".to_string()))
    }
}
