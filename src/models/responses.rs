use crate::models::domain::{CounterKind, CreditKind, LifetimeStats};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Response for a successful swipe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwipeResponse {
    pub matched: bool,
}

/// Response for a successful rewind
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewindResponse {
    #[serde(rename = "restoredCandidateId")]
    pub restored_candidate_id: String,
}

/// Balance after a credit top-up
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditGrantResponse {
    #[serde(rename = "userId")]
    pub user_id: String,
    pub credit: CreditKind,
    pub balance: u32,
}

/// Current usage for one counter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    pub kind: CounterKind,
    pub used: u32,
    #[serde(rename = "periodStart")]
    pub period_start: DateTime<Utc>,
}

/// Usage overview for a user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageResponse {
    #[serde(rename = "userId")]
    pub user_id: String,
    pub counters: Vec<UsageSnapshot>,
    pub lifetime: LifetimeStats,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<u32>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>, status_code: u16) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status_code,
            reason: None,
            balance: None,
        }
    }
}
