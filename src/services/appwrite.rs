use crate::models::Profile;
use crate::services::profiles::{ProfileError, ProfileStore};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when interacting with Appwrite
#[derive(Debug, Error)]
pub enum AppwriteError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("API returned error: {0}")]
    ApiError(String),

    #[error("Unauthorized: invalid API key or token")]
    Unauthorized,

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),
}

/// Appwrite-backed profile store.
///
/// Reads pet profiles from a single documents collection.
pub struct AppwriteProfileStore {
    base_url: String,
    api_key: String,
    project_id: String,
    database_id: String,
    collection: String,
    client: Client,
}

impl AppwriteProfileStore {
    /// Create a new Appwrite profile store
    pub fn new(
        base_url: String,
        api_key: String,
        project_id: String,
        database_id: String,
        collection: String,
        timeout: Duration,
    ) -> Result<Self, AppwriteError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            base_url,
            api_key,
            project_id,
            database_id,
            collection,
            client,
        })
    }

    fn documents_url(&self) -> String {
        format!(
            "{}/databases/{}/collections/{}/documents",
            self.base_url.trim_end_matches('/'),
            self.database_id,
            self.collection
        )
    }

    /// Fetch a single profile document by profile id
    pub async fn fetch_profile(&self, profile_id: &str) -> Result<Option<Profile>, AppwriteError> {
        let queries = vec![
            format!("equal(\"profileId\", [\"{}\"])", profile_id),
            "limit(1)".to_string(),
        ];
        let queries_json = serde_json::to_string(&queries)
            .map_err(|e| AppwriteError::InvalidResponse(format!("Failed to encode query: {}", e)))?;
        let url = format!(
            "{}?queries[]={}",
            self.documents_url(),
            urlencoding::encode(&queries_json)
        );

        tracing::debug!("Fetching profile: {}", profile_id);

        let response = self
            .client
            .get(&url)
            .header("X-Appwrite-Key", &self.api_key)
            .header("X-Appwrite-Project", &self.project_id)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(AppwriteError::Unauthorized);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|_| "Unable to read body".to_string());
            tracing::error!("Failed to fetch profile {}: {} - {}", profile_id, status, body);
            return Err(AppwriteError::ApiError(format!("Failed to fetch profile: {}", status)));
        }

        let json: Value = response.json().await?;

        let documents = json
            .get("documents")
            .and_then(|d| d.as_array())
            .ok_or_else(|| AppwriteError::InvalidResponse("Missing documents array".into()))?;

        let Some(doc) = documents.first() else {
            return Ok(None);
        };

        // Appwrite may nest the attributes under "data"
        let data = doc.get("data").unwrap_or(doc);

        serde_json::from_value(data.clone())
            .map(Some)
            .map_err(|e| AppwriteError::InvalidResponse(format!("Failed to parse profile: {}", e)))
    }
}

#[async_trait]
impl ProfileStore for AppwriteProfileStore {
    async fn get_profile(&self, id: &str) -> Result<Option<Profile>, ProfileError> {
        Ok(self.fetch_profile(id).await?)
    }
}
