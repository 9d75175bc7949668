use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Webhook returned {0}")]
    Status(u16),
}

/// Receives mutual-like events after the swipe has committed
#[async_trait]
pub trait MatchNotifier: Send + Sync {
    async fn on_mutual_like(&self, user_id: &str, candidate_id: &str) -> Result<(), NotifyError>;
}

/// Notifier that only logs
pub struct LogNotifier;

#[async_trait]
impl MatchNotifier for LogNotifier {
    async fn on_mutual_like(&self, user_id: &str, candidate_id: &str) -> Result<(), NotifyError> {
        tracing::info!("Mutual like: {} <-> {}", user_id, candidate_id);
        Ok(())
    }
}

/// Notifier that POSTs to a webhook
pub struct WebhookNotifier {
    url: String,
    client: Client,
}

impl WebhookNotifier {
    pub fn new(url: String, timeout: Duration) -> Result<Self, NotifyError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { url, client })
    }
}

#[async_trait]
impl MatchNotifier for WebhookNotifier {
    async fn on_mutual_like(&self, user_id: &str, candidate_id: &str) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.url)
            .json(&json!({
                "userId": user_id,
                "candidateId": candidate_id,
                "event": "mutual_like",
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(NotifyError::Status(response.status().as_u16()));
        }
        tracing::debug!("Delivered mutual like {} <-> {} to webhook", user_id, candidate_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_webhook_posts_event() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/hooks/match")
            .match_body(mockito::Matcher::PartialJson(json!({"userId": "u1", "candidateId": "c1"})))
            .with_status(204)
            .create_async()
            .await;

        let url = format!("{}/hooks/match", server.url());
        let notifier = WebhookNotifier::new(url, Duration::from_secs(2)).unwrap();
        notifier.on_mutual_like("u1", "c1").await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_webhook_error_status() {
        let mut server = mockito::Server::new_async().await;
        server.mock("POST", "/hooks/match").with_status(500).create_async().await;

        let url = format!("{}/hooks/match", server.url());
        let notifier = WebhookNotifier::new(url, Duration::from_secs(2)).unwrap();
        let err = notifier.on_mutual_like("u1", "c1").await.unwrap_err();
        assert!(matches!(err, NotifyError::Status(500)));
    }
}
