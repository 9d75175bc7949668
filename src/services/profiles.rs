use crate::models::Profile;
use crate::services::appwrite::AppwriteError;
use crate::services::cache::{CacheError, CacheKey, CacheManager};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

/// Errors raised while reading profiles
#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("Profile source error: {0}")]
    Source(#[from] AppwriteError),
}

/// Read access to pet profiles
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// `Ok(None)` when the id is unknown
    async fn get_profile(&self, id: &str) -> Result<Option<Profile>, ProfileError>;
}

/// Profiles held in memory
#[derive(Default)]
pub struct InMemoryProfiles {
    profiles: RwLock<HashMap<String, Profile>>,
}

impl InMemoryProfiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profiles(profiles: impl IntoIterator<Item = Profile>) -> Self {
        Self {
            profiles: RwLock::new(profiles.into_iter().map(|p| (p.id.clone(), p)).collect()),
        }
    }

    pub async fn insert(&self, profile: Profile) {
        self.profiles.write().await.insert(profile.id.clone(), profile);
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfiles {
    async fn get_profile(&self, id: &str) -> Result<Option<Profile>, ProfileError> {
        Ok(self.profiles.read().await.get(id).cloned())
    }
}

/// Read-through cache in front of another profile store.
///
/// Cache failures are logged and fall through to the inner store.
pub struct CachedProfileStore {
    inner: Arc<dyn ProfileStore>,
    cache: Arc<CacheManager>,
}

impl CachedProfileStore {
    pub fn new(inner: Arc<dyn ProfileStore>, cache: Arc<CacheManager>) -> Self {
        Self { inner, cache }
    }
}

#[async_trait]
impl ProfileStore for CachedProfileStore {
    async fn get_profile(&self, id: &str) -> Result<Option<Profile>, ProfileError> {
        let key = CacheKey::profile(id);
        match self.cache.get::<Profile>(&key).await {
            Ok(profile) => return Ok(Some(profile)),
            Err(CacheError::CacheMiss(_)) => {}
            Err(e) => tracing::warn!("Profile cache read failed for {}: {}", id, e),
        }

        let profile = self.inner.get_profile(id).await?;
        if let Some(profile) = &profile {
            if let Err(e) = self.cache.set(&key, profile).await {
                tracing::warn!("Profile cache write failed for {}: {}", id, e);
            }
        }
        Ok(profile)
    }
}
