// Service exports
pub mod appwrite;
pub mod cache;
pub mod memory;
pub mod notifier;
pub mod postgres;
pub mod profiles;
pub mod remote_scorer;
pub mod store;

pub use appwrite::{AppwriteError, AppwriteProfileStore};
pub use cache::{CacheError, CacheKey, CacheManager};
pub use memory::{InMemoryStore, UserPartition};
pub use notifier::{LogNotifier, MatchNotifier, NotifyError, WebhookNotifier};
pub use postgres::PostgresStore;
pub use profiles::{CachedProfileStore, InMemoryProfiles, ProfileError, ProfileStore};
pub use remote_scorer::{DisabledScorer, HttpRemoteScorer, RemoteScorer, ScorerError};
pub use store::{StoreError, SwipeStore, SwipeTxn};
