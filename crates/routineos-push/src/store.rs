//! Durable subscription registry backed by a JSON file.

use std::path::PathBuf;

use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::PushError;
use crate::subscription::Subscription;

/// Flat-file subscription store.
///
/// All mutations rewrite the file before returning, so a crash after a
/// successful call cannot lose the change. The mutex serializes
/// read-modify-write cycles across concurrent dispatch and registration
/// calls.
pub struct SubscriptionStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl SubscriptionStore {
    /// Open the store, creating the parent directory and an empty list
    /// file if absent.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, PushError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        if !fs::try_exists(&path).await? {
            fs::write(&path, "[]").await?;
            info!(path = %path.display(), "created empty subscription store");
        }
        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    /// Current durable set.
    pub async fn list(&self) -> Result<Vec<Subscription>, PushError> {
        let _guard = self.lock.lock().await;
        self.read_all().await
    }

    /// Number of stored subscriptions.
    pub async fn count(&self) -> Result<usize, PushError> {
        Ok(self.list().await?.len())
    }

    /// Insert a subscription, deduplicated by endpoint.
    ///
    /// Returns true if newly inserted and persisted, false if the
    /// endpoint was already present (no write happens).
    pub async fn add(&self, subscription: Subscription) -> Result<bool, PushError> {
        let _guard = self.lock.lock().await;
        let mut subs = self.read_all().await?;
        if subs.iter().any(|s| s.endpoint == subscription.endpoint) {
            debug!(endpoint = %subscription.endpoint, "subscription already registered");
            return Ok(false);
        }
        subs.push(subscription);
        self.write_all(&subs).await?;
        info!(total = subs.len(), "saved new subscription");
        Ok(true)
    }

    /// Remove one endpoint. Idempotent: absent endpoints are not an error.
    pub async fn remove(&self, endpoint: &str) -> Result<(), PushError> {
        let endpoints = [endpoint.to_string()];
        self.remove_many(&endpoints).await
    }

    /// Remove a batch of endpoints in one read-modify-write cycle.
    pub async fn remove_many(&self, endpoints: &[String]) -> Result<(), PushError> {
        if endpoints.is_empty() {
            return Ok(());
        }
        let _guard = self.lock.lock().await;
        let mut subs = self.read_all().await?;
        let before = subs.len();
        subs.retain(|s| !endpoints.contains(&s.endpoint));
        if subs.len() != before {
            self.write_all(&subs).await?;
            info!(
                removed = before - subs.len(),
                remaining = subs.len(),
                "pruned dead subscriptions"
            );
        }
        Ok(())
    }

    async fn read_all(&self) -> Result<Vec<Subscription>, PushError> {
        let raw = fs::read_to_string(&self.path).await?;
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&raw)?)
    }

    async fn write_all(&self, subs: &[Subscription]) -> Result<(), PushError> {
        let json = serde_json::to_string_pretty(subs)?;
        fs::write(&self.path, json).await?;
        Ok(())
    }
}
