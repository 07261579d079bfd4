//! Push subscription types.

use serde::{Deserialize, Serialize};

/// A registered push delivery target.
///
/// The endpoint is the primary identity: the registry dedups on endpoint
/// equality and inserting an existing endpoint is a no-op.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// Unique delivery address assigned by the push provider.
    pub endpoint: String,
    /// Opaque key material required by the push protocol.
    #[serde(default)]
    pub keys: SubscriptionKeys,
}

/// Client key material, opaque to this core.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionKeys {
    #[serde(default)]
    pub p256dh: String,
    #[serde(default)]
    pub auth: String,
}

impl Subscription {
    /// Build a subscription from its endpoint alone (keys empty).
    pub fn bare(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            keys: SubscriptionKeys::default(),
        }
    }
}
