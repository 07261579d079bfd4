//! Push protocol client.

use std::time::Duration;

use reqwest::StatusCode;
use tracing::debug;

use crate::error::DeliveryError;
use crate::payload::NotificationPayload;
use crate::subscription::Subscription;

/// How long a pushed message may be queued at the provider.
const PUSH_TTL_SECS: u32 = 60;

/// Authenticated sender for the store-and-forward push channel.
///
/// Each delivery is one bounded-timeout POST of the payload to the
/// subscription endpoint, carrying the configured credential. The full
/// key-exchange handshake is the push provider's concern, not this
/// client's.
pub struct PushClient {
    http: reqwest::Client,
    token: Option<String>,
}

impl PushClient {
    /// Build a client with the given credential and per-request timeout.
    pub fn new(token: Option<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, token })
    }

    /// Deliver one payload to one subscription.
    ///
    /// 404 and 410 responses mean the endpoint is permanently gone;
    /// everything else non-2xx is transient and left for the next
    /// trigger invocation to retry.
    pub async fn send(
        &self,
        subscription: &Subscription,
        payload: &NotificationPayload,
    ) -> Result<(), DeliveryError> {
        let mut request = self
            .http
            .post(&subscription.endpoint)
            .header("TTL", PUSH_TTL_SECS)
            .json(payload);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            debug!(endpoint = %subscription.endpoint, "push delivered");
            return Ok(());
        }

        match status {
            StatusCode::GONE | StatusCode::NOT_FOUND => Err(DeliveryError::Gone {
                status: status.as_u16(),
            }),
            _ => Err(DeliveryError::Rejected {
                status: status.as_u16(),
            }),
        }
    }
}
