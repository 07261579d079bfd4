//! Delivery dispatcher: push fan-out plus live broadcast.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use routineos_core::{BroadcastHub, DayKey, MatchedItem, ServerEvent};

use crate::client::PushClient;
use crate::payload::NotificationPayload;
use crate::store::SubscriptionStore;
use crate::subscription::Subscription;

/// Outcome of one delivery attempt to one subscription.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryResult {
    pub endpoint: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Complete per-invocation delivery report.
///
/// Per-target failures are data here, never raised: one bad endpoint
/// must not abort delivery to the rest.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchReport {
    /// One entry per (item, subscription) push attempt.
    pub results: Vec<DeliveryResult>,
    /// Live connections that received the broadcast, summed over items.
    pub clients_notified: usize,
    /// False when dead-endpoint cleanup could not be persisted.
    pub cleanup_persisted: bool,
    /// Storage failure that prevented reading the registry snapshot.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_error: Option<String>,
}

/// Sends notification payloads to every registered push target and to
/// every live streaming connection.
pub struct Dispatcher {
    store: Arc<SubscriptionStore>,
    client: PushClient,
    hub: Arc<BroadcastHub>,
}

impl Dispatcher {
    pub fn new(store: Arc<SubscriptionStore>, client: PushClient, hub: Arc<BroadcastHub>) -> Self {
        Self { store, client, hub }
    }

    /// Deliver the given already-deduplicated items.
    ///
    /// Pushes to a registry snapshot taken at the start of the call,
    /// broadcasts to the hub independently of push outcomes, and
    /// batch-removes endpoints the provider reported permanently gone.
    /// Zero subscriptions and zero connections is a successful no-op.
    pub async fn dispatch(
        &self,
        items: &[MatchedItem],
        day: DayKey,
        now: DateTime<Utc>,
    ) -> DispatchReport {
        let (subscriptions, storage_error) = self.snapshot().await;

        let mut results = Vec::new();
        let mut dead: Vec<String> = Vec::new();
        let mut clients_notified = 0;

        for matched in items {
            let payload = NotificationPayload::for_item(&matched.item, day, now);
            self.push_payload(&payload, &subscriptions, &mut results, &mut dead)
                .await;

            clients_notified += self.hub.broadcast(&ServerEvent::UpcomingTask {
                task: matched.item.clone(),
                day_index: day.index(),
                timestamp: now,
            });
        }

        let cleanup_persisted = self.prune(&dead).await;

        if !items.is_empty() {
            info!(
                items = items.len(),
                attempts = results.len(),
                clients_notified,
                pruned = dead.len(),
                "dispatch complete"
            );
        }

        DispatchReport {
            results,
            clients_notified,
            cleanup_persisted,
            storage_error,
        }
    }

    /// Deliver one caller-supplied payload outside the match/dedup path.
    ///
    /// Targets the whole registry, or only endpoints containing the given
    /// fragment. Prunes permanently-gone endpoints like scheduled
    /// dispatch does; no hub broadcast happens here.
    pub async fn dispatch_manual(
        &self,
        payload: &NotificationPayload,
        endpoint_contains: Option<&str>,
    ) -> DispatchReport {
        let (subscriptions, storage_error) = self.snapshot().await;
        let targets: Vec<Subscription> = match endpoint_contains {
            Some(fragment) => subscriptions
                .into_iter()
                .filter(|s| s.endpoint.contains(fragment))
                .collect(),
            None => subscriptions,
        };

        let mut results = Vec::new();
        let mut dead: Vec<String> = Vec::new();
        self.push_payload(payload, &targets, &mut results, &mut dead)
            .await;
        let cleanup_persisted = self.prune(&dead).await;

        info!(
            attempts = results.len(),
            pruned = dead.len(),
            "manual dispatch complete"
        );

        DispatchReport {
            results,
            clients_notified: 0,
            cleanup_persisted,
            storage_error,
        }
    }

    /// Registry snapshot; a read failure skips push delivery for this
    /// invocation and is reported, not raised.
    async fn snapshot(&self) -> (Vec<Subscription>, Option<String>) {
        match self.store.list().await {
            Ok(subs) => (subs, None),
            Err(e) => {
                warn!(error = %e, "could not read subscription registry, push delivery skipped");
                (Vec::new(), Some(e.to_string()))
            }
        }
    }

    async fn push_payload(
        &self,
        payload: &NotificationPayload,
        subscriptions: &[Subscription],
        results: &mut Vec<DeliveryResult>,
        dead: &mut Vec<String>,
    ) {
        for subscription in subscriptions {
            match self.client.send(subscription, payload).await {
                Ok(()) => results.push(DeliveryResult {
                    endpoint: subscription.endpoint.clone(),
                    ok: true,
                    error: None,
                }),
                Err(e) => {
                    if e.is_permanent() && !dead.contains(&subscription.endpoint) {
                        dead.push(subscription.endpoint.clone());
                    }
                    warn!(
                        endpoint = %subscription.endpoint,
                        error = %e,
                        permanent = e.is_permanent(),
                        "push delivery failed"
                    );
                    results.push(DeliveryResult {
                        endpoint: subscription.endpoint.clone(),
                        ok: false,
                        error: Some(e.to_string()),
                    });
                }
            }
        }
    }

    /// Persist removal of dead endpoints. Returns false when the cleanup
    /// write failed; the failure is logged, never raised.
    async fn prune(&self, dead: &[String]) -> bool {
        if dead.is_empty() {
            return true;
        }
        match self.store.remove_many(dead).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "failed to persist dead endpoint cleanup");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use routineos_core::ScheduleItem;

    use crate::subscription::Subscription;

    use super::*;

    fn matched(task: &str) -> MatchedItem {
        MatchedItem {
            item: ScheduleItem {
                start: "08:00".to_string(),
                end: "08:30".to_string(),
                task: task.to_string(),
                description: String::new(),
            },
            seconds_until: 30,
        }
    }

    async fn dispatcher_with(
        server: &MockServer,
        endpoints: &[&str],
    ) -> (tempfile::TempDir, Arc<SubscriptionStore>, Dispatcher, Arc<BroadcastHub>) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(
            SubscriptionStore::open(dir.path().join("subs.json"))
                .await
                .unwrap(),
        );
        for endpoint in endpoints {
            store
                .add(Subscription::bare(format!("{}{}", server.uri(), endpoint)))
                .await
                .unwrap();
        }
        let hub = Arc::new(BroadcastHub::new());
        let client = PushClient::new(None, Duration::from_secs(5)).unwrap();
        let dispatcher = Dispatcher::new(store.clone(), client, hub.clone());
        (dir, store, dispatcher, hub)
    }

    #[tokio::test]
    async fn test_failure_isolation_and_registry_cleanup() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(410))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/ok"))
            .respond_with(ResponseTemplate::new(201))
            .mount(&server)
            .await;

        let (_dir, store, dispatcher, _hub) =
            dispatcher_with(&server, &["/gone", "/flaky", "/ok"]).await;

        let report = dispatcher
            .dispatch(&[matched("Standup")], DayKey::Monday, Utc::now())
            .await;

        assert_eq!(report.results.len(), 3);
        assert_eq!(report.results.iter().filter(|r| r.ok).count(), 1);
        assert!(report.cleanup_persisted);
        assert!(report.storage_error.is_none());

        // Only the permanently-gone endpoint was deregistered.
        let remaining = store.list().await.unwrap();
        assert_eq!(remaining.len(), 2);
        assert!(remaining.iter().all(|s| !s.endpoint.ends_with("/gone")));
    }

    #[tokio::test]
    async fn test_no_targets_is_successful_noop() {
        let server = MockServer::start().await;
        let (_dir, _store, dispatcher, _hub) = dispatcher_with(&server, &[]).await;

        let report = dispatcher
            .dispatch(&[matched("Standup")], DayKey::Monday, Utc::now())
            .await;

        assert!(report.results.is_empty());
        assert_eq!(report.clients_notified, 0);
        assert!(report.cleanup_persisted);
    }

    #[tokio::test]
    async fn test_broadcast_happens_independently_of_push_failures() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let (_dir, _store, dispatcher, hub) = dispatcher_with(&server, &["/only"]).await;
        let mut conn = hub.connect();
        assert_eq!(conn.events.recv().await, Some(ServerEvent::Connected));

        let report = dispatcher
            .dispatch(&[matched("Standup")], DayKey::Monday, Utc::now())
            .await;
        assert_eq!(report.clients_notified, 1);

        match conn.events.recv().await {
            Some(ServerEvent::UpcomingTask { task, day_index, .. }) => {
                assert_eq!(task.task, "Standup");
                assert_eq!(day_index, 1);
            }
            other => panic!("expected upcoming-task event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_registry_read_failure_reports_error_and_still_broadcasts() {
        let server = MockServer::start().await;
        let (dir, _store, dispatcher, hub) = dispatcher_with(&server, &["/ok"]).await;
        let mut conn = hub.connect();
        assert_eq!(conn.events.recv().await, Some(ServerEvent::Connected));

        // Registry becomes unreadable between open and dispatch.
        std::fs::write(dir.path().join("subs.json"), "not json").unwrap();

        let report = dispatcher
            .dispatch(&[matched("Standup")], DayKey::Monday, Utc::now())
            .await;

        assert!(report.storage_error.is_some());
        assert!(report.results.is_empty());
        assert!(report.cleanup_persisted);
        assert_eq!(report.clients_notified, 1);
        match conn.events.recv().await {
            Some(ServerEvent::UpcomingTask { task, .. }) => assert_eq!(task.task, "Standup"),
            other => panic!("expected upcoming-task event, got {other:?}"),
        }
    }

    /// Responds 410 and corrupts the registry file first, so the
    /// cleanup write that follows the delivery loop fails.
    struct GoneAndCorruptStore {
        store_path: std::path::PathBuf,
    }

    impl wiremock::Respond for GoneAndCorruptStore {
        fn respond(&self, _request: &wiremock::Request) -> ResponseTemplate {
            std::fs::write(&self.store_path, "not json").unwrap();
            ResponseTemplate::new(410)
        }
    }

    #[tokio::test]
    async fn test_cleanup_write_failure_reflected_in_report() {
        let server = MockServer::start().await;
        let (dir, _store, dispatcher, _hub) = dispatcher_with(&server, &["/gone"]).await;
        Mock::given(method("POST"))
            .respond_with(GoneAndCorruptStore {
                store_path: dir.path().join("subs.json"),
            })
            .mount(&server)
            .await;

        let report = dispatcher
            .dispatch(&[matched("Standup")], DayKey::Monday, Utc::now())
            .await;

        assert!(report.storage_error.is_none());
        assert_eq!(report.results.len(), 1);
        assert!(!report.results[0].ok);
        assert!(!report.cleanup_persisted);
    }

    #[tokio::test]
    async fn test_manual_dispatch_filters_and_prunes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/team-a"))
            .respond_with(ResponseTemplate::new(410))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/other"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;

        let (_dir, store, dispatcher, hub) = dispatcher_with(&server, &["/team-a", "/other"]).await;
        let mut conn = hub.connect();
        assert_eq!(conn.events.recv().await, Some(ServerEvent::Connected));

        let payload = NotificationPayload::custom(
            "Heads up".to_string(),
            "Manual ping".to_string(),
            serde_json::json!({}),
            Utc::now(),
        );
        let report = dispatcher.dispatch_manual(&payload, Some("team")).await;

        assert_eq!(report.results.len(), 1);
        assert!(!report.results[0].ok);
        assert_eq!(report.clients_notified, 0);
        assert!(report.cleanup_persisted);
        // No broadcast on the manual path.
        assert!(conn.events.try_recv().is_err());

        let remaining = store.list().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert!(remaining[0].endpoint.ends_with("/other"));
    }

    #[tokio::test]
    async fn test_one_payload_per_item_per_subscription() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201))
            .expect(4)
            .mount(&server)
            .await;

        let (_dir, _store, dispatcher, _hub) = dispatcher_with(&server, &["/a", "/b"]).await;
        let report = dispatcher
            .dispatch(
                &[matched("First"), matched("Second")],
                DayKey::Monday,
                Utc::now(),
            )
            .await;
        assert_eq!(report.results.len(), 4);
    }
}
