//! Client-facing registration and withdrawal
//!
//! Registering creates a wait entry with a work item; the queue processor
//! picks it up from there. Withdrawing races the processor for the entry
//! exactly like a candidate claim.

use crate::error::{MatchmakingError, Result};
use crate::metrics::MetricsCollector;
use crate::notify::{ClientNotification, NotificationSink, STATUS_SEARCHING};
use crate::registration::validation::{validate_client, validate_party, ClientInfo, ClientPolicy};
use crate::store::WaitEntryStore;
use crate::tracking::{TrackedEvent, Tracker};
use crate::types::{Activity, Party, WaitEntry};
use crate::utils::current_timestamp;
use crate::wait_time::TimeToMatchReader;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Shown when the store refuses or fails a registration
pub const REGISTRATION_FAILED: &str = "Failed to join matchmaking, please try again.";

pub const TRIALS_WARNING: &str =
    "Make sure you have obtained a Trials Passage from Brother Vance, otherwise you cannot compete!";

pub const UNDERLEVELED_WARNING: &str = "You are below the recommended level for this activity! Please don't assume other Guardians will be willing to carry you!";

/// Handles register, unregister and time-to-match requests from clients
pub struct RegistrationHandler {
    store: Arc<dyn WaitEntryStore>,
    notifier: Arc<dyn NotificationSink>,
    tracker: Arc<dyn Tracker>,
    metrics_collector: Arc<MetricsCollector>,
    client_policy: ClientPolicy,
    time_to_match: TimeToMatchReader,
}

impl RegistrationHandler {
    pub fn new(
        store: Arc<dyn WaitEntryStore>,
        notifier: Arc<dyn NotificationSink>,
        tracker: Arc<dyn Tracker>,
        metrics_collector: Arc<MetricsCollector>,
        time_to_match: TimeToMatchReader,
    ) -> Self {
        Self {
            store,
            notifier,
            tracker,
            metrics_collector,
            client_policy: ClientPolicy::default(),
            time_to_match,
        }
    }

    pub fn with_client_policy(mut self, client_policy: ClientPolicy) -> Self {
        self.client_policy = client_policy;
        self
    }

    /// Check a newly connected client. Problems are shown to the client but
    /// the connection is kept.
    pub async fn connect(&self, connection_id: &str, client: &ClientInfo) -> bool {
        match validate_client(client, &self.client_policy) {
            Ok(()) => {
                debug!("Client {} connected ({:?})", connection_id, client.client);
                true
            }
            Err(e) => {
                warn!("Client {} rejected on connect: {}", connection_id, e);
                self.deliver(
                    connection_id,
                    ClientNotification::DisplayError {
                        message: user_message(&e),
                    },
                )
                .await;
                false
            }
        }
    }

    /// Add a party to the pool. Returns whether the party is now waiting.
    pub async fn register(&self, connection_id: &str, client: &ClientInfo, party: Party) -> bool {
        let timer = self.metrics_collector.start_timer();

        info!(
            "Registration from {} - activity: {:?}, platform: {:?}, language: {:?}, size: {}, level: {}",
            connection_id,
            party.activity,
            party.platform,
            party.language,
            party.party_size,
            party.level
        );

        let result = self.try_register(connection_id, client, &party).await;
        let success = result.is_ok();
        self.metrics_collector
            .record_registration(success, timer.stop());

        match result {
            Ok(()) => true,
            Err(e) => {
                warn!("Registration from {} failed: {:#}", connection_id, e);
                self.tracker.track_event(TrackedEvent::new(
                    connection_id,
                    "Matchmaking",
                    "RegisterFail",
                ));
                self.deliver(
                    connection_id,
                    ClientNotification::DisplayError {
                        message: user_message(&e),
                    },
                )
                .await;
                false
            }
        }
    }

    async fn try_register(
        &self,
        connection_id: &str,
        client: &ClientInfo,
        party: &Party,
    ) -> Result<()> {
        validate_client(client, &self.client_policy)?;
        let now = current_timestamp();
        validate_party(party, now)?;

        if self.store.get_by_id(connection_id).await?.is_some() {
            debug!("{} is already registered", connection_id);
            return Ok(());
        }

        let entry = WaitEntry::new(connection_id, party.clone(), now);
        if !self.store.create(entry, true).await? {
            return Err(MatchmakingError::store(format!(
                "Wait entry {} was refused",
                connection_id
            ))
            .into());
        }

        self.tracker.track_event(TrackedEvent::new(
            connection_id,
            "Matchmaking",
            "RegisterSuccess",
        ));
        self.track_attributes(connection_id, "Registered", party);

        self.deliver(
            connection_id,
            ClientNotification::UpdateStatus {
                text: STATUS_SEARCHING.to_string(),
            },
        )
        .await;
        self.deliver(
            connection_id,
            ClientNotification::UpdateProgress {
                current: party.party_size,
                target: party.activity.users_needed(),
            },
        )
        .await;

        if let Some(warning) = registration_warning(party) {
            self.deliver(
                connection_id,
                ClientNotification::DisplayWarning {
                    message: warning.to_string(),
                },
            )
            .await;
        }

        info!("{} is now waiting for a fireteam", connection_id);
        Ok(())
    }

    /// Withdraw a waiting party. Returns whether this call removed it.
    pub async fn unregister(&self, connection_id: &str) -> Result<bool> {
        let Some(entry) = self.store.get_by_id(connection_id).await? else {
            self.metrics_collector.record_unregistration(false);
            return Ok(false);
        };

        let removed = self.store.delete_by_id(connection_id).await?;
        self.metrics_collector.record_claim("withdrawal", removed);
        self.metrics_collector.record_unregistration(removed);

        if removed {
            let age = entry.wait_duration(current_timestamp()).as_secs();
            self.tracker.track_event(
                TrackedEvent::new(connection_id, "Matchmaking", "Unregister").with_value(age),
            );
            self.track_attributes(connection_id, "Unregistered", &entry.party);
            info!("{} left matchmaking after {}s", connection_id, age);
        } else {
            debug!("{} was claimed before it could withdraw", connection_id);
        }

        Ok(removed)
    }

    /// Rolling average wait before a match, for display
    pub fn time_to_match(&self) -> String {
        self.time_to_match.display()
    }

    /// Send the time-to-match display string to a client
    pub async fn reply_time_to_match(&self, connection_id: &str) {
        self.deliver(
            connection_id,
            ClientNotification::TimeToMatch {
                display: self.time_to_match(),
            },
        )
        .await;
    }

    fn track_attributes(&self, connection_id: &str, category: &str, party: &Party) {
        let events = [
            TrackedEvent::new(connection_id, category, "Language")
                .with_label(format!("{:?}", party.language)),
            TrackedEvent::new(connection_id, category, "Platform")
                .with_label(format!("{:?}", party.platform)),
            TrackedEvent::new(connection_id, category, "PartySize")
                .with_label(party.party_size.to_string()),
            TrackedEvent::new(connection_id, category, "Activity")
                .with_label(format!("{:?}", party.activity)),
            TrackedEvent::new(connection_id, category, "Level").with_label(party.level.to_string()),
        ];

        for event in events {
            self.tracker.track_event(event);
        }
    }

    async fn deliver(&self, connection_id: &str, notification: ClientNotification) {
        let kind = notification.kind();
        match self.notifier.notify(connection_id, notification).await {
            Ok(()) => self.metrics_collector.record_notification(kind, true),
            Err(e) => {
                warn!("Failed to send {} to {}: {}", kind, connection_id, e);
                self.metrics_collector.record_notification(kind, false);
            }
        }
    }
}

/// Warning shown after a successful registration, if any
fn registration_warning(party: &Party) -> Option<&'static str> {
    if party.activity == Activity::TrialsOfOsiris {
        Some(TRIALS_WARNING)
    } else if party.level < party.activity.recommended_level() {
        Some(UNDERLEVELED_WARNING)
    } else {
        None
    }
}

/// Validation messages go to the user verbatim; anything else gets the
/// generic retry message
fn user_message(error: &anyhow::Error) -> String {
    match error.downcast_ref::<MatchmakingError>() {
        Some(MatchmakingError::ValidationError { message }) => message.clone(),
        _ => REGISTRATION_FAILED.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::RecordingNotificationSink;
    use crate::store::InMemoryWaitEntryStore;
    use crate::tracking::RecordingTracker;
    use crate::types::{Language, Platform};
    use crate::wait_time::TimeToMatch;
    use std::time::Duration;

    struct Harness {
        store: Arc<InMemoryWaitEntryStore>,
        sink: Arc<RecordingNotificationSink>,
        tracker: Arc<RecordingTracker>,
        history: TimeToMatch,
        handler: RegistrationHandler,
    }

    fn harness() -> Harness {
        let store = Arc::new(InMemoryWaitEntryStore::new());
        let sink = Arc::new(RecordingNotificationSink::new());
        let tracker = Arc::new(RecordingTracker::new());
        let history = TimeToMatch::new(10);
        let handler = RegistrationHandler::new(
            store.clone(),
            sink.clone(),
            tracker.clone(),
            Arc::new(MetricsCollector::new().unwrap()),
            history.reader(),
        )
        .with_client_policy(ClientPolicy {
            web_client_version: Some("v7".to_string()),
            blocked_clients: vec!["example.com".to_string()],
        });

        Harness {
            store,
            sink,
            tracker,
            history,
            handler,
        }
    }

    fn party(activity: Activity, level: u32) -> Party {
        Party {
            language: Language::English,
            platform: Platform::XboxOne,
            activity,
            party_size: 1,
            username: "Guardian".to_string(),
            level,
        }
    }

    fn errors(sink: &RecordingNotificationSink, id: &str) -> Vec<String> {
        sink.for_connection(id)
            .into_iter()
            .filter_map(|n| match n {
                ClientNotification::DisplayError { message } => Some(message),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_register_creates_entry_and_work() {
        let h = harness();
        assert!(
            h.handler
                .register("c1", &ClientInfo::web("v7"), party(Activity::WeeklyStrike, 28))
                .await
        );

        assert!(h.store.get_by_id("c1").await.unwrap().is_some());
        assert_eq!(h.store.queue_len().unwrap(), 1);

        assert_eq!(
            h.sink.for_connection("c1"),
            vec![
                ClientNotification::UpdateStatus {
                    text: "Searching".to_string()
                },
                ClientNotification::UpdateProgress {
                    current: 1,
                    target: 3
                },
            ]
        );
        assert_eq!(h.tracker.count("Matchmaking", "RegisterSuccess"), 1);
        assert_eq!(h.tracker.events_for("c1").len(), 6);
    }

    #[tokio::test]
    async fn test_register_warns_underleveled() {
        let h = harness();
        assert!(
            h.handler
                .register("c1", &ClientInfo::new("my-app", None), party(Activity::VaultOfGlass, 24))
                .await
        );

        assert_eq!(
            h.sink.for_connection("c1").last(),
            Some(&ClientNotification::DisplayWarning {
                message: UNDERLEVELED_WARNING.to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_register_twice_is_idempotent() {
        let h = harness();
        let client = ClientInfo::web("v7");
        assert!(h.handler.register("c1", &client, party(Activity::DailyStory, 22)).await);
        assert!(h.handler.register("c1", &client, party(Activity::DailyStory, 22)).await);

        assert_eq!(h.store.queue_len().unwrap(), 1);
        assert_eq!(h.tracker.count("Matchmaking", "RegisterSuccess"), 1);
    }

    #[tokio::test]
    async fn test_invalid_party_is_rejected() {
        let h = harness();
        let mut big = party(Activity::DailyStory, 22);
        big.party_size = 3;

        assert!(!h.handler.register("c1", &ClientInfo::web("v7"), big).await);
        assert!(h.store.get_by_id("c1").await.unwrap().is_none());
        assert_eq!(h.store.queue_len().unwrap(), 0);
        assert_eq!(
            errors(&h.sink, "c1"),
            vec!["Party size is too large for this activity".to_string()]
        );
        assert_eq!(h.tracker.count("Matchmaking", "RegisterFail"), 1);
    }

    #[tokio::test]
    async fn test_outdated_web_client_is_rejected() {
        let h = harness();
        assert!(
            !h.handler
                .register("c1", &ClientInfo::web("v6"), party(Activity::DailyStory, 22))
                .await
        );
        assert_eq!(
            errors(&h.sink, "c1"),
            vec!["Firetea.ms has been updated, please refresh the page.".to_string()]
        );
    }

    #[tokio::test]
    async fn test_connect_reports_blocked_client() {
        let h = harness();
        assert!(h.handler.connect("ok", &ClientInfo::web("v7")).await);
        assert!(
            !h.handler
                .connect("bad", &ClientInfo::new("example.com", None))
                .await
        );
        assert!(h.sink.for_connection("ok").is_empty());
        assert_eq!(errors(&h.sink, "bad").len(), 1);
    }

    #[tokio::test]
    async fn test_unregister_removes_and_tracks() {
        let h = harness();
        let client = ClientInfo::web("v7");
        h.handler.register("c1", &client, party(Activity::DailyStory, 22)).await;

        assert!(h.handler.unregister("c1").await.unwrap());
        assert!(h.store.get_by_id("c1").await.unwrap().is_none());
        assert_eq!(h.tracker.count("Matchmaking", "Unregister"), 1);
        assert_eq!(h.tracker.count("Unregistered", "Level"), 1);

        assert!(!h.handler.unregister("c1").await.unwrap());
        assert_eq!(h.tracker.count("Matchmaking", "Unregister"), 1);
    }

    #[tokio::test]
    async fn test_time_to_match_display() {
        let h = harness();
        assert_eq!(h.handler.time_to_match(), "N/A");

        h.history.record(Duration::from_secs(75));
        assert_eq!(h.handler.time_to_match(), "1m 15s");

        h.handler.reply_time_to_match("c1").await;
        assert_eq!(
            h.sink.for_connection("c1"),
            vec![ClientNotification::TimeToMatch {
                display: "1m 15s".to_string()
            }]
        );
    }
}
