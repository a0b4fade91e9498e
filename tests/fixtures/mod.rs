//! Shared fixtures for integration tests

#![allow(dead_code)]

use fireteams::matchmaking::{IterationOutcome, QueueProcessor, QueueProcessorConfig};
use fireteams::metrics::MetricsCollector;
use fireteams::notify::{ClientNotification, RecordingNotificationSink};
use fireteams::registration::{ClientInfo, RegistrationHandler};
use fireteams::store::InMemoryWaitEntryStore;
use fireteams::tracking::RecordingTracker;
use fireteams::types::{Activity, Language, Party, Platform};
use std::sync::Arc;
use std::time::Duration;

/// Builder for valid parties; defaults to a solo level 30 English PS4 player
/// looking for the daily story
#[derive(Debug, Clone)]
pub struct PartyBuilder {
    party: Party,
}

impl PartyBuilder {
    pub fn new(username: &str) -> Self {
        Self {
            party: Party {
                language: Language::English,
                platform: Platform::PS4,
                activity: Activity::DailyStory,
                party_size: 1,
                username: username.to_string(),
                level: 30,
            },
        }
    }

    pub fn activity(mut self, activity: Activity) -> Self {
        self.party.activity = activity;
        self
    }

    pub fn language(mut self, language: Language) -> Self {
        self.party.language = language;
        self
    }

    pub fn platform(mut self, platform: Platform) -> Self {
        self.party.platform = platform;
        self
    }

    pub fn size(mut self, party_size: u32) -> Self {
        self.party.party_size = party_size;
        self
    }

    pub fn level(mut self, level: u32) -> Self {
        self.party.level = level;
        self
    }

    pub fn build(self) -> Party {
        self.party
    }
}

/// A registration handler and queue processor sharing one in-memory store,
/// with recording collaborators
pub struct TestSystem {
    pub store: Arc<InMemoryWaitEntryStore>,
    pub notifier: Arc<RecordingNotificationSink>,
    pub tracker: Arc<RecordingTracker>,
    pub metrics: Arc<MetricsCollector>,
    pub registration: Arc<RegistrationHandler>,
    pub processor: QueueProcessor,
}

impl TestSystem {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryWaitEntryStore::new());
        let notifier = Arc::new(RecordingNotificationSink::new());
        let tracker = Arc::new(RecordingTracker::new());
        let metrics = Arc::new(MetricsCollector::new().unwrap());

        let processor = QueueProcessor::new(
            store.clone(),
            notifier.clone(),
            tracker.clone(),
            metrics.clone(),
        )
        .with_config(QueueProcessorConfig {
            searching_status_delay: Duration::from_millis(10),
            ..QueueProcessorConfig::default()
        });

        let registration = Arc::new(RegistrationHandler::new(
            store.clone(),
            notifier.clone(),
            tracker.clone(),
            metrics.clone(),
            processor.time_to_match(),
        ));

        Self {
            store,
            notifier,
            tracker,
            metrics,
            registration,
            processor,
        }
    }

    /// Register a party from the web client, asserting it was accepted
    pub async fn register(&self, connection_id: &str, party: Party) {
        let accepted = self
            .registration
            .register(connection_id, &ClientInfo::web("1.0"), party)
            .await;
        assert!(accepted, "registration of {} was refused", connection_id);
    }

    /// Run one processor iteration and wait for its notifications to land
    pub async fn iterate(&mut self) -> IterationOutcome {
        let outcome = self
            .processor
            .run_iteration()
            .await
            .expect("iteration completes");
        tokio::time::sleep(Duration::from_millis(20)).await;
        outcome
    }

    /// Parties delivered to `connection_id` in its match notification, if any
    pub fn match_for(&self, connection_id: &str) -> Option<Vec<Party>> {
        self.notifier
            .for_connection(connection_id)
            .into_iter()
            .find_map(|notification| match notification {
                ClientNotification::MatchFound { parties } => Some(parties),
                _ => None,
            })
    }
}

impl Default for TestSystem {
    fn default() -> Self {
        Self::new()
    }
}
