//! The matchmaking loop
//!
//! Each iteration pops one work item, claims its wait entry as the seed of a
//! new fireteam and greedily claims ranked candidates until the fireteam is
//! full or the candidates run out. Claims are store deletes: whoever deletes an
//! entry owns it. Full fireteams are announced and the work item is discarded;
//! partial ones go back into the pool and the work item is left to reappear
//! after its visibility timeout.

use crate::error::Result;
use crate::matchmaking::evaluator::{LevelBasedMatchEvaluator, MatchEvaluator};
use crate::matchmaking::fireteam::Fireteam;
use crate::matchmaking::pacing::PacingPolicy;
use crate::metrics::MetricsCollector;
use crate::notify::{ClientNotification, NotificationSink, STATUS_EVALUATING, STATUS_SEARCHING};
use crate::store::WaitEntryStore;
use crate::tracking::{TrackedEvent, Tracker};
use crate::types::{WaitEntry, WorkItem};
use crate::utils::{current_timestamp, millis};
use crate::wait_time::{TimeToMatch, TimeToMatchReader};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Loop tuning
#[derive(Debug, Clone)]
pub struct QueueProcessorConfig {
    pub pacing: PacingPolicy,
    /// Delay before a partially filled seed is told it is searching again
    pub searching_status_delay: Duration,
}

impl Default for QueueProcessorConfig {
    fn default() -> Self {
        Self {
            pacing: PacingPolicy::default(),
            searching_status_delay: Duration::from_millis(2500),
        }
    }
}

/// How an iteration ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IterationOutcome {
    /// No visible work item
    Idle,
    /// Same work item as the previous iteration
    Duplicate,
    /// The work item named an entry that no longer exists
    Withdrawn,
    /// Another claimant took the seed first
    ClaimLost,
    /// A full fireteam was assembled
    Matched { members: usize },
    /// The fireteam could not be filled and went back into the pool
    Partial { current: u32, target: u32 },
}

impl IterationOutcome {
    /// Metric label
    pub fn label(&self) -> &'static str {
        match self {
            IterationOutcome::Idle => "idle",
            IterationOutcome::Duplicate => "duplicate",
            IterationOutcome::Withdrawn => "withdrawn",
            IterationOutcome::ClaimLost => "claim_lost",
            IterationOutcome::Matched { .. } => "matched",
            IterationOutcome::Partial { .. } => "partial",
        }
    }
}

/// Steps of a single iteration
enum IterationState {
    Dequeue,
    Resolve(WorkItem),
    ClaimSeed(WorkItem, WaitEntry),
    Assemble(WorkItem, Fireteam),
    Commit(WorkItem, Fireteam),
    Done(IterationOutcome),
}

/// Runs the matchmaking loop against a wait entry store
pub struct QueueProcessor {
    store: Arc<dyn WaitEntryStore>,
    evaluator: Arc<dyn MatchEvaluator>,
    notifier: Arc<dyn NotificationSink>,
    tracker: Arc<dyn Tracker>,
    metrics_collector: Arc<MetricsCollector>,
    config: QueueProcessorConfig,
    time_to_match: TimeToMatch,
    /// Message id of the previous iteration, for skipping redeliveries
    last_message_id: Option<String>,
}

impl QueueProcessor {
    pub fn new(
        store: Arc<dyn WaitEntryStore>,
        notifier: Arc<dyn NotificationSink>,
        tracker: Arc<dyn Tracker>,
        metrics_collector: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            store,
            evaluator: Arc::new(LevelBasedMatchEvaluator::new()),
            notifier,
            tracker,
            metrics_collector,
            config: QueueProcessorConfig::default(),
            time_to_match: TimeToMatch::default(),
            last_message_id: None,
        }
    }

    pub fn with_evaluator(mut self, evaluator: Arc<dyn MatchEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn with_config(mut self, config: QueueProcessorConfig) -> Self {
        self.config = config;
        self
    }

    /// Record matches into an existing history instead of a private one
    pub fn with_time_to_match(mut self, time_to_match: TimeToMatch) -> Self {
        self.time_to_match = time_to_match;
        self
    }

    pub fn time_to_match(&self) -> TimeToMatchReader {
        self.time_to_match.reader()
    }

    /// Loop until a shutdown signal arrives
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            "Running queue processor (sleep {}-{}ms, normalization {})",
            self.config.pacing.floor_ms,
            self.config.pacing.ceiling_ms,
            self.config.pacing.normalization
        );

        loop {
            let sleep = self.tick().await;

            tokio::select! {
                _ = tokio::time::sleep(sleep) => {}
                _ = shutdown.recv() => {
                    info!("Queue processor received shutdown signal");
                    break;
                }
            }
        }

        info!("Queue processor stopped");
    }

    /// Run one iteration and decide how long to sleep before the next
    pub async fn tick(&mut self) -> Duration {
        let timer = self.metrics_collector.start_timer();

        match self.run_iteration().await {
            Ok(outcome) => {
                let elapsed = timer.stop();
                self.metrics_collector
                    .record_iteration(outcome.label(), elapsed);
                debug!(
                    "Queue iteration finished: {:?} in {:.2}ms",
                    outcome,
                    millis(elapsed)
                );
            }
            Err(e) => {
                self.metrics_collector.record_iteration("error", timer.stop());
                error!("Queue iteration failed: {:#}", e);
                let backoff = self.config.pacing.backoff();
                self.metrics_collector.record_pacing(None, backoff);
                return backoff;
            }
        }

        match self.store.approx_population().await {
            Ok(population) => {
                let sleep = self.config.pacing.sleep_for_population(population);
                self.metrics_collector.record_pacing(Some(population), sleep);
                sleep
            }
            Err(e) => {
                warn!("Failed to count waiting population: {}", e);
                let backoff = self.config.pacing.backoff();
                self.metrics_collector.record_pacing(None, backoff);
                backoff
            }
        }
    }

    /// Walk one iteration from dequeue to outcome
    pub async fn run_iteration(&mut self) -> Result<IterationOutcome> {
        let mut state = IterationState::Dequeue;

        loop {
            state = match state {
                IterationState::Dequeue => self.dequeue().await?,
                IterationState::Resolve(item) => self.resolve(item).await?,
                IterationState::ClaimSeed(item, entry) => self.claim_seed(item, entry).await?,
                IterationState::Assemble(item, fireteam) => self.assemble(item, fireteam).await?,
                IterationState::Commit(item, fireteam) => self.commit(item, fireteam).await?,
                IterationState::Done(outcome) => return Ok(outcome),
            };
        }
    }

    async fn dequeue(&mut self) -> Result<IterationState> {
        let Some(item) = self.store.dequeue_work().await? else {
            return Ok(IterationState::Done(IterationOutcome::Idle));
        };

        if self.last_message_id.as_deref() == Some(item.message_id.as_str()) {
            debug!("Work item {} already handled, skipping", item.message_id);
            return Ok(IterationState::Done(IterationOutcome::Duplicate));
        }

        debug!(
            "Dequeued work item {} for entry {} (delivery #{})",
            item.message_id, item.entry_id, item.dequeue_count
        );
        self.last_message_id = Some(item.message_id.clone());
        Ok(IterationState::Resolve(item))
    }

    async fn resolve(&self, item: WorkItem) -> Result<IterationState> {
        match self.store.get_by_id(&item.entry_id).await? {
            Some(entry) => Ok(IterationState::ClaimSeed(item, entry)),
            None => {
                debug!(
                    "Entry {} is gone, discarding work item {}",
                    item.entry_id, item.message_id
                );
                self.store.delete_work(&item).await?;
                Ok(IterationState::Done(IterationOutcome::Withdrawn))
            }
        }
    }

    async fn claim_seed(&self, item: WorkItem, entry: WaitEntry) -> Result<IterationState> {
        let won = self.store.delete_by_id(&entry.id).await?;
        self.metrics_collector.record_claim("seed", won);

        if !won {
            debug!("Seed {} was claimed elsewhere", entry.id);
            return Ok(IterationState::Done(IterationOutcome::ClaimLost));
        }

        info!(
            "Building fireteam for {} - activity: {:?}, platform: {:?}, language: {:?}, size: {}, level: {}",
            entry.id,
            entry.party.activity,
            entry.party.platform,
            entry.party.language,
            entry.party.party_size,
            entry.party.level
        );

        self.deliver(
            &entry.id,
            ClientNotification::UpdateStatus {
                text: STATUS_EVALUATING.to_string(),
            },
        );

        Ok(IterationState::Assemble(item, Fireteam::new(entry)))
    }

    async fn assemble(&self, item: WorkItem, mut fireteam: Fireteam) -> Result<IterationState> {
        let evaluator = &self.evaluator;
        let is_candidate = |entry: &WaitEntry| evaluator.is_candidate(entry, &fireteam);
        // The seed is already claimed, so from here on store failures shrink the
        // fireteam instead of ending the iteration
        let pool = match self.store.query(&is_candidate).await {
            Ok(pool) => pool,
            Err(e) => {
                warn!(
                    "Candidate search for {} failed, continuing alone: {}",
                    fireteam.seed().id,
                    e
                );
                Vec::new()
            }
        };
        let ranked = self.evaluator.rank(pool, &fireteam);

        debug!(
            "Found {} candidates for fireteam seeded by {}",
            ranked.len(),
            fireteam.seed().id
        );

        for candidate in ranked {
            if !fireteam.fits(candidate.party.party_size) {
                continue;
            }

            let won = match self.store.delete_by_id(&candidate.id).await {
                Ok(won) => won,
                Err(e) => {
                    warn!("Failed to claim candidate {}: {}", candidate.id, e);
                    false
                }
            };
            self.metrics_collector.record_claim("candidate", won);
            if !won {
                debug!("Candidate {} was claimed elsewhere", candidate.id);
                continue;
            }

            if let Err(rejected) = fireteam.try_add(candidate) {
                warn!(
                    "Claimed candidate {} no longer fits, returning it to the pool",
                    rejected.id
                );
                if let Err(e) = self.store.create(rejected.renewed(), false).await {
                    error!("Failed to return {} to the pool: {}", rejected.id, e);
                }
                continue;
            }

            if fireteam.is_full() {
                break;
            }
        }

        Ok(IterationState::Commit(item, fireteam))
    }

    async fn commit(&self, item: WorkItem, fireteam: Fireteam) -> Result<IterationState> {
        if fireteam.is_full() {
            self.commit_full(item, fireteam).await
        } else {
            self.commit_partial(fireteam).await
        }
    }

    async fn commit_full(&self, item: WorkItem, fireteam: Fireteam) -> Result<IterationState> {
        match self.store.delete_work(&item).await {
            Ok(true) => {}
            Ok(false) => debug!("Work item {} was already gone", item.message_id),
            // A redelivery finds the seed gone and is discarded then
            Err(e) => warn!("Failed to discard work item {}: {}", item.message_id, e),
        }

        let parties = fireteam.parties();
        for member in fireteam.members() {
            self.deliver(
                &member.id,
                ClientNotification::MatchFound {
                    parties: parties.clone(),
                },
            );
        }

        let now = current_timestamp();
        for member in fireteam.members() {
            self.track_match(member, now);
        }

        let seed_wait = fireteam.seed().wait_duration(now);
        self.time_to_match.record(seed_wait);
        self.metrics_collector.record_match(
            fireteam.activity(),
            fireteam.total_party_size(),
            seed_wait,
        );

        info!(
            "Fireteam complete for {:?}: {} parties, {} players, seed waited {}s",
            fireteam.activity(),
            fireteam.members().len(),
            fireteam.total_party_size(),
            seed_wait.as_secs()
        );

        Ok(IterationState::Done(IterationOutcome::Matched {
            members: fireteam.members().len(),
        }))
    }

    async fn commit_partial(&self, fireteam: Fireteam) -> Result<IterationState> {
        let current = fireteam.total_party_size();
        let target = fireteam.target_size();

        for member in fireteam.members() {
            self.deliver(
                &member.id,
                ClientNotification::UpdateProgress { current, target },
            );
        }

        self.schedule_searching_status(fireteam.seed().id.clone());
        self.metrics_collector.record_partial(current);

        let members = fireteam.into_members();
        let mut failures = 0;
        for member in &members {
            match self.store.create(member.renewed(), false).await {
                Ok(true) => {}
                Ok(false) => warn!("Entry {} reappeared before it was returned", member.id),
                Err(e) => {
                    error!("Failed to return {} to the pool: {}", member.id, e);
                    failures += 1;
                }
            }
        }

        info!(
            "Fireteam incomplete ({}/{}), returned {} parties to the pool",
            current,
            target,
            members.len() - failures
        );

        if failures > 0 {
            anyhow::bail!(
                "Failed to return {} of {} parties to the pool",
                failures,
                members.len()
            );
        }

        Ok(IterationState::Done(IterationOutcome::Partial { current, target }))
    }

    /// Tell the seed it is searching again once the "Evaluating" status has
    /// been visible for a moment
    fn schedule_searching_status(&self, seed_id: String) {
        let notifier = self.notifier.clone();
        let delay = self.config.searching_status_delay;

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = notifier.update_status(&seed_id, STATUS_SEARCHING).await {
                debug!("Failed to send searching status to {}: {}", seed_id, e);
            }
        });
    }

    fn track_match(&self, member: &WaitEntry, now: DateTime<Utc>) {
        let id = member.id.as_str();
        let party = &member.party;
        let age = member.wait_duration(now).as_secs();

        let events = [
            TrackedEvent::new(id, "Matchmaking", "MatchFound").with_value(age),
            TrackedEvent::new(id, "Matched", "Language").with_label(format!("{:?}", party.language)),
            TrackedEvent::new(id, "Matched", "Platform").with_label(format!("{:?}", party.platform)),
            TrackedEvent::new(id, "Matched", "PartySize").with_label(party.party_size.to_string()),
            TrackedEvent::new(id, "Matched", "Activity").with_label(format!("{:?}", party.activity)),
            TrackedEvent::new(id, "Matched", "Level").with_label(party.level.to_string()),
        ];

        for event in events {
            self.tracker.track_event(event);
        }
    }

    /// Best-effort delivery on a detached task so a slow transport never
    /// holds up the loop. Failures are logged and counted.
    fn deliver(&self, connection_id: &str, notification: ClientNotification) {
        let notifier = self.notifier.clone();
        let metrics_collector = self.metrics_collector.clone();
        let connection_id = connection_id.to_string();

        tokio::spawn(async move {
            let kind = notification.kind();
            match notifier.notify(&connection_id, notification).await {
                Ok(()) => metrics_collector.record_notification(kind, true),
                Err(e) => {
                    warn!("Failed to send {} to {}: {}", kind, connection_id, e);
                    metrics_collector.record_notification(kind, false);
                }
            }
        });
    }
}
