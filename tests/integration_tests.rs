//! Integration tests for the fireteams queue engine
//!
//! These tests drive registration, the queue processor and withdrawal
//! together against the in-memory store:
//! - complete fireteam assembly
//! - partial fireteams returning to the pool
//! - claim races between processors and withdrawing clients
//! - the in-process service end to end

mod fixtures;

use fireteams::amqp::messages::ClientRequest;
use fireteams::config::AppConfig;
use fireteams::matchmaking::IterationOutcome;
use fireteams::notify::ClientNotification;
use fireteams::registration::ClientInfo;
use fireteams::service::AppState;
use fireteams::store::WaitEntryStore;
use fireteams::types::{Activity, Language, Platform, WaitEntry};
use fireteams::utils::current_timestamp;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::StreamExt;

use fixtures::{PartyBuilder, TestSystem};

#[tokio::test]
async fn test_three_solo_players_form_a_fireteam() {
    let mut system = TestSystem::new();

    system.register("c1", PartyBuilder::new("Shaxx").build()).await;
    system.register("c2", PartyBuilder::new("Eris").level(28).build()).await;
    system.register("c3", PartyBuilder::new("Cayde").level(31).build()).await;

    let outcome = system.iterate().await;
    assert_eq!(outcome, IterationOutcome::Matched { members: 3 });

    for id in ["c1", "c2", "c3"] {
        let parties = system.match_for(id).expect("every member is notified");
        assert_eq!(parties.len(), 3);
        assert!(system.store.get_by_id(id).await.unwrap().is_none());
    }

    assert_eq!(system.processor.time_to_match().sample_count(), 1);
    assert_eq!(system.tracker.count("Matchmaking", "MatchFound"), 3);

    // The other members' work items now name entries that are gone
    let outcome = system.iterate().await;
    assert_eq!(outcome, IterationOutcome::Withdrawn);
}

#[tokio::test]
async fn test_incompatible_parties_stay_waiting() {
    let mut system = TestSystem::new();

    system.register("ps4", PartyBuilder::new("Ikora").build()).await;
    system
        .register(
            "xbox",
            PartyBuilder::new("Zavala").platform(Platform::XboxOne).build(),
        )
        .await;
    system
        .register(
            "strike",
            PartyBuilder::new("Osiris")
                .activity(Activity::WeeklyStrike)
                .build(),
        )
        .await;

    let outcome = system.iterate().await;
    assert_eq!(
        outcome,
        IterationOutcome::Partial {
            current: 1,
            target: 3
        }
    );

    for id in ["ps4", "xbox", "strike"] {
        assert!(system.store.get_by_id(id).await.unwrap().is_some());
        assert!(system.match_for(id).is_none());
    }
}

#[tokio::test]
async fn test_duo_and_solo_fill_a_strike() {
    let mut system = TestSystem::new();

    system
        .register(
            "duo",
            PartyBuilder::new("Saladin")
                .activity(Activity::WeeklyStrike)
                .size(2)
                .build(),
        )
        .await;
    system
        .register(
            "solo",
            PartyBuilder::new("Variks")
                .activity(Activity::WeeklyStrike)
                .build(),
        )
        .await;

    let outcome = system.iterate().await;
    assert_eq!(outcome, IterationOutcome::Matched { members: 2 });

    let parties = system.match_for("solo").unwrap();
    assert_eq!(parties.iter().map(|p| p.party_size).sum::<u32>(), 3);
}

#[tokio::test]
async fn test_non_raid_activity_falls_back_to_english() {
    let mut system = TestSystem::new();

    system
        .register(
            "fr",
            PartyBuilder::new("Amanda").language(Language::French).build(),
        )
        .await;
    system.register("en1", PartyBuilder::new("Petra").build()).await;
    system.register("en2", PartyBuilder::new("Xur").build()).await;

    let outcome = system.iterate().await;
    assert_eq!(outcome, IterationOutcome::Matched { members: 3 });
    assert!(system.match_for("fr").is_some());
}

#[tokio::test]
async fn test_partial_fireteam_is_notified_of_progress() {
    let mut system = TestSystem::new();

    system.register("lonely", PartyBuilder::new("Rahool").build()).await;
    system.notifier.clear();

    let outcome = system.iterate().await;
    assert!(matches!(outcome, IterationOutcome::Partial { .. }));

    let progress = system
        .notifier
        .for_connection("lonely")
        .into_iter()
        .filter(|n| matches!(n, ClientNotification::UpdateProgress { current: 1, target: 3 }))
        .count();
    assert_eq!(progress, 1);

    // The searching status follows after the configured delay
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(system
        .notifier
        .for_connection("lonely")
        .iter()
        .any(|n| matches!(n, ClientNotification::UpdateStatus { .. })));
}

#[tokio::test]
async fn test_concurrent_claims_have_one_winner() {
    let system = TestSystem::new();
    let entry = WaitEntry::new(
        "contested",
        PartyBuilder::new("Eververse").build(),
        current_timestamp(),
    );
    assert!(system.store.create(entry, false).await.unwrap());

    let claims = (0..16).map(|_| system.store.delete_by_id("contested"));
    let results = join_all(claims).await;

    let winners = results
        .into_iter()
        .filter(|result| matches!(result, Ok(true)))
        .count();
    assert_eq!(winners, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_withdrawal_racing_the_processor_is_exclusive() {
    for round in 0..20 {
        let mut system = TestSystem::new();

        system.register("a", PartyBuilder::new("Banshee").build()).await;
        system.register("b", PartyBuilder::new("Tess").build()).await;
        system.register("c", PartyBuilder::new("Holliday").build()).await;

        let registration = system.registration.clone();
        let withdrawal = tokio::spawn(async move { registration.unregister("b").await });
        let outcome = system.iterate().await;
        let withdrawn = withdrawal.await.unwrap().unwrap();

        let matched = system.match_for("b").is_some();
        assert!(
            withdrawn != matched,
            "round {}: withdrawn={}, matched={}, outcome={:?}",
            round,
            withdrawn,
            matched,
            outcome
        );
    }
}

#[tokio::test]
async fn test_rejected_registration_leaves_no_entry() {
    let system = TestSystem::new();

    let accepted = system
        .registration
        .register(
            "too-big",
            &ClientInfo::web("1.0"),
            PartyBuilder::new("Oryx").size(3).build(),
        )
        .await;

    assert!(!accepted);
    assert!(system.store.get_by_id("too-big").await.unwrap().is_none());
    assert_eq!(system.notifier.count_kind("display_error"), 1);
    assert_eq!(system.tracker.count("Matchmaking", "RegisterFail"), 1);
}

#[tokio::test]
async fn test_in_process_service_end_to_end() {
    let mut config = AppConfig::default();
    config.amqp.enabled = false;
    config.service.health_port = 18491;
    config.matchmaking.queue_sleep_min_ms = 10;
    config.matchmaking.queue_sleep_max_ms = 50;

    let app_state = Arc::new(AppState::new(config).await.unwrap());
    let hub = app_state.hub().unwrap();
    app_state.start().await.unwrap();

    let ids = ["p1", "p2", "p3"];
    let mut streams = Vec::new();
    for id in ids {
        streams.push(hub.connect(id).unwrap());
    }

    for (i, id) in ids.iter().enumerate() {
        app_state
            .handle_request(ClientRequest::Register {
                connection_id: id.to_string(),
                client: ClientInfo::web("1.0"),
                party: PartyBuilder::new(&format!("Guardian{}", i)).build(),
            })
            .await
            .unwrap();
    }

    for stream in streams.iter_mut() {
        let found = tokio::time::timeout(Duration::from_secs(5), async {
            while let Some(notification) = stream.next().await {
                if let ClientNotification::MatchFound { parties } = notification {
                    return parties;
                }
            }
            Vec::new()
        })
        .await
        .expect("match found before timeout");
        assert_eq!(found.len(), 3);
    }

    assert_eq!(app_state.time_to_match().sample_count(), 1);
    app_state.shutdown().await.unwrap();
}
