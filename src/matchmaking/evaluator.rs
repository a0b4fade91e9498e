//! Candidate search and ranking
//!
//! Both halves are pure: `search` filters a pool snapshot down to entries that
//! could join the fireteam, `rank` orders them by preference. The store calls
//! back into `is_candidate` so the filter can be pushed down into the query.

use crate::matchmaking::fireteam::Fireteam;
use crate::types::{Language, WaitEntry, SCHEMA_VERSION};
use crate::utils::level_difference;
use std::cmp::Ordering;

/// Trait for candidate selection algorithms
pub trait MatchEvaluator: Send + Sync {
    /// Whether `entry` may join `fireteam` in its current state
    fn is_candidate(&self, entry: &WaitEntry, fireteam: &Fireteam) -> bool;

    /// Keep only the candidates in `pool`
    fn search(&self, pool: Vec<WaitEntry>, fireteam: &Fireteam) -> Vec<WaitEntry> {
        pool.into_iter()
            .filter(|entry| self.is_candidate(entry, fireteam))
            .collect()
    }

    /// Order candidates, most preferred first
    fn rank(&self, candidates: Vec<WaitEntry>, fireteam: &Fireteam) -> Vec<WaitEntry>;
}

/// Matches on platform, activity and language, then ranks by level proximity.
///
/// Ranking key, primary first:
/// - exact language before English fallback
/// - closest level to the fireteam average
/// - larger parties first
/// - longest waiting first
#[derive(Debug, Default, Clone)]
pub struct LevelBasedMatchEvaluator;

impl LevelBasedMatchEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Non-raid activities accept English speakers when no one shares the
    /// fireteam's language
    fn language_matches(entry: &WaitEntry, fireteam: &Fireteam) -> bool {
        entry.party.language == fireteam.language()
            || (!fireteam.activity().is_raid_tier() && entry.party.language == Language::English)
    }

    fn compare(a: &WaitEntry, b: &WaitEntry, fireteam: &Fireteam) -> Ordering {
        let average = fireteam.average_level();
        let fallback = |e: &WaitEntry| u8::from(e.party.language != fireteam.language());

        fallback(a)
            .cmp(&fallback(b))
            .then_with(|| {
                level_difference(a.party.level, average)
                    .total_cmp(&level_difference(b.party.level, average))
            })
            .then_with(|| b.party.party_size.cmp(&a.party.party_size))
            .then_with(|| a.registered_at.cmp(&b.registered_at))
    }
}

impl MatchEvaluator for LevelBasedMatchEvaluator {
    fn is_candidate(&self, entry: &WaitEntry, fireteam: &Fireteam) -> bool {
        entry.schema_version == SCHEMA_VERSION
            && Self::language_matches(entry, fireteam)
            && entry.party.platform == fireteam.platform()
            && entry.party.activity == fireteam.activity()
            && entry.party.party_size <= fireteam.remaining_capacity()
    }

    fn rank(&self, mut candidates: Vec<WaitEntry>, fireteam: &Fireteam) -> Vec<WaitEntry> {
        candidates.sort_by(|a, b| Self::compare(a, b, fireteam));
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Activity, Party, Platform};
    use chrono::{DateTime, TimeZone, Utc};
    use proptest::prelude::*;

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + seconds, 0).unwrap()
    }

    fn entry(
        id: &str,
        language: Language,
        activity: Activity,
        party_size: u32,
        level: u32,
        registered: i64,
    ) -> WaitEntry {
        WaitEntry::new(
            id,
            Party {
                language,
                platform: Platform::PS4,
                activity,
                party_size,
                username: format!("user_{}", id),
                level,
            },
            at(registered),
        )
    }

    fn ids(entries: &[WaitEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.id.as_str()).collect()
    }

    #[test]
    fn test_search_filters_platform_activity_and_capacity() {
        let evaluator = LevelBasedMatchEvaluator::new();
        let fireteam = Fireteam::new(entry("seed", Language::English, Activity::DailyStory, 1, 22, 0));

        let mut wrong_platform = entry("xbox", Language::English, Activity::DailyStory, 1, 22, 0);
        wrong_platform.party.platform = Platform::XboxOne;
        let mut stale = entry("stale", Language::English, Activity::DailyStory, 1, 22, 0);
        stale.schema_version = SCHEMA_VERSION - 1;

        let pool = vec![
            entry("ok", Language::English, Activity::DailyStory, 2, 22, 0),
            entry("too-big", Language::English, Activity::DailyStory, 3, 22, 0),
            entry("strike", Language::English, Activity::WeeklyStrike, 1, 22, 0),
            wrong_platform,
            stale,
        ];

        let found = evaluator.search(pool, &fireteam);
        assert_eq!(ids(&found), vec!["ok"]);
    }

    #[test]
    fn test_english_fallback_only_below_raid_tier() {
        let evaluator = LevelBasedMatchEvaluator::new();

        let strike = Fireteam::new(entry("seed", Language::German, Activity::WeeklyStrike, 1, 26, 0));
        let english = entry("en", Language::English, Activity::WeeklyStrike, 1, 26, 0);
        let french = entry("fr", Language::French, Activity::WeeklyStrike, 1, 26, 0);
        assert!(evaluator.is_candidate(&english, &strike));
        assert!(!evaluator.is_candidate(&french, &strike));

        let raid = Fireteam::new(entry("seed", Language::German, Activity::VaultOfGlass, 1, 26, 0));
        let english_raider = entry("en", Language::English, Activity::VaultOfGlass, 1, 26, 0);
        let german_raider = entry("de", Language::German, Activity::VaultOfGlass, 1, 26, 0);
        assert!(!evaluator.is_candidate(&english_raider, &raid));
        assert!(evaluator.is_candidate(&german_raider, &raid));
    }

    #[test]
    fn test_rank_prefers_exact_language() {
        let evaluator = LevelBasedMatchEvaluator::new();
        let fireteam = Fireteam::new(entry("seed", Language::Spanish, Activity::DailyStory, 1, 22, 0));

        let ranked = evaluator.rank(
            vec![
                entry("en-close", Language::English, Activity::DailyStory, 1, 22, 0),
                entry("es-far", Language::Spanish, Activity::DailyStory, 1, 30, 0),
            ],
            &fireteam,
        );
        assert_eq!(ids(&ranked), vec!["es-far", "en-close"]);
    }

    #[test]
    fn test_rank_ties_break_on_size_then_age() {
        let evaluator = LevelBasedMatchEvaluator::new();
        let fireteam = Fireteam::new(entry("seed", Language::English, Activity::VaultOfGlass, 1, 28, 0));

        let a = entry("A", Language::English, Activity::VaultOfGlass, 2, 28, 10);
        let b = entry("B", Language::English, Activity::VaultOfGlass, 3, 28, 5);
        let ranked = evaluator.rank(vec![a.clone(), b.clone()], &fireteam);
        assert_eq!(ids(&ranked), vec!["B", "A"]);

        let older = entry("older", Language::English, Activity::VaultOfGlass, 2, 28, 1);
        let ranked = evaluator.rank(vec![a, older], &fireteam);
        assert_eq!(ids(&ranked), vec!["older", "A"]);
    }

    #[test]
    fn test_rank_closest_level_beats_size() {
        let evaluator = LevelBasedMatchEvaluator::new();
        let fireteam = Fireteam::new(entry("seed", Language::English, Activity::DailyStory, 1, 22, 0));

        let c1 = entry("C1", Language::English, Activity::DailyStory, 2, 23, 100);
        let c2 = entry("C2", Language::English, Activity::DailyStory, 1, 20, 50);

        let found = evaluator.search(vec![c2, c1], &fireteam);
        assert_eq!(found.len(), 2);
        assert_eq!(ids(&evaluator.rank(found, &fireteam)), vec!["C1", "C2"]);
    }

    fn arb_entry() -> impl Strategy<Value = WaitEntry> {
        (
            prop_oneof![Just(Language::English), Just(Language::German), Just(Language::Korean)],
            prop_oneof![Just(Platform::PS4), Just(Platform::XboxOne)],
            prop_oneof![
                Just(Activity::DailyStory),
                Just(Activity::VaultOfGlass),
                Just(Activity::TrialsOfOsiris)
            ],
            1u32..=5,
            20u32..=32,
            0i64..10_000,
        )
            .prop_map(|(language, platform, activity, party_size, level, t)| {
                let mut e = entry("p", language, activity, party_size, level, t);
                e.party.platform = platform;
                e
            })
    }

    proptest! {
        #[test]
        fn prop_search_respects_capacity_platform_activity(
            seed in arb_entry(),
            pool in proptest::collection::vec(arb_entry(), 0..40),
        ) {
            let evaluator = LevelBasedMatchEvaluator::new();
            let fireteam = Fireteam::new(seed);

            for found in evaluator.search(pool, &fireteam) {
                prop_assert!(found.party.party_size <= fireteam.remaining_capacity());
                prop_assert_eq!(found.party.platform, fireteam.platform());
                prop_assert_eq!(found.party.activity, fireteam.activity());
            }
        }

        #[test]
        fn prop_rank_is_sorted_permutation(
            seed in arb_entry(),
            pool in proptest::collection::vec(arb_entry(), 0..40),
        ) {
            let evaluator = LevelBasedMatchEvaluator::new();
            let fireteam = Fireteam::new(seed);
            let ranked = evaluator.rank(pool.clone(), &fireteam);

            prop_assert_eq!(ranked.len(), pool.len());
            for pair in ranked.windows(2) {
                prop_assert_ne!(
                    LevelBasedMatchEvaluator::compare(&pair[0], &pair[1], &fireteam),
                    Ordering::Greater
                );
            }
        }
    }
}
