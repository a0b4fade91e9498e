//! Common types used throughout the matchmaking engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Current wait entry format. Bump whenever the meaning of any field changes so
/// stale entries can be found and purged.
pub const SCHEMA_VERSION: u32 = 3;

/// Identifier of a connected client; also the id of its wait entry
pub type ConnectionId = String;

/// Language spoken by a party
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    English,
    Danish,
    German,
    Spanish,
    French,
    Italian,
    Dutch,
    Norwegian,
    Polish,
    Portuguese,
    Russian,
    Finnish,
    Swedish,
    Turkish,
    Arabic,
    Japanese,
    Korean,
    Chinese,
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Language::English => "English",
            Language::Danish => "Dansk",
            Language::German => "Deutsch",
            Language::Spanish => "Español",
            Language::French => "Français",
            Language::Italian => "Italiano",
            Language::Dutch => "Nederlands",
            Language::Norwegian => "Norsk",
            Language::Polish => "Polski",
            Language::Portuguese => "Português",
            Language::Russian => "Русский",
            Language::Finnish => "Suomi",
            Language::Swedish => "Svenska",
            Language::Turkish => "Türkçe",
            Language::Arabic => "العربية",
            Language::Japanese => "日本語",
            Language::Korean => "한국어",
            Language::Chinese => "普通话",
        };
        write!(f, "{}", name)
    }
}

/// Console the party plays on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    PS3,
    PS4,
    Xbox360,
    XboxOne,
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Platform::PS3 => write!(f, "PlayStation 3"),
            Platform::PS4 => write!(f, "PlayStation 4"),
            Platform::Xbox360 => write!(f, "Xbox 360"),
            Platform::XboxOne => write!(f, "Xbox One"),
        }
    }
}

/// Activity a party wants to play. Variant order matters: everything from
/// `VaultOfGlass` onwards is raid tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Activity {
    DailyStory,
    WeeklyStrike,
    WeeklyNightfall,
    VaultOfGlass,
    VaultOfGlassHard,
    CrotasEnd,
    CrotasEndHard,
    PrisonOfEldersMed,
    PrisonOfEldersHard,
    PrisonOfEldersSkolas,
    TrialsOfOsiris,
}

impl Activity {
    /// Number of players needed to start the activity
    pub fn users_needed(&self) -> u32 {
        match self {
            Activity::VaultOfGlass
            | Activity::VaultOfGlassHard
            | Activity::CrotasEnd
            | Activity::CrotasEndHard => 6,
            _ => 3,
        }
    }

    /// Recommended light level for the activity
    pub fn recommended_level(&self) -> u32 {
        match self {
            Activity::DailyStory => 22,
            Activity::WeeklyStrike => 26,
            Activity::WeeklyNightfall => 32,
            Activity::VaultOfGlass => 26,
            Activity::VaultOfGlassHard => 30,
            Activity::CrotasEnd => 30,
            Activity::CrotasEndHard => 32,
            Activity::PrisonOfEldersMed => 32,
            Activity::PrisonOfEldersHard => 34,
            Activity::PrisonOfEldersSkolas => 35,
            Activity::TrialsOfOsiris => 34,
        }
    }

    /// Raid tier activities never fall back to English speakers
    pub fn is_raid_tier(&self) -> bool {
        *self >= Activity::VaultOfGlass
    }

    /// Stable snake_case name for metric labels
    pub fn code(&self) -> &'static str {
        match self {
            Activity::DailyStory => "daily_story",
            Activity::WeeklyStrike => "weekly_strike",
            Activity::WeeklyNightfall => "weekly_nightfall",
            Activity::VaultOfGlass => "vault_of_glass",
            Activity::VaultOfGlassHard => "vault_of_glass_hard",
            Activity::CrotasEnd => "crotas_end",
            Activity::CrotasEndHard => "crotas_end_hard",
            Activity::PrisonOfEldersMed => "prison_of_elders_32",
            Activity::PrisonOfEldersHard => "prison_of_elders_34",
            Activity::PrisonOfEldersSkolas => "prison_of_elders_35",
            Activity::TrialsOfOsiris => "trials_of_osiris",
        }
    }
}

impl std::fmt::Display for Activity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Activity::DailyStory => "Daily Heroic Story",
            Activity::WeeklyStrike => "Weekly Heroic Strike",
            Activity::WeeklyNightfall => "Weekly Nightfall",
            Activity::VaultOfGlass => "Vault of Glass (Normal)",
            Activity::VaultOfGlassHard => "Vault of Glass (Hard)",
            Activity::CrotasEnd => "Crota's End (Normal)",
            Activity::CrotasEndHard => "Crota's End (Hard)",
            Activity::PrisonOfEldersMed => "Prison of Elders (Level 32)",
            Activity::PrisonOfEldersHard => "Prison of Elders (Level 34)",
            Activity::PrisonOfEldersSkolas => "Prison of Elders (Level 35)",
            Activity::TrialsOfOsiris => "Trials of Osiris",
        };
        write!(f, "{}", name)
    }
}

/// A match request submitted by one client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    pub language: Language,
    pub platform: Platform,
    pub activity: Activity,
    pub party_size: u32,
    pub username: String,
    pub level: u32,
}

/// A party waiting in the store to be matched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitEntry {
    pub id: ConnectionId,
    pub party: Party,
    pub registered_at: DateTime<Utc>,
    pub schema_version: u32,
}

impl WaitEntry {
    /// Create an entry in the current schema
    pub fn new(id: impl Into<ConnectionId>, party: Party, registered_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            party,
            registered_at,
            schema_version: SCHEMA_VERSION,
        }
    }

    /// Fresh copy for re-insertion: same id, party and registration time
    pub fn renewed(&self) -> Self {
        Self::new(self.id.clone(), self.party.clone(), self.registered_at)
    }

    /// How long this entry has been waiting at `now`
    pub fn wait_duration(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.registered_at)
            .to_std()
            .unwrap_or_default()
    }

    pub fn is_stale(&self) -> bool {
        self.schema_version < SCHEMA_VERSION
    }
}

/// A message taken from the work queue, naming the entry to process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub message_id: String,
    pub entry_id: ConnectionId,
    pub dequeue_count: u32,
    pub inserted_at: DateTime<Utc>,
}
