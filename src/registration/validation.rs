//! Submission checks run before a party may enter the pool

use crate::error::{MatchmakingError, Result};
use crate::types::{Activity, Party};
use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};

pub const MIN_PARTY_SIZE: u32 = 1;
pub const MAX_PARTY_SIZE: u32 = 5;
pub const MIN_LEVEL: u32 = 20;
pub const MAX_LEVEL: u32 = 32;
pub const MAX_USERNAME_LEN: usize = 16;

/// How far below the recommended level a party may still queue
pub const LEVEL_TOLERANCE: u32 = 3;

/// Identity a client presents when connecting
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub client: Option<String>,
    pub version: Option<String>,
}

impl ClientInfo {
    pub fn new(client: impl Into<String>, version: Option<String>) -> Self {
        Self {
            client: Some(client.into()),
            version,
        }
    }

    /// The first-party browser client
    pub fn web(version: impl Into<String>) -> Self {
        Self::new("web", Some(version.into()))
    }
}

/// Which clients may connect
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientPolicy {
    /// Version the web client must report; `None` accepts any
    pub web_client_version: Option<String>,
    pub blocked_clients: Vec<String>,
}

/// Reject missing, outdated or blocked clients
pub fn validate_client(info: &ClientInfo, policy: &ClientPolicy) -> Result<()> {
    let client = match info.client.as_deref().map(str::trim) {
        Some(client) if !client.is_empty() => client,
        _ => return Err(MatchmakingError::validation("Missing client parameter").into()),
    };

    if client == "web" {
        if let Some(expected) = &policy.web_client_version {
            if info.version.as_deref() != Some(expected.as_str()) {
                return Err(MatchmakingError::validation(
                    "Firetea.ms has been updated, please refresh the page.",
                )
                .into());
            }
        }
    }

    if policy.blocked_clients.iter().any(|blocked| blocked == client) {
        return Err(MatchmakingError::validation(
            "Sorry, this app has been blocked for violating the Firetea.ms API Terms of Use.",
        )
        .into());
    }

    Ok(())
}

/// Check a submitted party against the field ranges and the activity rules.
/// `now` drives the Trials of Osiris window.
pub fn validate_party(party: &Party, now: DateTime<Utc>) -> Result<()> {
    if party.username.is_empty() {
        return Err(MatchmakingError::validation("Username is required").into());
    }

    if !(MIN_PARTY_SIZE..=MAX_PARTY_SIZE).contains(&party.party_size) {
        return Err(MatchmakingError::validation(format!(
            "Party Size must be between {} and {}",
            MIN_PARTY_SIZE, MAX_PARTY_SIZE
        ))
        .into());
    }

    if !is_valid_username(&party.username) {
        return Err(MatchmakingError::validation(
            "Username must start with a letter and be at most 16 characters",
        )
        .into());
    }

    if !(MIN_LEVEL..=MAX_LEVEL).contains(&party.level) {
        return Err(MatchmakingError::validation(format!(
            "Level must be between {} and {}",
            MIN_LEVEL, MAX_LEVEL
        ))
        .into());
    }

    if party.activity == Activity::TrialsOfOsiris && !trials_open(now) {
        return Err(
            MatchmakingError::validation("The Trials of Osiris are not currently open").into(),
        );
    }

    if party.party_size >= party.activity.users_needed() {
        return Err(
            MatchmakingError::validation("Party size is too large for this activity").into(),
        );
    }

    if party.level + LEVEL_TOLERANCE < party.activity.recommended_level() {
        return Err(MatchmakingError::validation("Level is too low for this activity").into());
    }

    Ok(())
}

/// A letter followed by up to 15 word characters, hyphens or spaces
pub fn is_valid_username(username: &str) -> bool {
    let mut chars = username.chars();
    let Some(first) = chars.next() else {
        return false;
    };

    first.is_ascii_alphabetic()
        && username.chars().count() <= MAX_USERNAME_LEN
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == ' ')
}

/// Trials run from Friday 17:00 UTC until Tuesday 09:00 UTC
pub fn trials_open(now: DateTime<Utc>) -> bool {
    match now.weekday() {
        Weekday::Wed | Weekday::Thu => false,
        Weekday::Tue => now.hour() < 9,
        Weekday::Fri => now.hour() >= 17,
        _ => true,
    }
}
