//! The group under construction during one queue iteration

use crate::types::{Activity, ConnectionId, Language, Party, Platform, WaitEntry};

/// In-memory accumulator of claimed wait entries.
///
/// The seed fixes language, platform, activity and the target size. Members are
/// kept in acceptance order and the total party size never exceeds the target.
#[derive(Debug, Clone)]
pub struct Fireteam {
    members: Vec<WaitEntry>,
    language: Language,
    platform: Platform,
    activity: Activity,
    target_size: u32,
}

impl Fireteam {
    /// Start a fireteam from the claimed seed entry
    pub fn new(seed: WaitEntry) -> Self {
        let language = seed.party.language;
        let platform = seed.party.platform;
        let activity = seed.party.activity;

        Self {
            members: vec![seed],
            language,
            platform,
            activity,
            target_size: activity.users_needed(),
        }
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn activity(&self) -> Activity {
        self.activity
    }

    pub fn target_size(&self) -> u32 {
        self.target_size
    }

    /// The entry that started this fireteam
    pub fn seed(&self) -> &WaitEntry {
        &self.members[0]
    }

    pub fn members(&self) -> &[WaitEntry] {
        &self.members
    }

    pub fn into_members(self) -> Vec<WaitEntry> {
        self.members
    }

    pub fn member_ids(&self) -> Vec<ConnectionId> {
        self.members.iter().map(|m| m.id.clone()).collect()
    }

    pub fn parties(&self) -> Vec<Party> {
        self.members.iter().map(|m| m.party.clone()).collect()
    }

    /// Sum of the members' party sizes
    pub fn total_party_size(&self) -> u32 {
        self.members.iter().map(|m| m.party.party_size).sum()
    }

    /// Mean of the members' levels
    pub fn average_level(&self) -> f64 {
        let total: u32 = self.members.iter().map(|m| m.party.level).sum();
        total as f64 / self.members.len() as f64
    }

    pub fn remaining_capacity(&self) -> u32 {
        self.target_size.saturating_sub(self.total_party_size())
    }

    pub fn is_full(&self) -> bool {
        self.total_party_size() == self.target_size
    }

    /// Whether `party_size` more players still fit
    pub fn fits(&self, party_size: u32) -> bool {
        self.total_party_size() + party_size <= self.target_size
    }

    /// Append a claimed entry. Hands the entry back if it would overflow.
    pub fn try_add(&mut self, entry: WaitEntry) -> Result<(), WaitEntry> {
        if !self.fits(entry.party.party_size) {
            return Err(entry);
        }
        self.members.push(entry);
        Ok(())
    }
}
