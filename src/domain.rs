use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::ArenaError;

pub const MIN_PLACEMENT: u8 = 1;
pub const MAX_PLACEMENT: u8 = 8;

/// `Name#TAG` as typed by the user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RiotId {
    game_name: String,
    tag_line: String,
}

impl RiotId {
    pub fn game_name(&self) -> &str {
        &self.game_name
    }

    pub fn tag_line(&self) -> &str {
        &self.tag_line
    }
}

impl fmt::Display for RiotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.game_name, self.tag_line)
    }
}

impl FromStr for RiotId {
    type Err = ArenaError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let Some((name, tag)) = trimmed.split_once('#') else {
            return Err(ArenaError::InvalidRiotId(value.to_string()));
        };
        let name = name.trim();
        let tag = tag.trim();
        if name.is_empty() || tag.is_empty() || tag.contains('#') {
            return Err(ArenaError::InvalidRiotId(value.to_string()));
        }
        Ok(Self {
            game_name: name.to_string(),
            tag_line: tag.to_string(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    Americas,
    Europe,
    Asia,
    Sea,
}

impl Region {
    /// Routing value understood by the proxy.
    pub fn as_str(self) -> &'static str {
        match self {
            Region::Americas => "americas",
            Region::Europe => "europe",
            Region::Asia => "asia",
            Region::Sea => "sea",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Region::Americas => "NA",
            Region::Europe => "EUW",
            Region::Asia => "KR",
            Region::Sea => "OCE",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Region {
    type Err = ArenaError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "americas" | "na" | "br" | "lan" | "las" => Ok(Region::Americas),
            "europe" | "euw" | "eune" | "tr" | "ru" => Ok(Region::Europe),
            "asia" | "kr" | "jp" => Ok(Region::Asia),
            "sea" | "oce" | "sg" | "tw" | "vn" => Ok(Region::Sea),
            _ => Err(ArenaError::InvalidRegion(value.to_string())),
        }
    }
}

/// A resolved account. `key` is the provider's stable player id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub key: String,
    pub game_name: String,
    pub tag_line: String,
}

impl Identity {
    pub fn display(&self) -> String {
        format!("{}#{}", self.game_name, self.tag_line)
    }
}

/// One finished match from the tracked player's point of view.
///
/// Records are facts: once built by the source they are never modified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub match_id: String,
    pub game_start: i64,
    pub champion: String,
    #[serde(default)]
    pub placement: Option<u8>,
    #[serde(default)]
    pub kills: u32,
    #[serde(default)]
    pub deaths: u32,
    #[serde(default)]
    pub assists: u32,
    #[serde(default)]
    pub gold: Option<u64>,
    #[serde(default)]
    pub damage: Option<u64>,
    #[serde(default)]
    pub partner_key: Option<String>,
    #[serde(default)]
    pub partner_name: Option<String>,
}

impl MatchRecord {
    pub fn is_first(&self) -> bool {
        self.placement == Some(1)
    }

    pub fn kda(&self) -> String {
        format!("{}/{}/{}", self.kills, self.deaths, self.assists)
    }
}

/// Returns the placement if it falls inside the valid 1..=8 range.
pub fn valid_placement(value: i64) -> Option<u8> {
    if (i64::from(MIN_PLACEMENT)..=i64::from(MAX_PLACEMENT)).contains(&value) {
        u8::try_from(value).ok()
    } else {
        None
    }
}

/// Deduplicated matches for one player, newest first.
///
/// Only [`crate::store::merge`] builds non-empty sets, which keeps the
/// ordering and uniqueness invariants in one place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordSet {
    records: Vec<MatchRecord>,
}

impl RecordSet {
    pub(crate) fn from_sorted(records: Vec<MatchRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[MatchRecord] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MatchRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains_key(&self, match_id: &str) -> bool {
        self.records.iter().any(|record| record.match_id == match_id)
    }

    pub fn keys(&self) -> HashSet<&str> {
        self.records
            .iter()
            .map(|record| record.match_id.as_str())
            .collect()
    }

    pub fn newest(&self) -> Option<&MatchRecord> {
        self.records.first()
    }

    pub fn into_records(self) -> Vec<MatchRecord> {
        self.records
    }
}

impl<'a> IntoIterator for &'a RecordSet {
    type Item = &'a MatchRecord;
    type IntoIter = std::slice::Iter<'a, MatchRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Where the next "load more" scan resumes, and the newest id seen at the
/// last sync.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCursor {
    pub next_offset: usize,
    pub known_latest_key: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placement_range() {
        assert_eq!(valid_placement(1), Some(1));
        assert_eq!(valid_placement(8), Some(8));
        assert_eq!(valid_placement(0), None);
        assert_eq!(valid_placement(9), None);
        assert_eq!(valid_placement(-3), None);
    }
}
