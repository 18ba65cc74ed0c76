use reqwest::Url;
use serde_json::Value;
use tracing::{debug, warn};

use crate::domain::{Identity, MatchRecord, Region, RiotId, valid_placement};
use crate::error::ArenaError;
use crate::fetcher::{HttpTransport, RateLimitedFetcher, Sleeper};

pub const DEFAULT_API_BASE: &str = "https://arenaproxy.irenasthat.workers.dev";
pub const ARENA_QUEUE: u32 = 1700;

/// Remote match history, newest first.
pub trait MatchSource: Send + Sync {
    fn resolve_identity(&self, riot_id: &RiotId) -> Result<Identity, ArenaError>;

    fn list_match_ids(
        &self,
        identity_key: &str,
        offset: usize,
        count: usize,
    ) -> Result<Vec<String>, ArenaError>;

    fn fetch_matches(
        &self,
        identity_key: &str,
        ids: &[String],
    ) -> Result<Vec<MatchRecord>, ArenaError>;

    /// Full provider payload for one match, used for drill-down views.
    fn fetch_match(&self, match_id: &str) -> Result<Value, ArenaError>;
}

impl<M: MatchSource + ?Sized> MatchSource for &M {
    fn resolve_identity(&self, riot_id: &RiotId) -> Result<Identity, ArenaError> {
        (**self).resolve_identity(riot_id)
    }

    fn list_match_ids(
        &self,
        identity_key: &str,
        offset: usize,
        count: usize,
    ) -> Result<Vec<String>, ArenaError> {
        (**self).list_match_ids(identity_key, offset, count)
    }

    fn fetch_matches(
        &self,
        identity_key: &str,
        ids: &[String],
    ) -> Result<Vec<MatchRecord>, ArenaError> {
        (**self).fetch_matches(identity_key, ids)
    }

    fn fetch_match(&self, match_id: &str) -> Result<Value, ArenaError> {
        (**self).fetch_match(match_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSettings {
    pub api_base: String,
    pub queue: u32,
    pub region: Option<Region>,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            queue: ARENA_QUEUE,
            region: None,
        }
    }
}

/// Talks to the proxy in front of the match provider.
pub struct HttpMatchSource<T: HttpTransport, S: Sleeper> {
    fetcher: RateLimitedFetcher<T, S>,
    settings: SourceSettings,
}

impl<T: HttpTransport, S: Sleeper> HttpMatchSource<T, S> {
    pub fn new(fetcher: RateLimitedFetcher<T, S>, settings: SourceSettings) -> Self {
        Self { fetcher, settings }
    }

    pub fn settings(&self) -> &SourceSettings {
        &self.settings
    }

    fn url(&self, path: &str, params: &[(&str, String)]) -> Result<String, ArenaError> {
        let base = self.settings.api_base.trim_end_matches('/');
        let mut pairs: Vec<(&str, String)> = params.to_vec();
        if let Some(region) = self.settings.region {
            pairs.push(("region", region.as_str().to_string()));
        }
        Url::parse_with_params(&format!("{base}/{path}"), pairs)
            .map(String::from)
            .map_err(|err| ArenaError::InvalidConfig(format!("api base {base}: {err}")))
    }
}

impl<T: HttpTransport, S: Sleeper> MatchSource for HttpMatchSource<T, S> {
    fn resolve_identity(&self, riot_id: &RiotId) -> Result<Identity, ArenaError> {
        let url = self.url(
            "account",
            &[
                ("gameName", riot_id.game_name().to_string()),
                ("tagLine", riot_id.tag_line().to_string()),
            ],
        )?;
        let raw = match self.fetcher.request_json(&url) {
            Ok(raw) => raw,
            Err(ArenaError::RequestFailed { status: 404, .. }) => {
                return Err(ArenaError::IdentityNotFound(riot_id.to_string()));
            }
            Err(err) => return Err(err),
        };
        let key = str_field(&raw, "puuid")
            .ok_or_else(|| ArenaError::IdentityNotFound(riot_id.to_string()))?;
        Ok(Identity {
            key,
            game_name: str_field(&raw, "gameName")
                .unwrap_or_else(|| riot_id.game_name().to_string()),
            tag_line: str_field(&raw, "tagLine").unwrap_or_else(|| riot_id.tag_line().to_string()),
        })
    }

    fn list_match_ids(
        &self,
        identity_key: &str,
        offset: usize,
        count: usize,
    ) -> Result<Vec<String>, ArenaError> {
        let url = self.url(
            "match-ids",
            &[
                ("puuid", identity_key.to_string()),
                ("queue", self.settings.queue.to_string()),
                ("start", offset.to_string()),
                ("count", count.to_string()),
            ],
        )?;
        let raw = self.fetcher.request_json(&url)?;
        let items = raw
            .as_array()
            .ok_or_else(|| ArenaError::Decode("match id listing is not an array".to_string()))?;
        Ok(items
            .iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect())
    }

    fn fetch_matches(
        &self,
        identity_key: &str,
        ids: &[String],
    ) -> Result<Vec<MatchRecord>, ArenaError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let url = self.url(
            "matches",
            &[
                ("ids", ids.join(",")),
                ("puuid", identity_key.to_string()),
            ],
        )?;
        let raw = self.fetcher.request_json(&url)?;
        let items = raw
            .as_array()
            .ok_or_else(|| ArenaError::Decode("match detail batch is not an array".to_string()))?;
        let records = items
            .iter()
            .filter_map(|item| {
                let record = normalize_record(item, identity_key);
                if record.is_none() {
                    warn!("dropping match payload without id or start time");
                }
                record
            })
            .collect::<Vec<_>>();
        debug!(requested = ids.len(), received = records.len(), "match details");
        Ok(records)
    }

    fn fetch_match(&self, match_id: &str) -> Result<Value, ArenaError> {
        let url = self.url("match", &[("id", match_id.to_string())])?;
        self.fetcher.request_json(&url)
    }
}

/// Builds the canonical record from either payload shape the proxy returns:
/// its own flattened summary, or the provider's full match document.
pub fn normalize_record(raw: &Value, identity_key: &str) -> Option<MatchRecord> {
    match raw.get("info") {
        Some(info) if info.get("participants").is_some() => {
            normalize_full(raw, info, identity_key)
        }
        _ => normalize_summary(raw),
    }
}

fn normalize_summary(raw: &Value) -> Option<MatchRecord> {
    let match_id = str_field(raw, "matchId")?;
    let game_start = int_field(raw, "gameStart").or_else(|| int_field(raw, "gameStartTimestamp"))?;
    Some(MatchRecord {
        match_id,
        game_start,
        champion: str_field(raw, "championName").unwrap_or_else(|| "Unknown".to_string()),
        placement: participant_placement(raw),
        kills: count_field(raw, "kills"),
        deaths: count_field(raw, "deaths"),
        assists: count_field(raw, "assists"),
        gold: unsigned_field(raw, "goldEarned").or_else(|| unsigned_field(raw, "gold")),
        damage: unsigned_field(raw, "totalDamageDealtToChampions")
            .or_else(|| unsigned_field(raw, "damage")),
        partner_key: str_field(raw, "partnerPuuid"),
        partner_name: str_field(raw, "partnerName"),
    })
}

fn normalize_full(raw: &Value, info: &Value, identity_key: &str) -> Option<MatchRecord> {
    let match_id = raw
        .get("metadata")
        .and_then(|meta| str_field(meta, "matchId"))?;
    let game_start =
        int_field(info, "gameStartTimestamp").or_else(|| int_field(info, "gameCreation"))?;
    let participants = info.get("participants").and_then(Value::as_array)?;
    let me = participants
        .iter()
        .find(|p| p.get("puuid").and_then(Value::as_str) == Some(identity_key))?;

    let placement = participant_placement(me);
    let partner = find_partner(participants, me, identity_key);

    Some(MatchRecord {
        match_id,
        game_start,
        champion: str_field(me, "championName").unwrap_or_else(|| "Unknown".to_string()),
        placement,
        kills: count_field(me, "kills"),
        deaths: count_field(me, "deaths"),
        assists: count_field(me, "assists"),
        gold: unsigned_field(me, "goldEarned"),
        damage: unsigned_field(me, "totalDamageDealtToChampions"),
        partner_key: partner.and_then(|p| str_field(p, "puuid")),
        partner_name: partner.map(participant_name),
    })
}

fn find_partner<'a>(
    participants: &'a [Value],
    me: &Value,
    identity_key: &str,
) -> Option<&'a Value> {
    let mut others = participants
        .iter()
        .filter(|p| p.get("puuid").and_then(Value::as_str) != Some(identity_key));

    if let Some(team) = int_field(me, "playerSubteamId") {
        let same_team = others
            .clone()
            .find(|p| int_field(p, "playerSubteamId") == Some(team));
        if same_team.is_some() {
            return same_team;
        }
    }

    let placement = participant_placement(me)?;
    others.find(|p| participant_placement(p) == Some(placement))
}

fn participant_placement(value: &Value) -> Option<u8> {
    int_field(value, "placement")
        .or_else(|| {
            value
                .get("challenges")
                .and_then(|c| int_field(c, "arenaPlacement"))
        })
        .and_then(valid_placement)
}

fn participant_name(value: &Value) -> String {
    let game_name = str_field(value, "riotIdGameName");
    let tag = str_field(value, "riotIdTagline").or_else(|| str_field(value, "riotIdTagLine"));
    match (game_name, tag) {
        (Some(name), Some(tag)) => format!("{name}#{tag}"),
        _ => str_field(value, "summonerName").unwrap_or_else(|| "Unknown".to_string()),
    }
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn int_field(value: &Value, key: &str) -> Option<i64> {
    let field = value.get(key)?;
    field
        .as_i64()
        .or_else(|| field.as_f64().map(|v| v as i64))
        .or_else(|| field.as_str().and_then(|s| s.trim().parse().ok()))
}

fn unsigned_field(value: &Value, key: &str) -> Option<u64> {
    int_field(value, key).and_then(|v| u64::try_from(v).ok())
}

fn count_field(value: &Value, key: &str) -> u32 {
    int_field(value, key)
        .and_then(|v| u32::try_from(v).ok())
        .unwrap_or(0)
}
