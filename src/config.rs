use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::aggregate::DEFAULT_ROLLING_WINDOW;
use crate::chunked::MAX_IDS_PER_DETAIL_REQUEST;
use crate::domain::Region;
use crate::error::ArenaError;
use crate::scanner::{MAX_IDS_PER_PAGE, ScanTarget};
use crate::source::SourceSettings;
use crate::sync::{FetchTuning, SyncPolicy};

pub const DEFAULT_CONFIG_FILE: &str = "arena-tracker.json";

/// On-disk config. Every field is optional.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub api_base: Option<String>,
    pub queue: Option<u32>,
    pub region: Option<Region>,
    pub cache_dir: Option<String>,
    pub staleness_hours: Option<u64>,
    pub match_count: Option<usize>,
    /// Fetch the whole history on first sync instead of `match_count` ids.
    pub full_history_on_first_sync: Option<bool>,
    pub full_refresh_cap: Option<usize>,
    pub page_more: Option<usize>,
    pub load_all_batch: Option<usize>,
    pub page_size: Option<usize>,
    pub page_delay_ms: Option<u64>,
    pub chunk_size: Option<usize>,
    pub chunk_delay_ms: Option<u64>,
    pub rolling_window: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub source: SourceSettings,
    pub cache_dir: Option<Utf8PathBuf>,
    pub policy: SyncPolicy,
    pub tuning: FetchTuning,
    pub rolling_window: usize,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            source: SourceSettings::default(),
            cache_dir: None,
            policy: SyncPolicy::default(),
            tuning: FetchTuning::default(),
            rolling_window: DEFAULT_ROLLING_WINDOW,
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads `path`, or `arena-tracker.json` in the working directory when it
    /// exists. Without either, defaults apply.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, ArenaError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| ArenaError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| ArenaError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, ArenaError> {
        let defaults = ResolvedConfig::default();

        let chunk_size = config.chunk_size.unwrap_or(defaults.tuning.chunk_size);
        if !(1..=MAX_IDS_PER_DETAIL_REQUEST).contains(&chunk_size) {
            return Err(ArenaError::InvalidConfig(format!(
                "chunk_size must be between 1 and {MAX_IDS_PER_DETAIL_REQUEST}, got {chunk_size}"
            )));
        }
        let page_size = config.page_size.unwrap_or(defaults.tuning.page_size);
        if !(1..=MAX_IDS_PER_PAGE).contains(&page_size) {
            return Err(ArenaError::InvalidConfig(format!(
                "page_size must be between 1 and {MAX_IDS_PER_PAGE}, got {page_size}"
            )));
        }
        let rolling_window = config.rolling_window.unwrap_or(defaults.rolling_window);
        if rolling_window == 0 {
            return Err(ArenaError::InvalidConfig(
                "rolling_window must be at least 1".to_string(),
            ));
        }
        let api_base = config
            .api_base
            .map(|base| base.trim().trim_end_matches('/').to_string())
            .unwrap_or(defaults.source.api_base);
        if !(api_base.starts_with("http://") || api_base.starts_with("https://")) {
            return Err(ArenaError::InvalidConfig(format!(
                "api_base must be an http(s) URL, got {api_base}"
            )));
        }

        let match_count = config
            .match_count
            .unwrap_or(defaults.policy.incremental_window);
        let initial_scan = if config.full_history_on_first_sync.unwrap_or(false) {
            ScanTarget::Unbounded
        } else {
            ScanTarget::Bounded(match_count)
        };
        let staleness = config
            .staleness_hours
            .map(|hours| Duration::from_secs(hours.saturating_mul(60 * 60)))
            .unwrap_or(defaults.policy.staleness);

        Ok(ResolvedConfig {
            source: SourceSettings {
                api_base,
                queue: config.queue.unwrap_or(defaults.source.queue),
                region: config.region,
            },
            cache_dir: config.cache_dir.map(Utf8PathBuf::from),
            policy: SyncPolicy {
                staleness,
                incremental_window: match_count,
                initial_scan,
                full_refresh_cap: config.full_refresh_cap,
                load_more_count: config.page_more.unwrap_or(defaults.policy.load_more_count),
                load_all_batch: config
                    .load_all_batch
                    .unwrap_or(defaults.policy.load_all_batch),
                load_all_pause: defaults.policy.load_all_pause,
            },
            tuning: FetchTuning {
                page_size,
                page_delay: config
                    .page_delay_ms
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.tuning.page_delay),
                chunk_size,
                chunk_delay: config
                    .chunk_delay_ms
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.tuning.chunk_delay),
            },
            rolling_window,
        })
    }
}
