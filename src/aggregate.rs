//! Derived views over a record snapshot. Everything here is pure and
//! deterministic for identical input.

use std::collections::{BTreeMap, HashSet};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::domain::{MAX_PLACEMENT, MatchRecord};

/// Distinct champions a player needs a first place on.
pub const COMPLETION_GOAL: usize = 60;
pub const DEFAULT_ROLLING_WINDOW: usize = 10;
pub const DEFAULT_PARTNER_MIN_GAMES: usize = 5;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryProgress {
    pub category: String,
    pub attempts_so_far: usize,
    pub completed: bool,
    pub attempts_until_success: Option<usize>,
    pub completion_timestamp: Option<i64>,
}

/// Per champion: games played and the 1-based attempt of the first win.
/// Keyed by champion name, so iteration is lexicographic.
pub fn build_category_progress(records: &[MatchRecord]) -> BTreeMap<String, CategoryProgress> {
    let mut groups: BTreeMap<&str, Vec<&MatchRecord>> = BTreeMap::new();
    for record in records {
        groups.entry(record.champion.as_str()).or_default().push(record);
    }

    groups
        .into_iter()
        .map(|(category, mut list)| {
            list.sort_by_key(|record| record.game_start);
            let first_win = list.iter().position(|record| record.is_first());
            let progress = CategoryProgress {
                category: category.to_string(),
                attempts_so_far: list.len(),
                completed: first_win.is_some(),
                attempts_until_success: first_win.map(|index| index + 1),
                completion_timestamp: first_win.map(|index| list[index].game_start),
            };
            (category.to_string(), progress)
        })
        .collect()
}

/// Counts per placement 1..=8; index 0 holds firsts. Records without a
/// valid placement are skipped.
pub fn histogram<F>(records: &[MatchRecord], filter: F) -> [u32; MAX_PLACEMENT as usize]
where
    F: Fn(&MatchRecord) -> bool,
{
    let mut counts = [0u32; MAX_PLACEMENT as usize];
    for record in records.iter().filter(|record| filter(record)) {
        if let Some(place) = record.placement {
            if (1..=MAX_PLACEMENT).contains(&place) {
                counts[usize::from(place - 1)] += 1;
            }
        }
    }
    counts
}

pub fn placement_histogram(records: &[MatchRecord]) -> [u32; MAX_PLACEMENT as usize] {
    histogram(records, |_| true)
}

/// Trailing mean at each position. The window grows until it holds `window`
/// values; a zero window behaves as one.
pub fn rolling_average(values: &[u8], window: usize) -> Vec<f64> {
    let window = window.max(1);
    let mut out = Vec::with_capacity(values.len());
    let mut sum = 0u64;
    for (index, value) in values.iter().enumerate() {
        sum += u64::from(*value);
        if index >= window {
            sum -= u64::from(values[index - window]);
        }
        let len = (index + 1).min(window);
        out.push(sum as f64 / len as f64);
    }
    out
}

/// Rolling placement over the records, oldest game first.
pub fn rolling_placement(records: &[MatchRecord], window: usize) -> Vec<f64> {
    let mut ordered: Vec<&MatchRecord> = records.iter().collect();
    ordered.sort_by_key(|record| record.game_start);
    let placements: Vec<u8> = ordered.iter().filter_map(|record| record.placement).collect();
    rolling_average(&placements, window)
}

/// Completed champions that took the most attempts. Ties go to the
/// champion name in ascending order.
pub fn hardest_completions(
    progress: &BTreeMap<String, CategoryProgress>,
    limit: usize,
) -> Vec<CategoryProgress> {
    let mut completed: Vec<&CategoryProgress> = progress.values().filter(|p| p.completed).collect();
    completed.sort_by(|a, b| {
        b.attempts_until_success
            .cmp(&a.attempts_until_success)
            .then_with(|| a.category.cmp(&b.category))
    });
    completed.into_iter().take(limit).cloned().collect()
}

/// Completed champions in the order the first wins happened.
pub fn first_completions(progress: &BTreeMap<String, CategoryProgress>) -> Vec<CategoryProgress> {
    let mut done: Vec<&CategoryProgress> = progress.values().filter(|p| p.completed).collect();
    done.sort_by(|a, b| {
        a.completion_timestamp
            .cmp(&b.completion_timestamp)
            .then_with(|| a.category.cmp(&b.category))
    });
    done.into_iter().cloned().collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartnerStats {
    /// Partner id when known, otherwise the display name.
    pub key: String,
    pub name: Option<String>,
    pub games: usize,
    pub wins: usize,
    pub win_rate: f64,
    pub mean_rank: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartnerSort {
    Games,
    /// Only groups with at least `min_games` games, best win rate first.
    WinRate { min_games: usize },
}

pub fn partner_aggregate(records: &[MatchRecord], sort: PartnerSort) -> Vec<PartnerStats> {
    struct Acc {
        name: Option<String>,
        games: usize,
        wins: usize,
        rank_sum: u64,
        ranked: usize,
    }

    let mut groups: BTreeMap<String, Acc> = BTreeMap::new();
    for record in records {
        let Some(key) = record
            .partner_key
            .as_ref()
            .or(record.partner_name.as_ref())
            .cloned()
        else {
            continue;
        };
        let acc = groups.entry(key).or_insert(Acc {
            name: None,
            games: 0,
            wins: 0,
            rank_sum: 0,
            ranked: 0,
        });
        acc.games += 1;
        if record.is_first() {
            acc.wins += 1;
        }
        if let Some(place) = record.placement {
            acc.rank_sum += u64::from(place);
            acc.ranked += 1;
        }
        if acc.name.is_none() {
            acc.name = record.partner_name.clone();
        }
    }

    let mut stats: Vec<PartnerStats> = groups
        .into_iter()
        .map(|(key, acc)| PartnerStats {
            key,
            name: acc.name,
            games: acc.games,
            wins: acc.wins,
            win_rate: acc.wins as f64 / acc.games as f64,
            mean_rank: (acc.ranked > 0).then(|| acc.rank_sum as f64 / acc.ranked as f64),
        })
        .collect();

    match sort {
        PartnerSort::Games => {
            stats.sort_by(|a, b| b.games.cmp(&a.games).then_with(|| a.key.cmp(&b.key)));
        }
        PartnerSort::WinRate { min_games } => {
            stats.retain(|s| s.games >= min_games);
            stats.sort_by(|a, b| {
                b.win_rate
                    .total_cmp(&a.win_rate)
                    .then_with(|| b.games.cmp(&a.games))
                    .then_with(|| a.key.cmp(&b.key))
            });
        }
    }
    stats
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub total_games: usize,
    pub average_placement: Option<f64>,
    pub completed_categories: usize,
    pub completion_goal: usize,
    pub remaining_to_goal: usize,
}

/// Headline numbers. `progress` is the lifetime progress, which may cover
/// more records than `records` when a time range is applied.
pub fn summarize(
    records: &[MatchRecord],
    progress: &BTreeMap<String, CategoryProgress>,
) -> Summary {
    let placements: Vec<u8> = records.iter().filter_map(|r| r.placement).collect();
    let average_placement = (!placements.is_empty()).then(|| {
        placements.iter().map(|p| f64::from(*p)).sum::<f64>() / placements.len() as f64
    });
    let completed = progress.values().filter(|p| p.completed).count();
    Summary {
        total_games: records.len(),
        average_placement,
        completed_categories: completed,
        completion_goal: COMPLETION_GOAL,
        remaining_to_goal: COMPLETION_GOAL.saturating_sub(completed),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
pub enum TimeRange {
    #[default]
    #[value(name = "all")]
    #[serde(rename = "all")]
    All,
    #[value(name = "7d")]
    #[serde(rename = "7d")]
    Days7,
    #[value(name = "30d")]
    #[serde(rename = "30d")]
    Days30,
    #[value(name = "90d")]
    #[serde(rename = "90d")]
    Days90,
}

impl TimeRange {
    pub fn contains(self, game_start: i64, now_ms: i64) -> bool {
        let days = match self {
            TimeRange::All => return true,
            TimeRange::Days7 => 7,
            TimeRange::Days30 => 30,
            TimeRange::Days90 => 90,
        };
        game_start >= now_ms - days * DAY_MS
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ViewFilter {
    #[default]
    All,
    Top3,
    Firsts,
    /// Champions without a first place yet.
    InProgress,
}

/// Applies the time range, then the view filter. Output keeps newest first.
pub fn filter_records(
    records: &[MatchRecord],
    range: TimeRange,
    view: ViewFilter,
    progress: &BTreeMap<String, CategoryProgress>,
    now_ms: i64,
) -> Vec<MatchRecord> {
    let trying: HashSet<&str> = progress
        .values()
        .filter(|p| !p.completed)
        .map(|p| p.category.as_str())
        .collect();

    let mut out: Vec<MatchRecord> = records
        .iter()
        .filter(|record| range.contains(record.game_start, now_ms))
        .filter(|record| match view {
            ViewFilter::All => true,
            ViewFilter::Top3 => matches!(record.placement, Some(place) if place <= 3),
            ViewFilter::Firsts => record.is_first(),
            ViewFilter::InProgress => trying.contains(record.champion.as_str()),
        })
        .cloned()
        .collect();
    out.sort_by(|a, b| b.game_start.cmp(&a.game_start));
    out
}

/// Everything the stats views show, computed once per snapshot. Lifetime
/// progress feeds the view filter and the completion counts; the rest
/// follows the selected range and view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsReport {
    pub range: TimeRange,
    pub view: ViewFilter,
    pub summary: Summary,
    pub histogram: [u32; MAX_PLACEMENT as usize],
    pub rolling_average: Vec<f64>,
    pub hardest: Vec<CategoryProgress>,
    pub firsts: Vec<CategoryProgress>,
    pub partners: Vec<PartnerStats>,
    pub matches: Vec<MatchRecord>,
}

pub fn build_report(
    records: &[MatchRecord],
    range: TimeRange,
    view: ViewFilter,
    window: usize,
    now_ms: i64,
) -> StatsReport {
    let lifetime = build_category_progress(records);
    let matches = filter_records(records, range, view, &lifetime, now_ms);
    StatsReport {
        range,
        view,
        summary: summarize(&matches, &lifetime),
        histogram: placement_histogram(&matches),
        rolling_average: rolling_placement(&matches, window),
        hardest: hardest_completions(&lifetime, 10),
        firsts: first_completions(&lifetime),
        partners: partner_aggregate(
            &matches,
            PartnerSort::WinRate {
                min_games: DEFAULT_PARTNER_MIN_GAMES,
            },
        ),
        matches,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, champion: &str, start: i64, placement: Option<u8>) -> MatchRecord {
        MatchRecord {
            match_id: id.to_string(),
            game_start: start,
            champion: champion.to_string(),
            placement,
            kills: 0,
            deaths: 0,
            assists: 0,
            gold: None,
            damage: None,
            partner_key: None,
            partner_name: None,
        }
    }

    #[test]
    fn progress_uses_chronological_order() {
        let records = vec![
            record("c", "X", 300, Some(1)),
            record("a", "X", 100, Some(5)),
            record("b", "X", 200, Some(1)),
        ];
        let progress = build_category_progress(&records);
        let x = &progress["X"];
        assert!(x.completed);
        assert_eq!(x.attempts_until_success, Some(2));
        assert_eq!(x.completion_timestamp, Some(200));
        assert_eq!(x.attempts_so_far, 3);
    }

    #[test]
    fn rolling_window_grows_then_slides() {
        let avg = rolling_average(&[4, 2, 6, 8], 2);
        assert_eq!(avg, vec![4.0, 3.0, 4.0, 7.0]);

        let short = rolling_average(&[3, 5], 10);
        assert_eq!(short, vec![3.0, 4.0]);
        assert_eq!(rolling_average(&[7], 0), vec![7.0]);
        assert!(rolling_average(&[], 5).is_empty());
    }

    #[test]
    fn histogram_ignores_missing_placements() {
        let records = vec![
            record("a", "X", 1, Some(1)),
            record("b", "X", 2, None),
            record("c", "Y", 3, Some(8)),
        ];
        let counts = placement_histogram(&records);
        assert_eq!(counts[0], 1);
        assert_eq!(counts[7], 1);
        assert_eq!(counts.iter().sum::<u32>(), 2);

        let only_y = histogram(&records, |r| r.champion == "Y");
        assert_eq!(only_y.iter().sum::<u32>(), 1);
    }

    #[test]
    fn hardest_ties_break_by_name() {
        let records = vec![
            record("1", "Zed", 1, Some(3)),
            record("2", "Zed", 2, Some(1)),
            record("3", "Ahri", 1, Some(4)),
            record("4", "Ahri", 2, Some(1)),
            record("5", "Lux", 1, Some(1)),
        ];
        let progress = build_category_progress(&records);
        let hardest = hardest_completions(&progress, 10);
        let names: Vec<&str> = hardest.iter().map(|p| p.category.as_str()).collect();
        assert_eq!(names, vec!["Ahri", "Zed", "Lux"]);
        assert_eq!(hardest_completions(&progress, 1).len(), 1);
    }

    #[test]
    fn time_range_bounds() {
        let now = 100 * DAY_MS;
        assert!(TimeRange::Days7.contains(now - 7 * DAY_MS, now));
        assert!(!TimeRange::Days7.contains(now - 7 * DAY_MS - 1, now));
        assert!(TimeRange::All.contains(0, now));
    }
}
