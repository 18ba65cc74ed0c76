use arena_tracker::aggregate::{
    COMPLETION_GOAL, PartnerSort, TimeRange, ViewFilter, build_category_progress, build_report,
    first_completions, filter_records, hardest_completions, histogram, partner_aggregate,
    placement_histogram, rolling_average, rolling_placement, summarize,
};
use arena_tracker::domain::MatchRecord;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

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

fn with_partner(mut record: MatchRecord, key: Option<&str>, name: Option<&str>) -> MatchRecord {
    record.partner_key = key.map(str::to_string);
    record.partner_name = name.map(str::to_string);
    record
}

fn ashe_and_lux() -> Vec<MatchRecord> {
    vec![
        record("l2", "Lux", 2, Some(5)),
        record("a3", "Ashe", 3, Some(2)),
        record("a2", "Ashe", 2, Some(1)),
        record("l1", "Lux", 1, Some(4)),
        record("a1", "Ashe", 1, Some(3)),
    ]
}

#[test]
fn ashe_and_lux_end_to_end() {
    let records = ashe_and_lux();
    let progress = build_category_progress(&records);

    let ashe = &progress["Ashe"];
    assert!(ashe.completed);
    assert_eq!(ashe.attempts_until_success, Some(2));
    assert_eq!(ashe.attempts_so_far, 3);
    let lux = &progress["Lux"];
    assert!(!lux.completed);
    assert_eq!(lux.attempts_until_success, None);
    assert_eq!(lux.completion_timestamp, None);

    let hardest = hardest_completions(&progress, 10);
    assert_eq!(hardest.len(), 1);
    assert_eq!(hardest[0].category, "Ashe");

    assert_eq!(placement_histogram(&records), [1, 1, 1, 1, 1, 0, 0, 0]);
}

#[test]
fn progress_is_deterministic_for_shuffled_input() {
    let forward = vec![
        record("x1", "X", 1, Some(5)),
        record("x2", "X", 2, Some(1)),
        record("x3", "X", 3, Some(1)),
    ];
    let mut backward = forward.clone();
    backward.reverse();

    let a = build_category_progress(&forward);
    let b = build_category_progress(&backward);
    assert_eq!(a, b);
    assert_eq!(a["X"].attempts_until_success, Some(2));
    assert_eq!(a["X"].completion_timestamp, Some(2));
}

#[test]
fn histogram_counts_only_valid_placements() {
    let mut records = ashe_and_lux();
    records.push(record("n", "Zed", 9, None));
    let counts = placement_histogram(&records);
    let valid = records.iter().filter(|r| r.placement.is_some()).count();
    assert_eq!(counts.iter().sum::<u32>() as usize, valid);

    let ashe_only = histogram(&records, |r| r.champion == "Ashe");
    assert_eq!(ashe_only, [1, 1, 1, 0, 0, 0, 0, 0]);
}

#[test]
fn rolling_average_uses_a_growing_window() {
    let values = [8, 4, 6, 2, 1];
    let averages = rolling_average(&values, 10);
    let mut sum = 0.0;
    for (index, value) in values.iter().enumerate() {
        sum += f64::from(*value);
        assert!((averages[index] - sum / (index + 1) as f64).abs() < 1e-9);
    }
    assert_eq!(averages[0], 8.0);

    let sliding = rolling_average(&values, 2);
    assert_eq!(sliding, vec![8.0, 6.0, 5.0, 4.0, 1.5]);
}

#[test]
fn rolling_placement_runs_oldest_first() {
    let records = ashe_and_lux();
    let series = rolling_placement(&records, 1);
    // a3 is the newest game, so with a window of one it ends the series.
    assert_eq!(series.len(), 5);
    assert_eq!(series.last().copied(), Some(2.0));
}

#[test]
fn first_completions_follow_time() {
    let records = vec![
        record("b1", "Braum", 5, Some(1)),
        record("a1", "Ashe", 9, Some(1)),
        record("z1", "Zed", 1, Some(1)),
        record("l1", "Lux", 3, Some(2)),
    ];
    let progress = build_category_progress(&records);
    let names: Vec<String> = first_completions(&progress)
        .into_iter()
        .map(|p| p.category)
        .collect();
    assert_eq!(names, vec!["Zed", "Braum", "Ashe"]);
}

#[test]
fn partners_group_by_key_then_name() {
    let records = vec![
        with_partner(record("1", "A", 1, Some(1)), Some("p-duo"), Some("Duo#1")),
        with_partner(record("2", "A", 2, Some(3)), Some("p-duo"), None),
        with_partner(record("3", "A", 3, Some(1)), None, Some("Pug#9")),
        with_partner(record("4", "A", 4, None), None, Some("Pug#9")),
        with_partner(record("5", "A", 5, Some(2)), None, Some("Solo#2")),
        record("6", "A", 6, Some(1)),
    ];

    let by_games = partner_aggregate(&records, PartnerSort::Games);
    assert_eq!(by_games.len(), 3);
    assert_eq!(by_games[0].key, "Pug#9");
    assert_eq!(by_games[1].key, "p-duo");
    assert_eq!(by_games[1].name.as_deref(), Some("Duo#1"));
    assert_eq!(by_games[1].wins, 1);
    assert_eq!(by_games[1].mean_rank, Some(2.0));
    assert_eq!(by_games[0].mean_rank, Some(1.0));
    assert_eq!(by_games[2].key, "Solo#2");

    let by_rate = partner_aggregate(&records, PartnerSort::WinRate { min_games: 2 });
    let keys: Vec<&str> = by_rate.iter().map(|p| p.key.as_str()).collect();
    assert_eq!(keys, vec!["Pug#9", "p-duo"]);
    assert!((by_rate[0].win_rate - 0.5).abs() < 1e-9);
}

#[test]
fn summary_counts_toward_goal() {
    let records = ashe_and_lux();
    let progress = build_category_progress(&records);
    let summary = summarize(&records, &progress);
    assert_eq!(summary.total_games, 5);
    assert_eq!(summary.average_placement, Some(3.0));
    assert_eq!(summary.completed_categories, 1);
    assert_eq!(summary.completion_goal, COMPLETION_GOAL);
    assert_eq!(summary.remaining_to_goal, COMPLETION_GOAL - 1);
}

#[test]
fn filters_combine_range_and_view() {
    let now = 100 * DAY_MS;
    let records = vec![
        record("new-win", "Ashe", now - DAY_MS, Some(1)),
        record("new-lux", "Lux", now - 2 * DAY_MS, Some(3)),
        record("old-lux", "Lux", now - 40 * DAY_MS, Some(6)),
        record("old-win", "Zed", now - 60 * DAY_MS, Some(1)),
    ];
    let progress = build_category_progress(&records);
    let ids = |range, view| -> Vec<String> {
        filter_records(&records, range, view, &progress, now)
            .into_iter()
            .map(|r| r.match_id)
            .collect()
    };

    assert_eq!(ids(TimeRange::Days7, ViewFilter::All), vec!["new-win", "new-lux"]);
    assert_eq!(ids(TimeRange::All, ViewFilter::Firsts), vec!["new-win", "old-win"]);
    assert_eq!(ids(TimeRange::Days30, ViewFilter::Top3), vec!["new-win", "new-lux"]);
    assert_eq!(ids(TimeRange::All, ViewFilter::InProgress), vec!["new-lux", "old-lux"]);
    assert_eq!(ids(TimeRange::Days90, ViewFilter::All).len(), 4);
}

#[test]
fn report_keeps_lifetime_progress_for_ranged_views() {
    let now = 100 * DAY_MS;
    let records = vec![
        record("recent", "Ashe", now - DAY_MS, Some(4)),
        record("ancient", "Zed", now - 80 * DAY_MS, Some(1)),
    ];

    let report = build_report(&records, TimeRange::Days7, ViewFilter::All, 10, now);

    assert_eq!(report.matches.len(), 1);
    assert_eq!(report.summary.total_games, 1);
    assert_eq!(report.summary.completed_categories, 1);
    assert_eq!(report.firsts[0].category, "Zed");
    assert_eq!(report.histogram.iter().sum::<u32>(), 1);
    assert_eq!(report.rolling_average, vec![4.0]);
}
