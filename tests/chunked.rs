use std::sync::Mutex;
use std::time::Duration;

use assert_matches::assert_matches;
use serde_json::Value;

use arena_tracker::chunked::{ChunkedDetailFetcher, MAX_IDS_PER_DETAIL_REQUEST};
use arena_tracker::domain::{Identity, MatchRecord, RiotId};
use arena_tracker::error::ArenaError;
use arena_tracker::fetcher::Sleeper;
use arena_tracker::source::MatchSource;

#[derive(Default)]
struct FakeDetails {
    batches: Mutex<Vec<Vec<String>>>,
    fail_on_call: Option<usize>,
}

impl FakeDetails {
    fn batches(&self) -> Vec<Vec<String>> {
        self.batches.lock().unwrap().clone()
    }
}

impl MatchSource for FakeDetails {
    fn resolve_identity(&self, riot_id: &RiotId) -> Result<Identity, ArenaError> {
        Err(ArenaError::IdentityNotFound(riot_id.to_string()))
    }

    fn list_match_ids(
        &self,
        _identity_key: &str,
        _offset: usize,
        _count: usize,
    ) -> Result<Vec<String>, ArenaError> {
        Ok(Vec::new())
    }

    fn fetch_matches(
        &self,
        _identity_key: &str,
        ids: &[String],
    ) -> Result<Vec<MatchRecord>, ArenaError> {
        let mut batches = self.batches.lock().unwrap();
        batches.push(ids.to_vec());
        if self.fail_on_call == Some(batches.len()) {
            return Err(ArenaError::RequestFailed {
                status: 503,
                body: String::new(),
            });
        }
        Ok(ids.iter().map(|id| record(id)).collect())
    }

    fn fetch_match(&self, _match_id: &str) -> Result<Value, ArenaError> {
        Ok(Value::Null)
    }
}

#[derive(Default)]
struct CountingSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl Sleeper for CountingSleeper {
    fn sleep(&self, duration: Duration) {
        self.slept.lock().unwrap().push(duration);
    }
}

fn record(id: &str) -> MatchRecord {
    MatchRecord {
        match_id: id.to_string(),
        game_start: id.trim_start_matches("NA1_").parse().unwrap_or(0),
        champion: "Ashe".to_string(),
        placement: Some(4),
        kills: 0,
        deaths: 0,
        assists: 0,
        gold: None,
        damage: None,
        partner_key: None,
        partner_name: None,
    }
}

fn ids(count: usize) -> Vec<String> {
    (0..count).map(|n| format!("NA1_{n}")).collect()
}

const CHUNK_DELAY: Duration = Duration::from_millis(700);

#[test]
fn splits_into_bounded_chunks() {
    let source = FakeDetails::default();
    let sleeper = CountingSleeper::default();
    let fetcher = ChunkedDetailFetcher::new(&source, &sleeper, 10, CHUNK_DELAY);

    let batches: Vec<_> = fetcher
        .fetch_details("p", ids(25))
        .collect::<Result<_, _>>()
        .unwrap();

    let sizes: Vec<usize> = source.batches().iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![10, 10, 5]);
    assert_eq!(batches.len(), 3);
    assert_eq!(
        batches.iter().map(|b| b.requested).collect::<Vec<_>>(),
        vec![10, 20, 25]
    );
    assert!(batches.iter().all(|b| b.total == 25 && b.chunk_count == 3));
    assert!(batches[2].is_last());
    assert_eq!(batches[2].records.len(), 25);
    assert_eq!(batches[0].records.len(), 10);
    // No pause before the first chunk and none after the last.
    assert_eq!(*sleeper.slept.lock().unwrap(), vec![CHUNK_DELAY, CHUNK_DELAY]);
}

#[test]
fn preserves_request_order() {
    let source = FakeDetails::default();
    let sleeper = CountingSleeper::default();
    let fetcher = ChunkedDetailFetcher::new(&source, &sleeper, 3, CHUNK_DELAY);

    let records = fetcher.collect_details("p", ids(7)).unwrap();

    let fetched: Vec<String> = records.into_iter().map(|r| r.match_id).collect();
    assert_eq!(fetched, ids(7));
    assert_eq!(source.batches().concat(), ids(7));
}

#[test]
fn chunk_size_is_clamped() {
    let source = FakeDetails::default();
    let sleeper = CountingSleeper::default();

    let wide = ChunkedDetailFetcher::new(&source, &sleeper, 500, CHUNK_DELAY);
    assert_eq!(wide.chunk_size(), MAX_IDS_PER_DETAIL_REQUEST);
    let narrow = ChunkedDetailFetcher::new(&source, &sleeper, 0, CHUNK_DELAY);
    assert_eq!(narrow.chunk_size(), 1);

    wide.collect_details("p", ids(45)).unwrap();
    assert!(source.batches().iter().all(|b| b.len() <= MAX_IDS_PER_DETAIL_REQUEST));
    assert_eq!(source.batches().len(), 3);
}

#[test]
fn nothing_is_requested_until_iterated() {
    let source = FakeDetails::default();
    let sleeper = CountingSleeper::default();
    let fetcher = ChunkedDetailFetcher::new(&source, &sleeper, 10, CHUNK_DELAY);

    let batches = fetcher.fetch_details("p", ids(30));
    assert_eq!(batches.chunk_count(), 3);
    assert!(source.batches().is_empty());

    let empty = fetcher.fetch_details("p", Vec::new());
    assert_eq!(empty.count(), 0);
    assert!(source.batches().is_empty());
}

#[test]
fn stops_after_failed_chunk() {
    let source = FakeDetails {
        fail_on_call: Some(2),
        ..FakeDetails::default()
    };
    let sleeper = CountingSleeper::default();
    let fetcher = ChunkedDetailFetcher::new(&source, &sleeper, 10, CHUNK_DELAY);

    let mut batches = fetcher.fetch_details("p", ids(40));
    assert_matches!(batches.next(), Some(Ok(batch)) if batch.records.len() == 10);
    assert_matches!(batches.next(), Some(Err(ArenaError::RequestFailed { status: 503, .. })));
    assert_matches!(batches.next(), None);
    assert_matches!(batches.next(), None);
    assert_eq!(source.batches().len(), 2);
}

#[test]
fn collect_reports_the_failure() {
    let source = FakeDetails {
        fail_on_call: Some(3),
        ..FakeDetails::default()
    };
    let sleeper = CountingSleeper::default();
    let fetcher = ChunkedDetailFetcher::new(&source, &sleeper, 5, CHUNK_DELAY);

    assert_matches!(
        fetcher.collect_details("p", ids(40)),
        Err(ArenaError::RequestFailed { status: 503, .. })
    );
    assert_eq!(source.batches().len(), 3);
}
