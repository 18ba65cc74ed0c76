use std::sync::Mutex;
use std::time::Duration;

use assert_matches::assert_matches;
use serde_json::Value;

use arena_tracker::domain::{Identity, MatchRecord, RiotId};
use arena_tracker::error::ArenaError;
use arena_tracker::fetcher::Sleeper;
use arena_tracker::scanner::{PagedIdScanner, ScanTarget};
use arena_tracker::source::MatchSource;

/// Serves `total` ids, newest first, and records every listing request.
struct FakeListing {
    ids: Vec<String>,
    requests: Mutex<Vec<(usize, usize)>>,
    fail_at_offset: Option<usize>,
}

impl FakeListing {
    fn new(total: usize) -> Self {
        Self {
            ids: (0..total).rev().map(|n| format!("NA1_{n}")).collect(),
            requests: Mutex::new(Vec::new()),
            fail_at_offset: None,
        }
    }

    fn requests(&self) -> Vec<(usize, usize)> {
        self.requests.lock().unwrap().clone()
    }
}

impl MatchSource for FakeListing {
    fn resolve_identity(&self, riot_id: &RiotId) -> Result<Identity, ArenaError> {
        Err(ArenaError::IdentityNotFound(riot_id.to_string()))
    }

    fn list_match_ids(
        &self,
        _identity_key: &str,
        offset: usize,
        count: usize,
    ) -> Result<Vec<String>, ArenaError> {
        self.requests.lock().unwrap().push((offset, count));
        if self.fail_at_offset == Some(offset) {
            return Err(ArenaError::RequestFailed {
                status: 500,
                body: String::new(),
            });
        }
        Ok(self.ids.iter().skip(offset).take(count).cloned().collect())
    }

    fn fetch_matches(
        &self,
        _identity_key: &str,
        _ids: &[String],
    ) -> Result<Vec<MatchRecord>, ArenaError> {
        Ok(Vec::new())
    }

    fn fetch_match(&self, _match_id: &str) -> Result<Value, ArenaError> {
        Ok(Value::Null)
    }
}

#[derive(Default)]
struct CountingSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl CountingSleeper {
    fn count(&self) -> usize {
        self.slept.lock().unwrap().len()
    }
}

impl Sleeper for CountingSleeper {
    fn sleep(&self, duration: Duration) {
        self.slept.lock().unwrap().push(duration);
    }
}

const PAGE_DELAY: Duration = Duration::from_millis(300);

#[test]
fn bounded_scan_stops_at_target() {
    let source = FakeListing::new(250);
    let sleeper = CountingSleeper::default();
    let scanner = PagedIdScanner::new(&source, &sleeper, 100, PAGE_DELAY);

    let result = scanner.scan("p", 0, ScanTarget::Bounded(120)).unwrap();

    assert_eq!(result.ids.len(), 120);
    assert_eq!(result.ids[0], "NA1_249");
    assert_eq!(result.next_offset, 120);
    assert_eq!(source.requests(), vec![(0, 100), (100, 20)]);
    assert_eq!(*sleeper.slept.lock().unwrap(), vec![PAGE_DELAY]);
}

#[test]
fn unbounded_scan_stops_on_short_page() {
    let source = FakeListing::new(250);
    let sleeper = CountingSleeper::default();
    let scanner = PagedIdScanner::new(&source, &sleeper, 100, PAGE_DELAY);

    let result = scanner.scan("p", 0, ScanTarget::Unbounded).unwrap();

    assert_eq!(result.ids.len(), 250);
    assert_eq!(result.next_offset, 250);
    assert_eq!(source.requests(), vec![(0, 100), (100, 100), (200, 100)]);
    assert_eq!(sleeper.count(), 2);
}

#[test]
fn unbounded_scan_stops_on_empty_page() {
    let source = FakeListing::new(200);
    let sleeper = CountingSleeper::default();
    let scanner = PagedIdScanner::new(&source, &sleeper, 100, PAGE_DELAY);

    let result = scanner.scan("p", 0, ScanTarget::Unbounded).unwrap();

    assert_eq!(result.ids.len(), 200);
    assert_eq!(result.next_offset, 200);
    assert_eq!(source.requests().len(), 3);
    assert_eq!(sleeper.count(), 2);
}

#[test]
fn resumes_from_absolute_offset() {
    let source = FakeListing::new(250);
    let sleeper = CountingSleeper::default();
    let scanner = PagedIdScanner::new(&source, &sleeper, 100, PAGE_DELAY);

    let result = scanner.scan("p", 150, ScanTarget::Bounded(200)).unwrap();

    assert_eq!(result.ids.len(), 100);
    assert_eq!(result.ids[0], "NA1_99");
    assert_eq!(result.next_offset, 250);
    assert_eq!(source.requests(), vec![(150, 100), (250, 100)]);
}

#[test]
fn empty_listing_is_not_an_error() {
    let source = FakeListing::new(0);
    let sleeper = CountingSleeper::default();
    let scanner = PagedIdScanner::new(&source, &sleeper, 100, PAGE_DELAY);

    let result = scanner.scan("p", 40, ScanTarget::Unbounded).unwrap();

    assert!(result.ids.is_empty());
    assert_eq!(result.next_offset, 40);
    assert_eq!(sleeper.count(), 0);
}

#[test]
fn page_size_is_capped() {
    let source = FakeListing::new(500);
    let sleeper = CountingSleeper::default();
    let scanner = PagedIdScanner::new(&source, &sleeper, 1000, PAGE_DELAY);

    scanner.scan("p", 0, ScanTarget::Bounded(150)).unwrap();

    assert_eq!(source.requests(), vec![(0, 100), (100, 50)]);
}

#[test]
fn page_failure_aborts_scan() {
    let mut source = FakeListing::new(300);
    source.fail_at_offset = Some(100);
    let sleeper = CountingSleeper::default();
    let scanner = PagedIdScanner::new(&source, &sleeper, 100, PAGE_DELAY);

    let err = scanner.scan("p", 0, ScanTarget::Unbounded).unwrap_err();

    assert_matches!(err, ArenaError::RequestFailed { status: 500, .. });
    assert_eq!(source.requests().len(), 2);
}

#[test]
fn probe_reads_newest_id() {
    let source = FakeListing::new(3);
    let sleeper = CountingSleeper::default();
    let scanner = PagedIdScanner::new(&source, &sleeper, 100, PAGE_DELAY);

    assert_eq!(scanner.probe_latest("p").unwrap().as_deref(), Some("NA1_2"));
    assert_eq!(source.requests(), vec![(0, 1)]);

    let empty = FakeListing::new(0);
    let scanner = PagedIdScanner::new(&empty, &sleeper, 100, PAGE_DELAY);
    assert_eq!(scanner.probe_latest("p").unwrap(), None);
}
