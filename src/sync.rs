use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::chunked::{ChunkedDetailFetcher, DEFAULT_CHUNK_SIZE};
use crate::domain::{Identity, MatchRecord, RecordSet, Region, RiotId, SyncCursor};
use crate::error::{ArenaError, status_message};
use crate::fetcher::Sleeper;
use crate::scanner::{MAX_IDS_PER_PAGE, PagedIdScanner, ScanResult, ScanTarget};
use crate::source::MatchSource;
use crate::store::{BlobStore, CacheSnapshot, SnapshotStore, merge};

pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now_ms(&self) -> i64 {
        (**self).now_ms()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    LookingUpIdentity,
    CacheHit,
    CacheMiss,
    Scanning,
    FetchingDetails,
    Merging,
    Persisted,
    Failed { reason: String },
}

impl SyncPhase {
    pub fn label(&self) -> &'static str {
        match self {
            SyncPhase::Idle => "Idle",
            SyncPhase::LookingUpIdentity => "Lookup",
            SyncPhase::CacheHit => "CacheHit",
            SyncPhase::CacheMiss => "CacheMiss",
            SyncPhase::Scanning => "Scan",
            SyncPhase::FetchingDetails => "Fetch",
            SyncPhase::Merging => "Merge",
            SyncPhase::Persisted => "Persisted",
            SyncPhase::Failed { .. } => "Failed",
        }
    }
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncPhase::Failed { reason } => write!(f, "Failed: {reason}"),
            other => f.write_str(other.label()),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Phase(SyncPhase),
    Status(String),
    /// Cached or partially fetched records, ready to display. Previews are
    /// never persisted.
    Preview {
        records: RecordSet,
        fetched: usize,
        total: usize,
    },
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub struct NoopSink;

impl ProgressSink for NoopSink {
    fn event(&self, _event: ProgressEvent) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Refresh only when the cache is stale.
    Auto,
    /// Incremental refresh regardless of cache age.
    Refresh,
    /// Rescan the listing from the start.
    ForceFull,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPolicy {
    pub staleness: Duration,
    pub incremental_window: usize,
    pub initial_scan: ScanTarget,
    pub full_refresh_cap: Option<usize>,
    pub load_more_count: usize,
    pub load_all_batch: usize,
    pub load_all_pause: Duration,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            staleness: Duration::from_secs(6 * 60 * 60),
            incremental_window: 120,
            initial_scan: ScanTarget::Bounded(120),
            full_refresh_cap: None,
            load_more_count: 200,
            load_all_batch: 500,
            load_all_pause: Duration::from_secs(1),
        }
    }
}

/// Request pacing towards the proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTuning {
    pub page_size: usize,
    pub page_delay: Duration,
    pub chunk_size: usize,
    pub chunk_delay: Duration,
}

impl Default for FetchTuning {
    fn default() -> Self {
        Self {
            page_size: MAX_IDS_PER_PAGE,
            page_delay: Duration::from_millis(300),
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_delay: Duration::from_millis(700),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPlan {
    UpToDate,
    Incremental { window: usize },
    Full { cap: Option<usize> },
    Initial { target: ScanTarget },
}

pub fn plan_refresh(
    snapshot: Option<&CacheSnapshot>,
    mode: SyncMode,
    now_ms: i64,
    policy: &SyncPolicy,
) -> RefreshPlan {
    if mode == SyncMode::ForceFull {
        return RefreshPlan::Full {
            cap: policy.full_refresh_cap,
        };
    }
    let Some(snapshot) = snapshot else {
        return RefreshPlan::Initial {
            target: policy.initial_scan,
        };
    };
    let stale_after = i64::try_from(policy.staleness.as_millis()).unwrap_or(i64::MAX);
    let age = now_ms.saturating_sub(snapshot.updated_at);
    if mode == SyncMode::Refresh || age > stale_after {
        RefreshPlan::Incremental {
            window: policy.incremental_window,
        }
    } else {
        RefreshPlan::UpToDate
    }
}

/// Scanned ids not yet held, in scan order, without repeats.
pub fn unknown_ids(known: &RecordSet, scanned: &[String]) -> Vec<String> {
    let held = known.keys();
    let mut seen = HashSet::new();
    scanned
        .iter()
        .filter(|id| !held.contains(id.as_str()) && seen.insert(id.as_str()))
        .cloned()
        .collect()
}

/// Monotonic sync counter shared with the presentation layer. A sync only
/// commits if its ticket is still the current generation when it finishes.
#[derive(Debug, Clone, Default)]
pub struct SyncGeneration {
    current: Arc<AtomicU64>,
}

impl SyncGeneration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self) -> u64 {
        self.current.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Invalidates whatever sync is in flight.
    pub fn supersede(&self) {
        self.current.fetch_add(1, Ordering::SeqCst);
    }

    pub fn current(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }

    pub fn is_current(&self, ticket: u64) -> bool {
        self.current() == ticket
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncSession {
    pub identity: Identity,
    pub region: Option<Region>,
    pub records: RecordSet,
    pub cursor: SyncCursor,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    UpToDate,
    NothingNew,
    Incremental,
    Full,
    Initial,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncOutcome {
    pub action: SyncAction,
    pub new_records: usize,
    pub session: SyncSession,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum LoadMoreOutcome {
    Exhausted,
    Loaded { scanned: usize, new_records: usize },
}

pub struct SyncOrchestrator<M: MatchSource, B: BlobStore, S: Sleeper, C: Clock> {
    source: M,
    store: SnapshotStore<B>,
    sleeper: S,
    clock: C,
    policy: SyncPolicy,
    tuning: FetchTuning,
    region: Option<Region>,
    generation: SyncGeneration,
    session: Option<SyncSession>,
}

impl<M: MatchSource, B: BlobStore, S: Sleeper, C: Clock> SyncOrchestrator<M, B, S, C> {
    pub fn new(source: M, store: SnapshotStore<B>, sleeper: S, clock: C) -> Self {
        Self {
            source,
            store,
            sleeper,
            clock,
            policy: SyncPolicy::default(),
            tuning: FetchTuning::default(),
            region: None,
            generation: SyncGeneration::new(),
            session: None,
        }
    }

    pub fn with_policy(mut self, policy: SyncPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_tuning(mut self, tuning: FetchTuning) -> Self {
        self.tuning = tuning;
        self
    }

    pub fn with_region(mut self, region: Option<Region>) -> Self {
        self.region = region;
        self
    }

    pub fn session(&self) -> Option<&SyncSession> {
        self.session.as_ref()
    }

    pub fn generation(&self) -> SyncGeneration {
        self.generation.clone()
    }

    pub fn store(&self) -> &SnapshotStore<B> {
        &self.store
    }

    pub fn sync(
        &mut self,
        riot_id: &RiotId,
        mode: SyncMode,
        sink: &dyn ProgressSink,
    ) -> Result<SyncOutcome, ArenaError> {
        let ticket = self.generation.begin();
        let result = self.run_sync(ticket, riot_id, mode, sink);
        finish(result, sink)
    }

    /// Extends history past the cursor by up to `amount` ids.
    pub fn load_more(
        &mut self,
        amount: usize,
        sink: &dyn ProgressSink,
    ) -> Result<LoadMoreOutcome, ArenaError> {
        let ticket = self.generation.begin();
        let result = self.run_load_more(ticket, amount, sink);
        finish(result, sink)
    }

    /// Loads history in large rounds until the listing is exhausted. Returns
    /// the number of new records.
    pub fn load_all(&mut self, sink: &dyn ProgressSink) -> Result<usize, ArenaError> {
        let ticket = self.generation.begin();
        let result = self.run_load_all(ticket, sink);
        finish(result, sink)
    }

    /// Drops the loaded player's cache and session.
    pub fn clear_cache(&mut self) -> Result<(), ArenaError> {
        let session = self.session.take().ok_or(ArenaError::NoActiveSession)?;
        self.store.clear(&session.identity.key)?;
        info!(player = %session.identity.display(), "cache cleared");
        Ok(())
    }

    /// Resolves the player and wipes only that player's cache.
    pub fn clear_for(&mut self, riot_id: &RiotId) -> Result<Identity, ArenaError> {
        let identity = self.source.resolve_identity(riot_id)?;
        self.store.clear(&identity.key)?;
        if self
            .session
            .as_ref()
            .is_some_and(|session| session.identity.key == identity.key)
        {
            self.session = None;
        }
        info!(player = %identity.display(), "cache cleared");
        Ok(identity)
    }

    pub fn fetch_match(&self, match_id: &str) -> Result<Value, ArenaError> {
        self.source.fetch_match(match_id)
    }

    fn run_sync(
        &mut self,
        ticket: u64,
        riot_id: &RiotId,
        mode: SyncMode,
        sink: &dyn ProgressSink,
    ) -> Result<SyncOutcome, ArenaError> {
        emit_phase(sink, SyncPhase::LookingUpIdentity);
        sink.event(ProgressEvent::Status("Looking up account...".to_string()));
        let identity = self.source.resolve_identity(riot_id)?;

        let snapshot = self.store.load(&identity.key);
        let (records, cursor) = match &snapshot {
            Some(snapshot) => {
                emit_phase(sink, SyncPhase::CacheHit);
                sink.event(ProgressEvent::Preview {
                    records: snapshot.records.clone(),
                    fetched: 0,
                    total: 0,
                });
                (snapshot.records.clone(), snapshot.cursor.clone())
            }
            None => {
                emit_phase(sink, SyncPhase::CacheMiss);
                (RecordSet::default(), SyncCursor::default())
            }
        };
        let region = self
            .region
            .or_else(|| snapshot.as_ref().and_then(|s| s.region));

        let now = self.clock.now_ms();
        let plan = plan_refresh(snapshot.as_ref(), mode, now, &self.policy);
        info!(player = %identity.display(), cached = records.len(), ?plan, "sync planned");

        if plan == RefreshPlan::UpToDate {
            let session = SyncSession {
                identity,
                region,
                records,
                cursor,
                updated_at: snapshot.map(|s| s.updated_at).unwrap_or(now),
            };
            return self.commit(ticket, session, SyncAction::UpToDate, 0, false, sink);
        }

        let scanner = PagedIdScanner::new(
            &self.source,
            &self.sleeper,
            self.tuning.page_size,
            self.tuning.page_delay,
        );
        emit_phase(sink, SyncPhase::Scanning);
        sink.event(ProgressEvent::Status("Fetching match IDs...".to_string()));

        let (action, scan) = match plan {
            RefreshPlan::Incremental { window } => {
                let newest = scanner.probe_latest(&identity.key)?;
                let unchanged = newest.is_none() || newest == cursor.known_latest_key;
                if unchanged {
                    (SyncAction::NothingNew, None)
                } else {
                    let scan = scanner.scan(&identity.key, 0, ScanTarget::Bounded(window))?;
                    (SyncAction::Incremental, Some(scan))
                }
            }
            RefreshPlan::Full { cap } => {
                let target = cap.map_or(ScanTarget::Unbounded, ScanTarget::Bounded);
                (SyncAction::Full, Some(scanner.scan(&identity.key, 0, target)?))
            }
            RefreshPlan::Initial { target } => {
                (SyncAction::Initial, Some(scanner.scan(&identity.key, 0, target)?))
            }
            RefreshPlan::UpToDate => (SyncAction::UpToDate, None),
        };

        let Some(scan) = scan else {
            let session = SyncSession {
                identity,
                region,
                records,
                cursor,
                updated_at: now,
            };
            return self.commit(ticket, session, action, 0, true, sink);
        };

        if scan.ids.is_empty() && records.is_empty() {
            sink.event(ProgressEvent::Status(
                "No Arena matches found for this player.".to_string(),
            ));
        }

        let unknown = unknown_ids(&records, &scan.ids);
        debug!(scanned = scan.ids.len(), unknown = unknown.len(), "id diff");
        let fetched = self.fetch_unknown(&identity.key, unknown, &records, sink)?;

        emit_phase(sink, SyncPhase::Merging);
        let merged = merge(&records, fetched);
        let new_records = merged.len() - records.len();
        let next_cursor = advance_cursor(&cursor, &scan, action);
        let persist = !merged.is_empty();
        let session = SyncSession {
            identity,
            region,
            records: merged,
            cursor: next_cursor,
            updated_at: now,
        };
        self.commit(ticket, session, action, new_records, persist, sink)
    }

    /// Every round runs under the same ticket, so a supersede during the
    /// pause between rounds stops the whole run.
    fn run_load_all(
        &mut self,
        ticket: u64,
        sink: &dyn ProgressSink,
    ) -> Result<usize, ArenaError> {
        sink.event(ProgressEvent::Status(
            "Loading all past Arena matches, this can take a while.".to_string(),
        ));
        let mut total = 0;
        loop {
            match self.run_load_more(ticket, self.policy.load_all_batch, sink)? {
                LoadMoreOutcome::Exhausted => break,
                LoadMoreOutcome::Loaded { new_records, .. } => {
                    total += new_records;
                    self.sleeper.sleep(self.policy.load_all_pause);
                    if !self.generation.is_current(ticket) {
                        debug!(ticket, loaded = total, "load all superseded between rounds");
                        return Err(ArenaError::Superseded);
                    }
                }
            }
        }
        sink.event(ProgressEvent::Status(
            "All past Arena matches loaded.".to_string(),
        ));
        Ok(total)
    }

    fn run_load_more(
        &mut self,
        ticket: u64,
        amount: usize,
        sink: &dyn ProgressSink,
    ) -> Result<LoadMoreOutcome, ArenaError> {
        let session = self.session.clone().ok_or(ArenaError::NoActiveSession)?;
        let scanner = PagedIdScanner::new(
            &self.source,
            &self.sleeper,
            self.tuning.page_size,
            self.tuning.page_delay,
        );

        emit_phase(sink, SyncPhase::Scanning);
        let start = session.cursor.next_offset;
        sink.event(ProgressEvent::Status(format!(
            "Fetching match ids, {start} to {}",
            start + amount.saturating_sub(1)
        )));
        let scan = scanner.scan(&session.identity.key, start, ScanTarget::Bounded(amount))?;
        if scan.ids.is_empty() {
            sink.event(ProgressEvent::Status(
                "No more Arena matches found.".to_string(),
            ));
            return Ok(LoadMoreOutcome::Exhausted);
        }

        let unknown = unknown_ids(&session.records, &scan.ids);
        let fetched = self.fetch_unknown(&session.identity.key, unknown, &session.records, sink)?;

        emit_phase(sink, SyncPhase::Merging);
        let merged = merge(&session.records, fetched);
        let new_records = merged.len() - session.records.len();
        let cursor = SyncCursor {
            next_offset: scan.next_offset,
            known_latest_key: session
                .cursor
                .known_latest_key
                .clone()
                .or_else(|| merged.newest().map(|r| r.match_id.clone())),
        };
        let scanned = scan.ids.len();
        let updated = SyncSession {
            records: merged,
            cursor,
            updated_at: self.clock.now_ms(),
            ..session
        };
        self.commit(ticket, updated, SyncAction::Incremental, new_records, true, sink)?;
        Ok(LoadMoreOutcome::Loaded {
            scanned,
            new_records,
        })
    }

    fn fetch_unknown(
        &self,
        identity_key: &str,
        ids: Vec<String>,
        existing: &RecordSet,
        sink: &dyn ProgressSink,
    ) -> Result<Vec<MatchRecord>, ArenaError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        emit_phase(sink, SyncPhase::FetchingDetails);
        sink.event(ProgressEvent::Status(format!(
            "Fetching match details, 0/{}",
            ids.len()
        )));

        let fetcher = ChunkedDetailFetcher::new(
            &self.source,
            &self.sleeper,
            self.tuning.chunk_size,
            self.tuning.chunk_delay,
        );
        let mut fetched = Vec::new();
        for batch in fetcher.fetch_details(identity_key, ids) {
            let batch = batch?;
            sink.event(ProgressEvent::Status(format!(
                "Fetching match details, {}/{}",
                batch.requested, batch.total
            )));
            sink.event(ProgressEvent::Preview {
                records: merge(existing, batch.records.clone()),
                fetched: batch.requested,
                total: batch.total,
            });
            fetched = batch.records;
        }
        Ok(fetched)
    }

    fn commit(
        &mut self,
        ticket: u64,
        session: SyncSession,
        action: SyncAction,
        new_records: usize,
        persist: bool,
        sink: &dyn ProgressSink,
    ) -> Result<SyncOutcome, ArenaError> {
        if !self.generation.is_current(ticket) {
            debug!(ticket, current = self.generation.current(), "discarding stale sync");
            return Err(ArenaError::Superseded);
        }
        if persist {
            let snapshot = CacheSnapshot::new(
                session.records.clone(),
                session.cursor.clone(),
                session.region,
                session.updated_at,
            );
            self.store.save(&session.identity.key, &snapshot);
            emit_phase(sink, SyncPhase::Persisted);
        }
        info!(
            player = %session.identity.display(),
            ?action,
            new_records,
            total = session.records.len(),
            "sync committed"
        );
        self.session = Some(session.clone());
        Ok(SyncOutcome {
            action,
            new_records,
            session,
        })
    }
}

fn advance_cursor(previous: &SyncCursor, scan: &ScanResult, action: SyncAction) -> SyncCursor {
    let known_latest_key = scan
        .ids
        .first()
        .cloned()
        .or_else(|| previous.known_latest_key.clone());
    let next_offset = match action {
        SyncAction::Full | SyncAction::Initial => scan.next_offset,
        // New games shift the listing; resuming a little early only re-lists
        // ids the diff already filters out.
        _ => previous.next_offset.max(scan.next_offset),
    };
    SyncCursor {
        next_offset,
        known_latest_key,
    }
}

fn emit_phase(sink: &dyn ProgressSink, phase: SyncPhase) {
    debug!(phase = %phase, "sync phase");
    sink.event(ProgressEvent::Phase(phase));
}

fn finish<T>(result: Result<T, ArenaError>, sink: &dyn ProgressSink) -> Result<T, ArenaError> {
    if let Err(err) = &result {
        let reason = status_message(err);
        emit_phase(sink, SyncPhase::Failed { reason });
    }
    emit_phase(sink, SyncPhase::Idle);
    result
}
