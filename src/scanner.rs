use std::time::Duration;

use tracing::debug;

use crate::error::ArenaError;
use crate::fetcher::Sleeper;
use crate::source::MatchSource;

/// Largest page the id listing endpoint accepts.
pub const MAX_IDS_PER_PAGE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanTarget {
    Bounded(usize),
    Unbounded,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanResult {
    /// Ids in listing order, newest first.
    pub ids: Vec<String>,
    /// Absolute offset to resume from, not the number of new ids.
    pub next_offset: usize,
}

pub struct PagedIdScanner<'a, M: MatchSource, S: Sleeper> {
    source: &'a M,
    sleeper: &'a S,
    page_size: usize,
    page_delay: Duration,
}

impl<'a, M: MatchSource, S: Sleeper> PagedIdScanner<'a, M, S> {
    pub fn new(source: &'a M, sleeper: &'a S, page_size: usize, page_delay: Duration) -> Self {
        Self {
            source,
            sleeper,
            page_size: page_size.clamp(1, MAX_IDS_PER_PAGE),
            page_delay,
        }
    }

    /// Walks the listing forward from `start_offset`. Any page failure
    /// aborts the scan and the ids gathered so far are dropped.
    pub fn scan(
        &self,
        identity_key: &str,
        start_offset: usize,
        target: ScanTarget,
    ) -> Result<ScanResult, ArenaError> {
        let mut ids = Vec::new();
        let mut offset = start_offset;

        loop {
            let remaining = match target {
                ScanTarget::Bounded(total) => total.saturating_sub(ids.len()),
                ScanTarget::Unbounded => self.page_size,
            };
            if remaining == 0 {
                break;
            }
            let count = remaining.min(self.page_size);
            debug!(offset, count, gathered = ids.len(), "listing match ids");
            let page = self.source.list_match_ids(identity_key, offset, count)?;
            let returned = page.len();
            offset += returned;
            ids.extend(page);

            let exhausted = returned < count;
            let filled = matches!(target, ScanTarget::Bounded(total) if ids.len() >= total);
            if returned == 0 || exhausted || filled {
                break;
            }
            self.sleeper.sleep(self.page_delay);
        }

        debug!(found = ids.len(), next_offset = offset, "id scan finished");
        Ok(ScanResult {
            ids,
            next_offset: offset,
        })
    }

    /// Newest id in the listing, if any.
    pub fn probe_latest(&self, identity_key: &str) -> Result<Option<String>, ArenaError> {
        let mut page = self.source.list_match_ids(identity_key, 0, 1)?;
        Ok(if page.is_empty() {
            None
        } else {
            Some(page.swap_remove(0))
        })
    }
}
