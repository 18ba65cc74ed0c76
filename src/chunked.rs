use std::time::Duration;

use tracing::debug;

use crate::domain::MatchRecord;
use crate::error::ArenaError;
use crate::fetcher::Sleeper;
use crate::source::MatchSource;

/// Per-request id cap enforced by the proxy's detail endpoint.
pub const MAX_IDS_PER_DETAIL_REQUEST: usize = 20;
pub const DEFAULT_CHUNK_SIZE: usize = 10;

/// Progress after one chunk. `records` holds everything fetched so far,
/// in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialBatch {
    pub chunk_index: usize,
    pub chunk_count: usize,
    pub requested: usize,
    pub total: usize,
    pub records: Vec<MatchRecord>,
}

impl PartialBatch {
    pub fn is_last(&self) -> bool {
        self.chunk_index + 1 == self.chunk_count
    }
}

pub struct ChunkedDetailFetcher<'a, M: MatchSource, S: Sleeper> {
    source: &'a M,
    sleeper: &'a S,
    chunk_size: usize,
    chunk_delay: Duration,
}

impl<'a, M: MatchSource, S: Sleeper> ChunkedDetailFetcher<'a, M, S> {
    pub fn new(source: &'a M, sleeper: &'a S, chunk_size: usize, chunk_delay: Duration) -> Self {
        Self {
            source,
            sleeper,
            chunk_size: chunk_size.clamp(1, MAX_IDS_PER_DETAIL_REQUEST),
            chunk_delay,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Nothing is requested until the returned iterator is advanced.
    pub fn fetch_details(
        &self,
        identity_key: &'a str,
        ids: Vec<String>,
    ) -> DetailBatches<'a, M, S> {
        let chunk_count = ids.len().div_ceil(self.chunk_size);
        DetailBatches {
            source: self.source,
            sleeper: self.sleeper,
            identity_key,
            ids,
            chunk_size: self.chunk_size,
            chunk_delay: self.chunk_delay,
            chunk_count,
            next_chunk: 0,
            collected: Vec::new(),
            done: false,
        }
    }

    pub fn collect_details(
        &self,
        identity_key: &'a str,
        ids: Vec<String>,
    ) -> Result<Vec<MatchRecord>, ArenaError> {
        let mut last = Vec::new();
        for batch in self.fetch_details(identity_key, ids) {
            last = batch?.records;
        }
        Ok(last)
    }
}

/// Sequential chunk fetches. Yields one item per chunk and stops after the
/// first error.
pub struct DetailBatches<'a, M: MatchSource, S: Sleeper> {
    source: &'a M,
    sleeper: &'a S,
    identity_key: &'a str,
    ids: Vec<String>,
    chunk_size: usize,
    chunk_delay: Duration,
    chunk_count: usize,
    next_chunk: usize,
    collected: Vec<MatchRecord>,
    done: bool,
}

impl<M: MatchSource, S: Sleeper> DetailBatches<'_, M, S> {
    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }
}

impl<M: MatchSource, S: Sleeper> Iterator for DetailBatches<'_, M, S> {
    type Item = Result<PartialBatch, ArenaError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.next_chunk >= self.chunk_count {
            self.done = true;
            return None;
        }
        if self.next_chunk > 0 {
            self.sleeper.sleep(self.chunk_delay);
        }

        let start = self.next_chunk * self.chunk_size;
        let end = (start + self.chunk_size).min(self.ids.len());
        let chunk = &self.ids[start..end];
        debug!(
            chunk = self.next_chunk + 1,
            of = self.chunk_count,
            ids = chunk.len(),
            "fetching match details"
        );

        match self.source.fetch_matches(self.identity_key, chunk) {
            Ok(records) => {
                self.collected.extend(records);
                let batch = PartialBatch {
                    chunk_index: self.next_chunk,
                    chunk_count: self.chunk_count,
                    requested: end,
                    total: self.ids.len(),
                    records: self.collected.clone(),
                };
                self.next_chunk += 1;
                Some(Ok(batch))
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

impl<M: MatchSource, S: Sleeper> std::iter::FusedIterator for DetailBatches<'_, M, S> {}
