use std::io::Write;

use camino::Utf8Path;
use chrono::{DateTime, SecondsFormat};
use serde::Serialize;

use crate::domain::MatchRecord;
use crate::error::ArenaError;
use crate::store::write_bytes_atomic;

#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    match_id: &'a str,
    game_start: String,
    champion: &'a str,
    placement: Option<u8>,
    kills: u32,
    deaths: u32,
    assists: u32,
}

impl<'a> From<&'a MatchRecord> for CsvRow<'a> {
    fn from(record: &'a MatchRecord) -> Self {
        Self {
            match_id: &record.match_id,
            game_start: format_timestamp(record.game_start),
            champion: &record.champion,
            placement: record.placement,
            kills: record.kills,
            deaths: record.deaths,
            assists: record.assists,
        }
    }
}

/// RFC 3339 in UTC, or the raw millis when out of chrono's range.
pub fn format_timestamp(epoch_ms: i64) -> String {
    DateTime::from_timestamp_millis(epoch_ms)
        .map(|ts| ts.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_else(|| epoch_ms.to_string())
}

/// Writes one header row and one row per record, in the given order.
pub fn write_csv<W: Write>(records: &[MatchRecord], writer: W) -> Result<(), ArenaError> {
    let mut csv = csv::Writer::from_writer(writer);
    for record in records {
        csv.serialize(CsvRow::from(record))
            .map_err(|err| ArenaError::Filesystem(err.to_string()))?;
    }
    // An empty export still gets a header.
    if records.is_empty() {
        csv.write_record([
            "match_id",
            "game_start",
            "champion",
            "placement",
            "kills",
            "deaths",
            "assists",
        ])
        .map_err(|err| ArenaError::Filesystem(err.to_string()))?;
    }
    csv.flush()
        .map_err(|err| ArenaError::Filesystem(err.to_string()))?;
    Ok(())
}

pub fn export_csv(records: &[MatchRecord], path: &Utf8Path) -> Result<usize, ArenaError> {
    let mut buffer = Vec::new();
    write_csv(records, &mut buffer)?;
    write_bytes_atomic(path, &buffer)?;
    Ok(records.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_are_utc_rfc3339() {
        assert_eq!(format_timestamp(0), "1970-01-01T00:00:00Z");
        assert_eq!(format_timestamp(1_700_000_000_000), "2023-11-14T22:13:20Z");
    }
}
