use std::io::{self, Write};

use serde::Serialize;

use crate::aggregate::StatsReport;
use crate::export::format_timestamp;
use crate::sync::{
    LoadMoreOutcome, ProgressEvent, ProgressSink, SyncAction, SyncOutcome, SyncPhase,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
    Json,
}

/// Compact form of a sync result; the full record list only goes into
/// `stats` output.
#[derive(Debug, Serialize)]
pub struct SyncSummary<'a> {
    pub player: String,
    pub action: SyncAction,
    pub new_records: usize,
    pub total_records: usize,
    pub next_offset: usize,
    pub updated_at: String,
    pub region: Option<&'a str>,
}

impl<'a> From<&'a SyncOutcome> for SyncSummary<'a> {
    fn from(outcome: &'a SyncOutcome) -> Self {
        let session = &outcome.session;
        Self {
            player: session.identity.display(),
            action: outcome.action,
            new_records: outcome.new_records,
            total_records: session.records.len(),
            next_offset: session.cursor.next_offset,
            updated_at: format_timestamp(session.updated_at),
            region: session.region.map(|region| region.label()),
        }
    }
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_sync(outcome: &SyncOutcome) -> io::Result<()> {
        Self::print_json(&SyncSummary::from(outcome))
    }

    pub fn print_stats(report: &StatsReport) -> io::Result<()> {
        Self::print_json(report)
    }

    pub fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

pub struct TextOutput;

impl TextOutput {
    pub fn print_sync(outcome: &SyncOutcome) -> io::Result<()> {
        let summary = SyncSummary::from(outcome);
        let what = match outcome.action {
            SyncAction::UpToDate => "cache is fresh".to_string(),
            SyncAction::NothingNew => "no new matches".to_string(),
            SyncAction::Incremental | SyncAction::Full | SyncAction::Initial => {
                format!("{} new matches", outcome.new_records)
            }
        };
        let mut stdout = io::stdout();
        writeln!(
            stdout,
            "{}: {what}, {} cached (updated {})",
            summary.player, summary.total_records, summary.updated_at
        )
    }

    pub fn print_load_more(outcome: LoadMoreOutcome) -> io::Result<()> {
        let mut stdout = io::stdout();
        match outcome {
            LoadMoreOutcome::Exhausted => writeln!(stdout, "No more Arena matches found."),
            LoadMoreOutcome::Loaded {
                scanned,
                new_records,
            } => writeln!(
                stdout,
                "Scanned {scanned} match ids, added {new_records} matches."
            ),
        }
    }

    pub fn print_stats(report: &StatsReport) -> io::Result<()> {
        let mut stdout = io::stdout();
        let summary = &report.summary;
        writeln!(stdout, "Games:        {}", summary.total_games)?;
        match summary.average_placement {
            Some(avg) => writeln!(stdout, "Avg place:    {avg:.2}")?,
            None => writeln!(stdout, "Avg place:    --")?,
        }
        writeln!(
            stdout,
            "Arena God:    {}/{} ({} to go)",
            summary.completed_categories, summary.completion_goal, summary.remaining_to_goal
        )?;

        writeln!(stdout, "\nPlacements")?;
        let widest = report.histogram.iter().copied().max().unwrap_or(0).max(1);
        for (index, count) in report.histogram.iter().enumerate() {
            let bar = "#".repeat((*count as usize * 30).div_ceil(widest as usize));
            writeln!(stdout, "  #{} {count:>4} {bar}", index + 1)?;
        }

        if let Some(latest) = report.rolling_average.last() {
            writeln!(stdout, "\nRolling placement: {latest:.2}")?;
        }

        if !report.hardest.is_empty() {
            writeln!(stdout, "\nHardest wins")?;
            for entry in &report.hardest {
                writeln!(
                    stdout,
                    "  {:<16} {} tries",
                    entry.category,
                    entry.attempts_until_success.unwrap_or_default()
                )?;
            }
        }

        if !report.partners.is_empty() {
            writeln!(stdout, "\nDuo partners")?;
            for partner in &report.partners {
                let name = partner.name.as_deref().unwrap_or(&partner.key);
                writeln!(
                    stdout,
                    "  {name:<24} {:>3} games {:>5.1}% wins",
                    partner.games,
                    partner.win_rate * 100.0
                )?;
            }
        }

        writeln!(stdout, "\nMatches")?;
        for record in &report.matches {
            let place = record
                .placement
                .map(|p| format!("#{p}"))
                .unwrap_or_else(|| "#?".to_string());
            writeln!(
                stdout,
                "  {} {place:<3} {:<16} {}",
                format_timestamp(record.game_start),
                record.champion,
                record.kda()
            )?;
        }
        Ok(())
    }
}

/// Status lines on stderr, for runs without the dashboard.
pub struct StderrProgress;

impl ProgressSink for StderrProgress {
    fn event(&self, event: ProgressEvent) {
        let line = match event {
            ProgressEvent::Phase(SyncPhase::Failed { reason }) => format!("error: {reason}"),
            ProgressEvent::Phase(_) => return,
            ProgressEvent::Status(message) => message,
            ProgressEvent::Preview { .. } => return,
        };
        let _ = writeln!(io::stderr(), "{line}");
    }
}
