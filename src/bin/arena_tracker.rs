use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use arena_tracker::aggregate::{
    TimeRange, ViewFilter, build_category_progress, build_report, filter_records,
};
use arena_tracker::config::{ConfigLoader, ResolvedConfig};
use arena_tracker::domain::{RecordSet, Region, RiotId};
use arena_tracker::error::{ArenaError, status_message};
use arena_tracker::export::export_csv;
use arena_tracker::fetcher::{RateLimitedFetcher, ReqwestTransport, RetryPolicy, ThreadSleeper};
use arena_tracker::output::{JsonOutput, OutputMode, StderrProgress, TextOutput};
use arena_tracker::source::HttpMatchSource;
use arena_tracker::store::{FileBlobStore, SnapshotStore};
use arena_tracker::sync::{
    Clock, ProgressSink, SyncAction, SyncMode, SyncOrchestrator, SyncOutcome, SystemClock,
};
use arena_tracker::tui::Tui;

type LiveOrchestrator = SyncOrchestrator<
    HttpMatchSource<ReqwestTransport, ThreadSleeper>,
    FileBlobStore,
    ThreadSleeper,
    SystemClock,
>;

#[derive(Parser)]
#[command(name = "arena-tracker")]
#[command(about = "Arena match history sync and per-champion placement stats")]
#[command(version, author)]
struct Cli {
    /// Config file (defaults to ./arena-tracker.json when present)
    #[arg(long, global = true)]
    config: Option<String>,

    #[arg(long, global = true)]
    region: Option<Region>,

    #[arg(long, global = true)]
    json: bool,

    #[arg(long, global = true)]
    non_interactive: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Sync a player's match history into the local cache")]
    Sync(SyncArgs),
    #[command(about = "Load older matches past the cached range")]
    More(MoreArgs),
    #[command(about = "Load the whole match history")]
    All(PlayerArgs),
    #[command(about = "Show placement stats and champion progress")]
    Stats(StatsArgs),
    #[command(about = "Export matches as CSV")]
    Export(ExportArgs),
    #[command(about = "Clear a player's cached matches")]
    Clear(PlayerArgs),
    #[command(about = "Print the full payload of one match")]
    Match(MatchArgs),
}

#[derive(Args)]
struct PlayerArgs {
    /// Riot ID, e.g. Name#TAG
    player: String,
}

#[derive(Args)]
struct SyncArgs {
    player: String,

    /// Rescan the whole listing instead of only new games
    #[arg(long)]
    force: bool,

    /// Check for new games even when the cache is fresh
    #[arg(long)]
    refresh: bool,
}

#[derive(Args)]
struct MoreArgs {
    player: String,

    #[arg(long)]
    count: Option<usize>,
}

#[derive(Args)]
struct StatsArgs {
    player: String,

    #[arg(long, value_enum, default_value_t = TimeRange::All)]
    range: TimeRange,

    #[arg(long, value_enum, default_value_t = ViewFilter::All)]
    view: ViewFilter,

    /// Rolling average window
    #[arg(long)]
    window: Option<usize>,
}

#[derive(Args)]
struct ExportArgs {
    player: String,

    #[arg(long)]
    out: Utf8PathBuf,

    #[arg(long, value_enum, default_value_t = TimeRange::All)]
    range: TimeRange,

    #[arg(long, value_enum, default_value_t = ViewFilter::All)]
    view: ViewFilter,
}

#[derive(Args)]
struct MatchArgs {
    id: String,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        if let Some(arena) = report.downcast_ref::<ArenaError>() {
            eprintln!("{}", status_message(arena));
            return ExitCode::from(map_exit_code(arena));
        }
        eprintln!("{report:?}");
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &ArenaError) -> u8 {
    match error {
        ArenaError::InvalidRiotId(_)
        | ArenaError::InvalidRegion(_)
        | ArenaError::InvalidConfig(_)
        | ArenaError::ConfigRead(_)
        | ArenaError::ConfigParse(_)
        | ArenaError::IdentityNotFound(_)
        | ArenaError::NoActiveSession => 2,
        other if other.is_remote() => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    let resolved = ConfigLoader::resolve(cli.config.as_deref())?;
    let region = cli.region.or(resolved.source.region);
    let mut orchestrator = build_orchestrator(&resolved, region)?;
    let window = resolved.rolling_window;

    match cli.command {
        Commands::Sync(args) => {
            let riot_id: RiotId = args.player.parse()?;
            let mode = if args.force {
                SyncMode::ForceFull
            } else if args.refresh {
                SyncMode::Refresh
            } else {
                SyncMode::Auto
            };
            let mut presenter = Presenter::new(output_mode, &riot_id, &orchestrator, window);
            let outcome = presenter.run(move |sink| orchestrator.sync(&riot_id, mode, sink))?;
            presenter.show(&outcome.session.records, "Sync finished. Press any key to exit.")?;
            print_sync(output_mode, &outcome)
        }
        Commands::More(args) => {
            let riot_id: RiotId = args.player.parse()?;
            let count = args.count.unwrap_or(resolved.policy.load_more_count);
            let mut presenter = Presenter::new(output_mode, &riot_id, &orchestrator, window);
            let (loaded, session) = presenter.run(move |sink| {
                orchestrator.sync(&riot_id, SyncMode::Auto, sink)?;
                let loaded = orchestrator.load_more(count, sink)?;
                let session = orchestrator
                    .session()
                    .cloned()
                    .ok_or(ArenaError::NoActiveSession)?;
                Ok((loaded, session))
            })?;
            presenter.show(&session.records, "Older matches loaded. Press any key to exit.")?;
            if output_mode == OutputMode::Json {
                JsonOutput::print_json(&loaded).into_diagnostic()
            } else {
                TextOutput::print_load_more(loaded).into_diagnostic()
            }
        }
        Commands::All(args) => {
            let riot_id: RiotId = args.player.parse()?;
            let mut presenter = Presenter::new(output_mode, &riot_id, &orchestrator, window);
            let outcome = presenter.run(move |sink| {
                orchestrator.sync(&riot_id, SyncMode::Auto, sink)?;
                let added = orchestrator.load_all(sink)?;
                let session = orchestrator
                    .session()
                    .cloned()
                    .ok_or(ArenaError::NoActiveSession)?;
                Ok(SyncOutcome {
                    action: SyncAction::Full,
                    new_records: added,
                    session,
                })
            })?;
            presenter.show(
                &outcome.session.records,
                "Full history loaded. Press any key to exit.",
            )?;
            print_sync(output_mode, &outcome)
        }
        Commands::Stats(args) => {
            let riot_id: RiotId = args.player.parse()?;
            let window = args.window.unwrap_or(window).max(1);
            let mut presenter = Presenter::new(output_mode, &riot_id, &orchestrator, window);
            let outcome =
                presenter.run(move |sink| orchestrator.sync(&riot_id, SyncMode::Auto, sink))?;
            presenter.show(&outcome.session.records, "Press any key to exit.")?;
            let report = build_report(
                outcome.session.records.records(),
                args.range,
                args.view,
                window,
                SystemClock.now_ms(),
            );
            if output_mode == OutputMode::Json {
                JsonOutput::print_stats(&report).into_diagnostic()
            } else {
                TextOutput::print_stats(&report).into_diagnostic()
            }
        }
        Commands::Export(args) => {
            let riot_id: RiotId = args.player.parse()?;
            let outcome = orchestrator.sync(&riot_id, SyncMode::Auto, &StderrProgress)?;
            let records = outcome.session.records.records();
            let progress = build_category_progress(records);
            let selected =
                filter_records(records, args.range, args.view, &progress, SystemClock.now_ms());
            let written = export_csv(&selected, &args.out)?;
            if output_mode == OutputMode::Json {
                JsonOutput::print_json(&serde_json::json!({
                    "path": args.out.as_str(),
                    "rows": written,
                }))
                .into_diagnostic()
            } else {
                println!("Exported {written} matches to {}", args.out);
                Ok(())
            }
        }
        Commands::Clear(args) => {
            let riot_id: RiotId = args.player.parse()?;
            if output_mode == OutputMode::Interactive {
                let mut tui = Tui::new(riot_id.to_string(), orchestrator.generation(), window);
                if !tui.confirm_clear(&riot_id.to_string())? {
                    println!("Clear cancelled.");
                    return Ok(());
                }
            }
            let identity = orchestrator.clear_for(&riot_id)?;
            if output_mode == OutputMode::Json {
                JsonOutput::print_json(&serde_json::json!({
                    "player": identity.display(),
                    "cleared": true,
                }))
                .into_diagnostic()
            } else {
                println!("Cleared cached matches for {}", identity.display());
                Ok(())
            }
        }
        Commands::Match(args) => {
            let payload = orchestrator.fetch_match(&args.id)?;
            JsonOutput::print_json(&payload).into_diagnostic()
        }
    }
}

fn build_orchestrator(
    resolved: &ResolvedConfig,
    region: Option<Region>,
) -> miette::Result<LiveOrchestrator> {
    let blobs = match &resolved.cache_dir {
        Some(dir) => FileBlobStore::new_with_root(dir.clone()),
        None => FileBlobStore::new()?,
    };
    let fetcher = RateLimitedFetcher::new(
        ReqwestTransport::new()?,
        ThreadSleeper,
        RetryPolicy::default(),
    );
    let mut settings = resolved.source.clone();
    settings.region = region;
    let source = HttpMatchSource::new(fetcher, settings);
    Ok(
        SyncOrchestrator::new(source, SnapshotStore::new(blobs), ThreadSleeper, SystemClock)
            .with_policy(resolved.policy.clone())
            .with_tuning(resolved.tuning.clone())
            .with_region(region),
    )
}

fn print_sync(output_mode: OutputMode, outcome: &SyncOutcome) -> miette::Result<()> {
    if output_mode == OutputMode::Json {
        JsonOutput::print_sync(outcome).into_diagnostic()
    } else {
        TextOutput::print_sync(outcome).into_diagnostic()
    }
}

/// Picks where progress goes: the dashboard, stderr lines, or nowhere.
struct Presenter {
    mode: OutputMode,
    tui: Option<Tui>,
}

impl Presenter {
    fn new(
        mode: OutputMode,
        riot_id: &RiotId,
        orchestrator: &LiveOrchestrator,
        window: usize,
    ) -> Self {
        let tui = (mode == OutputMode::Interactive)
            .then(|| Tui::new(riot_id.to_string(), orchestrator.generation(), window));
        Self { mode, tui }
    }

    fn run<F, R>(&mut self, f: F) -> miette::Result<R>
    where
        F: FnOnce(&dyn ProgressSink) -> Result<R, ArenaError> + Send + 'static,
        R: Send + 'static,
    {
        match (&mut self.tui, self.mode) {
            (Some(tui), _) => tui.run(f),
            (None, OutputMode::Json) => f(&JsonOutput).map_err(miette::Report::new),
            (None, _) => f(&StderrProgress).map_err(miette::Report::new),
        }
    }

    fn show(&mut self, records: &RecordSet, status: &str) -> miette::Result<()> {
        match &mut self.tui {
            Some(tui) => tui.show(records, status),
            None => Ok(()),
        }
    }
}
