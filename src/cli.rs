//! CLI definition and dispatch.

use chrono::{NaiveDate, NaiveDateTime};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::rc::Rc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::adapters::backend::{open_backend, open_store};
use crate::adapters::csv_adapter::CsvBarAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::replay_host::{HostSettings, ReplayHost, RunReport};
use crate::adapters::store_recorder::StoreRecorder;
use crate::adapters::weekday_calendar::WeekdayCalendar;
use crate::domain::checkpoint::{CheckpointMeta, RunMode};
use crate::domain::context::RunContext;
use crate::domain::error::IncrementalError;
use crate::domain::event_source::EventSource;
use crate::domain::orchestrator::{CheckpointParams, Orchestrator, RunOutcome};
use crate::domain::settings::{BackendSettings, RunSettings};
use crate::domain::window::{EventWindow, WindowResolver};
use crate::ports::config_port::ConfigPort;
use crate::ports::recorder_port::Recorder;

#[derive(Parser, Debug)]
#[command(name = "incremental", about = "Checkpointed, resumable simulation runs")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Flags that take precedence over the config file.
#[derive(Args, Debug, Default, Clone)]
pub struct Overrides {
    #[arg(long)]
    pub persist_folder: Option<PathBuf>,
    #[arg(long)]
    pub strategy_id: Option<String>,
    #[arg(long)]
    pub recorder: Option<String>,
    #[arg(long)]
    pub end_date: Option<NaiveDate>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Replay the next window and checkpoint it
    Run {
        #[arg(short, long)]
        config: PathBuf,
        #[command(flatten)]
        overrides: Overrides,
    },
    /// Show the stored checkpoint and history sizes
    Show {
        #[arg(short, long)]
        config: PathBuf,
        #[command(flatten)]
        overrides: Overrides,
    },
}

/// Install the stderr subscriber. `RUST_LOG` overrides the default `info`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Run { config, overrides } => load_config(&config, &overrides).and_then(|adapter| {
            let now = chrono::Local::now().naive_local();
            execute_run(&adapter, now).map(|summary| print_run_summary(&summary))
        }),
        Command::Show { config, overrides } => load_config(&config, &overrides)
            .and_then(|adapter| show_checkpoint(&adapter))
            .map(|view| print_checkpoint(&view)),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn load_config(path: &Path, overrides: &Overrides) -> Result<FileConfigAdapter, IncrementalError> {
    let mut adapter =
        FileConfigAdapter::from_file(path).map_err(|e| IncrementalError::ConfigParse {
            file: path.display().to_string(),
            reason: e.to_string(),
        })?;
    apply_overrides(&mut adapter, overrides);
    Ok(adapter)
}

pub fn apply_overrides(adapter: &mut FileConfigAdapter, overrides: &Overrides) {
    if let Some(folder) = &overrides.persist_folder {
        adapter.set("incremental", "persist_folder", &folder.display().to_string());
    }
    if let Some(id) = &overrides.strategy_id {
        adapter.set("incremental", "strategy_id", id);
    }
    if let Some(recorder) = &overrides.recorder {
        adapter.set("incremental", "recorder", recorder);
    }
    if let Some(end) = overrides.end_date {
        adapter.set("backtest", "end_date", &end.to_string());
    }
}

/// Outcome of one `run` invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// `None` when incremental mode is not configured.
    pub mode: Option<RunMode>,
    pub window: Option<EventWindow>,
    pub report: RunReport,
}

/// Replay the configured bar file. With a backend configured the run resumes
/// from, and checkpoints to, the persisted state; otherwise it replays the
/// whole configured range.
pub fn execute_run(
    config: &dyn ConfigPort,
    now: NaiveDateTime,
) -> Result<RunSummary, IncrementalError> {
    let settings = RunSettings::from_config(config)?;
    let calendar = Rc::new(WeekdayCalendar::from_config(config)?);

    let data_path = config.require_string("data", "path")?;
    let code = config.require_string("data", "code")?;
    let benchmark = config
        .get_string("data", "benchmark")
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    let index_code = benchmark.clone().unwrap_or_else(|| code.clone());
    let bars = Rc::new(CsvBarAdapter::new(PathBuf::from(data_path), &index_code));

    let host_settings = HostSettings {
        code,
        benchmark,
        initial_capital: settings.initial_capital,
    };

    let Some(backend) = &settings.backend else {
        info!("incremental mode not configured; replaying the full range");
        let mut ctx = RunContext::new(calendar.clone(), bars.clone(), settings.start_date);
        let window = WindowResolver::new(settings.start_date, settings.end_date, settings.frequency)
            .resolve(bars.as_ref())?;
        let events = EventSource::new(calendar, window, settings.frequency);
        let mut host = ReplayHost::new(host_settings, bars);
        host.initialize(&mut ctx)?;
        let report = host.run(&mut ctx, events)?;
        return Ok(RunSummary {
            mode: None,
            window: Some(window),
            report,
        });
    };

    let mut orch = Orchestrator::new(
        CheckpointParams::from_settings(&settings, backend.strategy_id()),
        now,
    );
    orch.configure(open_backend(backend, settings.risk_free_rate)?)?;

    let driven = drive(&mut orch, calendar, bars, host_settings);
    let outcome = match &driven {
        Ok(_) => RunOutcome::Success,
        Err(e) => {
            warn!(error = %e, "run failed");
            RunOutcome::Failure
        }
    };
    let torn_down = orch.tear_down(outcome);

    let report = driven?;
    torn_down?;
    Ok(RunSummary {
        mode: orch.mode(),
        window: orch.window(),
        report,
    })
}

fn drive(
    orch: &mut Orchestrator,
    calendar: Rc<WeekdayCalendar>,
    bars: Rc<CsvBarAdapter>,
    host_settings: HostSettings,
) -> Result<RunReport, IncrementalError> {
    orch.start()?;
    let event_start = orch.event_start().ok_or_else(|| IncrementalError::Lifecycle {
        reason: "run planned without an event start".into(),
    })?;

    let mut ctx = RunContext::new(calendar, bars.clone(), event_start);
    orch.attach(&mut ctx)?;

    let store = orch.store().ok_or_else(|| IncrementalError::Lifecycle {
        reason: "no persist store configured".into(),
    })?;
    let mut host = ReplayHost::new(host_settings, bars).with_store(store);
    host.initialize(&mut ctx)?;
    if let Some(last) = orch.last_processed() {
        host.restore(&mut ctx, last)?;
    }

    let events = orch.events(&ctx)?;
    host.run(&mut ctx, events)
}

fn print_run_summary(summary: &RunSummary) {
    let mode = match summary.mode {
        Some(RunMode::Fresh) => "fresh",
        Some(RunMode::Resume) => "resume",
        None => "non-incremental",
    };
    println!("Mode:        {mode}");
    match summary.window {
        Some(w) if !w.is_empty() => println!("Window:      {} .. {}", w.start, w.end),
        _ => println!("Window:      (empty)"),
    }
    println!("Settled:     {}", summary.report.settled.len());
    println!("Suppressed:  {}", summary.report.suppressed);
    println!("Trades:      {}", summary.report.trades);
}

/// Persisted state as seen by `show`.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointView {
    pub backend: &'static str,
    pub strategy_id: String,
    pub meta: Option<CheckpointMeta>,
    pub trades: usize,
    pub snapshots: usize,
    pub benchmark_snapshots: usize,
}

pub fn show_checkpoint(config: &dyn ConfigPort) -> Result<CheckpointView, IncrementalError> {
    let backend = BackendSettings::from_config(config)?.ok_or_else(|| {
        IncrementalError::ConfigMissing {
            section: "incremental".into(),
            key: "persist_folder".into(),
        }
    })?;

    let (store, _) = open_store(&backend)?;
    let recorder = StoreRecorder::open(store.clone(), backend.strategy_id())?;
    let ledger = recorder.ledger();
    let view = CheckpointView {
        backend: backend.kind(),
        strategy_id: backend.strategy_id().to_string(),
        meta: recorder.load_meta()?,
        trades: ledger.trades.len(),
        snapshots: ledger.portfolio.len(),
        benchmark_snapshots: ledger.benchmark.len(),
    };
    store.close()?;
    Ok(view)
}

fn print_checkpoint(view: &CheckpointView) {
    println!("Backend:     {}", view.backend);
    println!("Strategy:    {}", view.strategy_id);
    match &view.meta {
        None => println!("Checkpoint:  none"),
        Some(meta) => {
            println!("Origin:      {}", meta.origin_start_date);
            println!("Start:       {}", meta.start_date);
            println!("End:         {}", meta.end_date);
            println!("Last end:    {}", meta.last_end_time);
            println!("Last run:    {}", meta.last_run_time);
        }
    }
    println!("Trades:      {}", view.trades);
    println!("Snapshots:   {}", view.snapshots);
    println!("Benchmark:   {}", view.benchmark_snapshots);
}
