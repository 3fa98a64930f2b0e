//! CLI integration tests.
//!
//! Tests cover:
//! - Config loading and command-line overrides
//! - Repeated `run` invocations over real INI and CSV files on disk
//! - The `show` view of the persisted checkpoint
//! - Non-incremental mode and exit codes

mod common;

use common::*;
use incremental::adapters::file_config_adapter::FileConfigAdapter;
use incremental::cli::{self, Overrides};
use incremental::domain::checkpoint::RunMode;
use incremental::domain::error::IncrementalError;
use incremental::ports::config_port::ConfigPort;
use std::path::Path;
use std::process::ExitCode;
use tempfile::TempDir;

fn ini(data: &Path, persist: Option<&Path>, end: &str) -> String {
    let incremental = match persist {
        Some(folder) => format!(
            "[incremental]\nrecorder = disk\npersist_folder = {}\nstrategy_id = 7\n",
            folder.display()
        ),
        None => String::new(),
    };
    format!(
        "[backtest]
start_date = 2024-01-01
end_date = {end}
frequency = 1d
initial_capital = 10000

[data]
path = {}
code = AAA
benchmark = IDX

[calendar]
session_open = 09:30
session_close = 16:00

{incremental}",
        data.display()
    )
}

// ExitCode has no PartialEq; compare the debug rendering.
fn same_exit(a: ExitCode, b: u8) -> bool {
    format!("{a:?}") == format!("{:?}", ExitCode::from(b))
}

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    /// Bar file covering January 2024 up to `last_bar`.
    fn new(last_bar: u32) -> Self {
        let dir = TempDir::new().unwrap();
        let ws = Workspace { dir };
        ws.write_bars(last_bar);
        ws
    }

    fn write_bars(&self, last_bar: u32) {
        std::fs::write(
            self.data_path(),
            bar_csv(date(2024, 1, 1), date(2024, 1, last_bar)),
        )
        .unwrap();
    }

    fn data_path(&self) -> std::path::PathBuf {
        self.dir.path().join("bars.csv")
    }

    fn persist(&self) -> std::path::PathBuf {
        self.dir.path().join("state")
    }

    fn config(&self, end: &str, overrides: &Overrides) -> FileConfigAdapter {
        let path = self.dir.path().join("run.ini");
        std::fs::write(&path, ini(&self.data_path(), Some(&self.persist()), end)).unwrap();
        cli::load_config(&path, overrides).unwrap()
    }
}

mod config_loading {
    use super::*;

    #[test]
    fn overrides_take_precedence() {
        let ws = Workspace::new(31);
        let overrides = Overrides {
            persist_folder: Some(ws.dir.path().join("elsewhere")),
            strategy_id: Some("override".into()),
            recorder: Some("csv".into()),
            end_date: Some(date(2024, 1, 19)),
        };
        let config = ws.config("2024-01-05", &overrides);
        assert_eq!(
            config.get_string("incremental", "strategy_id"),
            Some("override".into())
        );
        assert_eq!(
            config.get_string("backtest", "end_date"),
            Some("2024-01-19".into())
        );
        assert_eq!(config.get_string("incremental", "recorder"), Some("csv".into()));
    }

    #[test]
    fn missing_config_file_is_parse_error() {
        let err = cli::load_config(Path::new("/nonexistent/run.ini"), &Overrides::default())
            .err()
            .unwrap();
        assert!(matches!(err, IncrementalError::ConfigParse { .. }));
        assert!(same_exit(ExitCode::from(&err), 2));
    }

    #[test]
    fn missing_data_section_is_reported() {
        let ws = Workspace::new(31);
        let path = ws.dir.path().join("bad.ini");
        std::fs::write(
            &path,
            "[backtest]\nstart_date = 2024-01-01\nend_date = 2024-01-05\n",
        )
        .unwrap();
        let config = cli::load_config(&path, &Overrides::default()).unwrap();
        let err = cli::execute_run(&config, run_time(1)).err().unwrap();
        assert!(matches!(
            err,
            IncrementalError::ConfigMissing { ref section, ref key } if section == "data" && key == "path"
        ));
    }
}

mod runs {
    use super::*;

    #[test]
    fn consecutive_runs_resume_and_checkpoint() {
        let ws = Workspace::new(31);

        let first = cli::execute_run(&ws.config("2024-01-05", &Overrides::default()), run_time(1))
            .unwrap();
        assert_eq!(first.mode, Some(RunMode::Fresh));
        assert_eq!(first.report.settled.len(), 5);
        assert_eq!(first.report.trades, 1);
        assert!(ws.persist().join("persist/7/meta.json").is_file());
        assert!(ws.persist().join("persist/7/host_state.json").is_file());

        let second = cli::execute_run(&ws.config("2024-01-12", &Overrides::default()), run_time(2))
            .unwrap();
        assert_eq!(second.mode, Some(RunMode::Resume));
        assert_eq!(second.report.suppressed, 1);
        assert_eq!(second.report.trades, 0);
        assert_eq!(second.report.settled.len(), 5);

        let view = cli::show_checkpoint(&ws.config("2024-01-12", &Overrides::default())).unwrap();
        let meta = view.meta.unwrap();
        assert_eq!(view.backend, "disk");
        assert_eq!(view.strategy_id, "7");
        assert_eq!(meta.last_end_time, date(2024, 1, 12));
        assert_eq!(meta.origin_start_date, date(2024, 1, 1));
        assert_eq!(view.snapshots, 10);
        assert_eq!(view.benchmark_snapshots, 10);
        assert_eq!(view.trades, 1);
    }

    #[test]
    fn run_ending_on_a_weekend_resumes() {
        let ws = Workspace::new(31);

        // 2024-01-06 is a Saturday; the last settled session is Friday.
        let first = cli::execute_run(&ws.config("2024-01-06", &Overrides::default()), run_time(1))
            .unwrap();
        assert_eq!(first.window.unwrap().end, date(2024, 1, 6));
        assert_eq!(first.report.settled.last(), Some(&date(2024, 1, 5)));

        let second = cli::execute_run(&ws.config("2024-01-12", &Overrides::default()), run_time(2))
            .unwrap();
        assert_eq!(second.mode, Some(RunMode::Resume));
        assert_eq!(second.window.unwrap().start, date(2024, 1, 7));
        assert_eq!(second.report.suppressed, 1);
        assert_eq!(second.report.trades, 0);
        assert_eq!(
            second.report.settled,
            (8..=12).map(|d| date(2024, 1, d)).collect::<Vec<_>>()
        );

        let view = cli::show_checkpoint(&ws.config("2024-01-12", &Overrides::default())).unwrap();
        assert_eq!(view.meta.unwrap().last_end_time, date(2024, 1, 12));
        assert_eq!(view.snapshots, 10);
        assert_eq!(view.trades, 1);
    }

    #[test]
    fn rerun_with_same_end_date_is_rejected() {
        let ws = Workspace::new(31);
        let config = ws.config("2024-01-05", &Overrides::default());
        cli::execute_run(&config, run_time(1)).unwrap();

        let err = cli::execute_run(&config, run_time(2)).err().unwrap();
        assert!(matches!(err, IncrementalError::NoProgress { .. }));
        assert!(same_exit(ExitCode::from(&err), 3));
    }

    #[test]
    fn end_date_override_extends_the_sequence() {
        let ws = Workspace::new(31);
        let config = ws.config("2024-01-05", &Overrides::default());
        cli::execute_run(&config, run_time(1)).unwrap();

        let extended = ws.config(
            "2024-01-05",
            &Overrides {
                end_date: Some(date(2024, 1, 10)),
                ..Overrides::default()
            },
        );
        let summary = cli::execute_run(&extended, run_time(2)).unwrap();
        let window = summary.window.unwrap();
        assert_eq!(window.start, date(2024, 1, 6));
        assert_eq!(window.end, date(2024, 1, 10));
    }

    #[test]
    fn window_stops_at_last_bar_and_resumes_when_data_arrives() {
        let ws = Workspace::new(10);
        let config = ws.config("2024-01-31", &Overrides::default());

        let first = cli::execute_run(&config, run_time(1)).unwrap();
        assert_eq!(first.window.unwrap().end, date(2024, 1, 10));

        ws.write_bars(17);
        let second = cli::execute_run(&config, run_time(2)).unwrap();
        let window = second.window.unwrap();
        assert_eq!(window.start, date(2024, 1, 11));
        assert_eq!(window.end, date(2024, 1, 17));
    }

    #[test]
    fn strategies_keep_separate_checkpoints() {
        let ws = Workspace::new(31);
        let a = Overrides {
            strategy_id: Some("a".into()),
            ..Overrides::default()
        };
        let b = Overrides {
            strategy_id: Some("b".into()),
            ..Overrides::default()
        };
        cli::execute_run(&ws.config("2024-01-05", &a), run_time(1)).unwrap();
        let other = cli::execute_run(&ws.config("2024-01-05", &b), run_time(1)).unwrap();
        assert_eq!(other.mode, Some(RunMode::Fresh));
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn sqlite_recorder_round_trip() {
        let ws = Workspace::new(31);
        let db = ws.dir.path().join("runs.db");
        let path = ws.dir.path().join("sqlite.ini");
        std::fs::write(
            &path,
            format!(
                "{}\n[incremental]\nrecorder = MongodbRecorder\nstrategy_id = 3\n\n[sqlite]\npath = {}\n",
                ini(&ws.data_path(), None, "2024-01-05"),
                db.display()
            ),
        )
        .unwrap();
        let config = cli::load_config(&path, &Overrides::default()).unwrap();
        cli::execute_run(&config, run_time(1)).unwrap();

        let config = cli::load_config(
            &path,
            &Overrides {
                end_date: Some(date(2024, 1, 12)),
                ..Overrides::default()
            },
        )
        .unwrap();
        let second = cli::execute_run(&config, run_time(2)).unwrap();
        assert_eq!(second.mode, Some(RunMode::Resume));

        let view = cli::show_checkpoint(&config).unwrap();
        assert_eq!(view.backend, "sqlite");
        assert_eq!(view.meta.unwrap().last_end_time, date(2024, 1, 12));
    }
}

mod non_incremental {
    use super::*;

    #[test]
    fn runs_full_range_without_persisting() {
        let ws = Workspace::new(31);
        let path = ws.dir.path().join("plain.ini");
        std::fs::write(&path, ini(&ws.data_path(), None, "2024-01-12")).unwrap();
        let config = cli::load_config(&path, &Overrides::default()).unwrap();

        for _ in 0..2 {
            let summary = cli::execute_run(&config, run_time(1)).unwrap();
            assert_eq!(summary.mode, None);
            assert_eq!(summary.report.settled.len(), 10);
        }
        assert!(!ws.persist().exists());
    }

    #[test]
    fn show_requires_incremental_config() {
        let ws = Workspace::new(31);
        let path = ws.dir.path().join("plain.ini");
        std::fs::write(&path, ini(&ws.data_path(), None, "2024-01-12")).unwrap();
        let config = cli::load_config(&path, &Overrides::default()).unwrap();
        assert!(matches!(
            cli::show_checkpoint(&config),
            Err(IncrementalError::ConfigMissing { .. })
        ));
    }
}
