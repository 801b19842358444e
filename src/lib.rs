pub mod estimator;
pub mod inhibitor;
#[cfg(target_os = "macos")]
mod macos_bridge;
pub mod metrics;
pub mod power;
pub mod reports;
pub mod settings;
pub mod tester;
pub mod utils;
pub mod workload;

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use tokio::runtime::Handle;

use estimator::format_hm;
use inhibitor::SystemSleepInhibitor;
use power::{PowerSource, SystemPowerSource};
use reports::{Report, ReportStore};
use settings::SettingsStore;
use tester::{EngineParts, TesterController, TesterEngine};
use utils::NarrativeLog;
use workload::{WorkloadKind, WorkloadRunner};

const DEFAULT_DATA_DIR: &str = "drainlab-data";

/// Where the tester keeps its files.
#[derive(Debug, Clone)]
pub struct AppPaths {
    data_dir: PathBuf,
}

impl AppPaths {
    /// Resolution order: explicit override, `DRAINLAB_DATA_DIR`, `./drainlab-data`.
    pub fn resolve(data_dir: Option<PathBuf>) -> Self {
        let data_dir = data_dir
            .or_else(|| std::env::var_os("DRAINLAB_DATA_DIR").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));
        Self { data_dir }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn ensure_exists(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir).with_context(|| {
            format!("Failed to create data directory {}", self.data_dir.display())
        })
    }

    pub fn settings_path(&self) -> PathBuf {
        self.data_dir.join("settings.json")
    }

    pub fn log_path(&self) -> PathBuf {
        self.data_dir.join("battery_test.log")
    }

    pub fn store(&self) -> ReportStore {
        ReportStore::new(&self.data_dir)
    }
}

#[derive(Parser)]
#[command(name = "drainlab", version, about = "Battery discharge tester")]
struct Cli {
    /// Directory for reports, settings and the test log.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Run a test until Ctrl-C or the critical battery floor.
    Run {
        #[arg(value_enum)]
        workload: WorkloadKind,
    },
    /// Print the current battery reading.
    Status,
    /// Print every saved report.
    History,
    /// Print the crash-recovery checkpoint, if any.
    Intermediate,
}

pub fn run_cli() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let paths = AppPaths::resolve(cli.data_dir);

    match cli.command {
        CliCommand::Run { workload } => {
            paths.ensure_exists()?;
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("Failed to build tokio runtime")?;
            runtime.block_on(run_test(paths, workload))
        }
        CliCommand::Status => {
            print_status();
            Ok(())
        }
        CliCommand::History => {
            let reports = paths.store().load_all();
            if reports.is_empty() {
                println!("No reports in {}", paths.data_dir().display());
            }
            for report in &reports {
                println!("{}", describe_report(report));
            }
            Ok(())
        }
        CliCommand::Intermediate => {
            match paths.store().load_intermediate() {
                Some(report) => println!("{}", serde_json::to_string_pretty(&report)?),
                None => println!("No intermediate checkpoint"),
            }
            Ok(())
        }
    }
}

async fn run_test(paths: AppPaths, workload: WorkloadKind) -> Result<()> {
    log::info!("drainlab starting up, data in {}", paths.data_dir().display());

    let settings_store = SettingsStore::new(paths.settings_path())?;
    if let Err(err) = settings_store.write_if_missing() {
        log::warn!("Could not write default settings: {err:#}");
    }
    let settings = settings_store.tester().with_env_overrides();

    let engine = TesterEngine::new(EngineParts {
        settings: settings.clone(),
        power: Box::new(SystemPowerSource::new()),
        inhibitor: Box::new(SystemSleepInhibitor::new()),
        workloads: Box::new(WorkloadRunner::new(settings, Handle::current())),
        store: paths.store(),
        log: NarrativeLog::new(paths.log_path()),
    });
    let controller = TesterController::spawn(engine);

    // Start needs a reading; the first ambient poll fires immediately.
    let mut state = controller.subscribe();
    state
        .changed()
        .await
        .context("tester stopped before the first battery poll")?;

    if let Err(rejection) = controller.start_test(workload).await {
        controller.shutdown().await;
        return Err(anyhow!(rejection));
    }
    println!("Running {workload}; press Ctrl-C to stop");

    let report = loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(err) = signal {
                    log::error!("Failed to listen for Ctrl-C: {err}");
                }
                break controller.stop_test().await;
            }
            changed = state.changed() => {
                if changed.is_err() {
                    break None;
                }
                let live = state.borrow_and_update().clone();
                if !live.test_in_progress() {
                    break live.last_report;
                }
            }
        }
    };

    controller.shutdown().await;

    match report {
        Some(report) => println!("{}", describe_report(&report)),
        None => println!("Test ended without a report"),
    }
    Ok(())
}

fn print_status() {
    match SystemPowerSource::new().poll() {
        Some(snapshot) => {
            println!(
                "Battery: {}%{}",
                snapshot.rounded_percent(),
                if snapshot.is_charging { " (charging)" } else { "" }
            );
            match snapshot.os_estimated_seconds_remaining {
                Some(secs) => println!("OS estimate: {}", format_hm(secs as f64)),
                None => println!("OS estimate: unavailable"),
            }
        }
        None => println!("No battery reading available"),
    }
}

fn describe_report(report: &Report) -> String {
    format!(
        "{} {} [{}] {:.1}% over {}, {:.2}%/h ({:.0}% -> {:.0}%)",
        report.start_time.format("%Y-%m-%d %H:%M"),
        report.workload,
        report.outcome.as_str(),
        report.percentage_drop(),
        format_hm(report.duration_secs()),
        report.drain_rate_per_hour(),
        report.initial_fraction_charged * 100.0,
        report.final_fraction_charged * 100.0,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use reports::ReportOutcome;

    #[test]
    fn explicit_data_dir_wins() {
        let paths = AppPaths::resolve(Some(PathBuf::from("/tmp/drainlab-explicit")));
        assert_eq!(paths.data_dir(), Path::new("/tmp/drainlab-explicit"));
        assert_eq!(
            paths.log_path(),
            PathBuf::from("/tmp/drainlab-explicit/battery_test.log")
        );
        assert_eq!(
            paths.settings_path(),
            PathBuf::from("/tmp/drainlab-explicit/settings.json")
        );
    }

    #[test]
    fn report_description_includes_rate_and_levels() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let report = Report::new(
            ReportOutcome::Completed,
            start,
            start + Duration::hours(2),
            0.9,
            0.7,
            WorkloadKind::HeavyLoad,
            start + Duration::hours(5),
            18_000.0,
        );

        let line = describe_report(&report);
        assert!(line.contains("[Completed]"), "{line}");
        assert!(line.contains("20.0% over 2h 0m"), "{line}");
        assert!(line.contains("10.00%/h"), "{line}");
        assert!(line.contains("(90% -> 70%)"), "{line}");
    }
}
