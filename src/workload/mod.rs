//! Synthetic workloads that speed up battery discharge.
//!
//! Every driver of a test shares one [`CancellationToken`]. Async drivers
//! race it against their sleeps; thread drivers check it once per loop pass,
//! so after [`Workloads::stop`] at most the pass already in flight completes.

mod browsing;
mod heavy_load;
mod video;

use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    thread,
};

use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use crate::settings::TesterSettings;

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, clap::ValueEnum,
)]
#[serde(rename_all = "camelCase")]
pub enum WorkloadKind {
    /// Nothing beyond holding off idle sleep.
    KeepAwake,
    /// Periodic fetches from a fixed list of sites.
    Browsing,
    /// Blurred full-HD frames at ~30 fps.
    VideoPlayback,
    /// Every core busy with trig, plus memory churn.
    HeavyLoad,
}

impl WorkloadKind {
    pub fn description(&self) -> &'static str {
        match self {
            WorkloadKind::KeepAwake => "Screen On",
            WorkloadKind::Browsing => "Browsing",
            WorkloadKind::VideoPlayback => "Video",
            WorkloadKind::HeavyLoad => "Heavy Load",
        }
    }
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// What the tester engine needs from the workload layer.
pub trait Workloads: Send {
    fn start(&mut self, kind: WorkloadKind);
    /// Requests cancellation of every driver started so far. Does not wait
    /// for the drivers to exit.
    fn stop(&mut self);
}

/// Iterations completed by one driver.
#[derive(Debug, Clone)]
pub struct IterationCounter {
    name: String,
    count: Arc<AtomicU64>,
}

impl IterationCounter {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            count: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub(crate) fn bump(&self) {
        self.count.fetch_add(1, Ordering::Relaxed);
    }
}

enum DriverTask {
    Async(tokio::task::JoinHandle<()>),
    Thread(thread::JoinHandle<()>),
}

pub struct WorkloadRunner {
    settings: TesterSettings,
    runtime: Handle,
    http: reqwest::Client,
    cancel_token: Option<CancellationToken>,
    tasks: Vec<DriverTask>,
    counters: Vec<IterationCounter>,
}

impl WorkloadRunner {
    pub fn new(settings: TesterSettings, runtime: Handle) -> Self {
        Self {
            settings,
            runtime,
            http: reqwest::Client::new(),
            cancel_token: None,
            tasks: Vec::new(),
            counters: Vec::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.cancel_token.is_some()
    }

    /// Counters of the drivers of the current (or last) run.
    pub fn counters(&self) -> &[IterationCounter] {
        &self.counters
    }

    pub fn total_iterations(&self) -> u64 {
        self.counters.iter().map(IterationCounter::get).sum()
    }

    /// Drivers that have not exited yet.
    pub fn live_drivers(&self) -> usize {
        self.tasks
            .iter()
            .filter(|task| match task {
                DriverTask::Async(handle) => !handle.is_finished(),
                DriverTask::Thread(handle) => !handle.is_finished(),
            })
            .count()
    }

    fn spawn_thread<F>(&mut self, name: String, token: &CancellationToken, body: F)
    where
        F: FnOnce(CancellationToken, IterationCounter) + Send + 'static,
    {
        let counter = IterationCounter::new(name.clone());
        let token = token.clone();
        let counter_for_thread = counter.clone();

        match thread::Builder::new()
            .name(format!("drainlab-{name}"))
            .spawn(move || body(token, counter_for_thread))
        {
            Ok(handle) => {
                self.tasks.push(DriverTask::Thread(handle));
                self.counters.push(counter);
            }
            Err(err) => log_warn!("failed to spawn {name} driver: {err}"),
        }
    }
}

impl Workloads for WorkloadRunner {
    fn start(&mut self, kind: WorkloadKind) {
        if self.cancel_token.is_some() {
            log_warn!("workload already running; stopping it before starting {kind}");
            self.stop();
        }

        let token = CancellationToken::new();
        self.counters.clear();

        match kind {
            WorkloadKind::KeepAwake => {}
            WorkloadKind::Browsing => {
                let counter = IterationCounter::new("browsing");
                let handle = self.runtime.spawn(browsing::browsing_loop(
                    self.http.clone(),
                    self.settings.browsing.clone(),
                    token.clone(),
                    counter.clone(),
                ));
                self.tasks.push(DriverTask::Async(handle));
                self.counters.push(counter);
            }
            WorkloadKind::VideoPlayback => {
                let video = self.settings.video.clone();
                self.spawn_thread("video".into(), &token, move |token, counter| {
                    video::video_loop(video, token, counter)
                });
            }
            WorkloadKind::HeavyLoad => {
                let cores = thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1);
                for core in 0..cores {
                    let iterations = self.settings.heavy_load.trig_iterations_per_pass;
                    self.spawn_thread(format!("cpu-{core}"), &token, move |token, counter| {
                        heavy_load::cpu_loop(iterations, token, counter)
                    });
                }

                let memory = self.settings.heavy_load.clone();
                self.spawn_thread("memory".into(), &token, move |token, counter| {
                    heavy_load::memory_loop(memory, token, counter)
                });
            }
        }

        log_info!("started {kind} workload with {} driver(s)", self.tasks.len());
        self.cancel_token = Some(token);
    }

    fn stop(&mut self) {
        let Some(token) = self.cancel_token.take() else {
            return;
        };
        log_info!("cancelling {} live driver(s)", self.live_drivers());
        token.cancel();

        for counter in &self.counters {
            log_info!("{} driver stopped after {} iteration(s)", counter.name(), counter.get());
        }

        // Drivers see the token within one pass; nothing waits for them here.
        self.tasks.clear();
    }
}

impl Drop for WorkloadRunner {
    fn drop(&mut self) {
        self.stop();
    }
}
