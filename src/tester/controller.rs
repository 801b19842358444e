use std::sync::Arc;

use chrono::Utc;
use log::{info, warn};
use tokio::{
    sync::{mpsc, oneshot, watch, Mutex},
    task::JoinHandle,
    time::{self, Instant, Interval, MissedTickBehavior},
};

use crate::reports::Report;
use crate::workload::WorkloadKind;

use super::{LiveState, StartRejection, TesterEngine};

enum Command {
    Start {
        workload: WorkloadKind,
        reply: oneshot::Sender<Result<(), StartRejection>>,
    },
    Stop {
        reply: oneshot::Sender<Option<Report>>,
    },
    Shutdown,
}

/// Handle to the coordinating task.
///
/// The task owns the [`TesterEngine`]; the ambient poll timer, the per-test
/// sampling timer and lifecycle commands are all serialized onto it, so the
/// published state has exactly one writer. Readers get it through a
/// `watch` channel.
#[derive(Clone)]
pub struct TesterController {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<LiveState>,
    worker: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl TesterController {
    /// Spawns the coordinating task on the current runtime.
    pub fn spawn(engine: TesterEngine) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let state = engine.subscribe();
        let handle = tokio::spawn(coordinate(engine, command_rx));

        Self {
            commands: command_tx,
            state,
            worker: Arc::new(Mutex::new(Some(handle))),
        }
    }

    pub fn snapshot(&self) -> LiveState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<LiveState> {
        self.state.clone()
    }

    pub async fn start_test(&self, workload: WorkloadKind) -> Result<(), StartRejection> {
        let (reply, response) = oneshot::channel();
        if self.commands.send(Command::Start { workload, reply }).is_err() {
            return Err(StartRejection::Unavailable);
        }
        response.await.unwrap_or(Err(StartRejection::Unavailable))
    }

    /// Returns the terminal report, or `None` if no test was running.
    pub async fn stop_test(&self) -> Option<Report> {
        let (reply, response) = oneshot::channel();
        self.commands.send(Command::Stop { reply }).ok()?;
        response.await.ok().flatten()
    }

    /// Stops any running test, then ends the coordinating task.
    pub async fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(handle) = self.worker.lock().await.take() {
            if let Err(err) = handle.await {
                warn!("tester task failed to join: {err}");
            }
        }
    }
}

async fn coordinate(mut engine: TesterEngine, mut commands: mpsc::UnboundedReceiver<Command>) {
    let mut poll = time::interval(engine.settings().poll_interval());
    poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let sample_interval = engine.settings().sample_interval();
    let mut sampler: Option<Interval> = None;

    loop {
        tokio::select! {
            _ = poll.tick() => {
                engine.poll_power(Utc::now());
            }
            _ = next_tick(&mut sampler) => {
                engine.sample_tick(Utc::now());
            }
            command = commands.recv() => match command {
                Some(Command::Start { workload, reply }) => {
                    let result = engine.start_test(workload, Utc::now());
                    if result.is_ok() {
                        let mut ticker = time::interval_at(Instant::now() + sample_interval, sample_interval);
                        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                        sampler = Some(ticker);
                    }
                    let _ = reply.send(result);
                }
                Some(Command::Stop { reply }) => {
                    sampler = None;
                    let _ = reply.send(engine.stop_test(Utc::now()));
                }
                Some(Command::Shutdown) | None => {
                    engine.stop_test(Utc::now());
                    break;
                }
            }
        }

        // A critical abort ends the test from inside the poll branch.
        if !engine.is_running() {
            sampler = None;
        }
    }

    info!("tester task shutting down");
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}
