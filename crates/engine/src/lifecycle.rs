use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, RwLock};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use common::{EngineCommand, EngineState, ReportSink};
use strategy::StrategyRunner;

use crate::binance::ClockSync;

/// Cloneable handle passed to other crates (Telegram, Ctrl-C handler).
#[derive(Clone)]
pub struct EngineHandle {
    command_tx: mpsc::Sender<EngineCommand>,
    state: Arc<RwLock<EngineState>>,
    cycles: Arc<AtomicU64>,
}

impl EngineHandle {
    pub async fn send(&self, cmd: EngineCommand) {
        let _ = self.command_tx.send(cmd).await;
    }

    pub async fn state(&self) -> EngineState {
        *self.state.read().await
    }

    /// Completed cycles since the engine started.
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }
}

/// The main loop: evaluates every instrument once per cycle and hands the
/// results to the report sinks.
pub struct Engine {
    runner: StrategyRunner,
    sinks: Vec<Arc<dyn ReportSink>>,
    cycle: Duration,
    clock: Option<(Arc<ClockSync>, Duration)>,
    state: Arc<RwLock<EngineState>>,
    cycles: Arc<AtomicU64>,
    command_rx: mpsc::Receiver<EngineCommand>,
}

impl Engine {
    pub fn new(runner: StrategyRunner, sinks: Vec<Arc<dyn ReportSink>>, cycle: Duration) -> (Self, EngineHandle) {
        let (command_tx, command_rx) = mpsc::channel(32);
        let state = Arc::new(RwLock::new(EngineState::Stopped));
        let cycles = Arc::new(AtomicU64::new(0));

        let handle = EngineHandle {
            command_tx,
            state: state.clone(),
            cycles: cycles.clone(),
        };

        let engine = Engine {
            runner,
            sinks,
            cycle,
            clock: None,
            state,
            cycles,
            command_rx,
        };

        (engine, handle)
    }

    /// Resync `clock` before a cycle whenever the last sync is older than
    /// `max_age`.
    pub fn with_clock_resync(mut self, clock: Arc<ClockSync>, max_age: Duration) -> Self {
        self.clock = Some((clock, max_age));
        self
    }

    /// Run until `Stop` arrives or every handle is dropped. Call from
    /// `tokio::spawn`.
    ///
    /// The first cycle starts immediately. Commands are only read between
    /// cycles, so a `Stop` sent mid-cycle lets that cycle finish and report.
    pub async fn run(mut self) {
        *self.state.write().await = EngineState::Running;
        info!(
            instruments = self.runner.instruments().len(),
            cycle_secs = self.cycle.as_secs_f64(),
            "Engine running"
        );

        let mut ticker = tokio::time::interval(self.cycle);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                cmd = self.command_rx.recv() => match cmd {
                    Some(EngineCommand::Stop) => {
                        info!("Stop requested");
                        break;
                    }
                    Some(EngineCommand::Pause) => {
                        let mut state = self.state.write().await;
                        if *state == EngineState::Running {
                            info!("Engine paused, cycles suspended");
                            *state = EngineState::Paused;
                        }
                    }
                    Some(EngineCommand::Resume) => {
                        let mut state = self.state.write().await;
                        if *state == EngineState::Paused {
                            info!("Engine resumed");
                            *state = EngineState::Running;
                        }
                    }
                    None => {
                        warn!("Engine command channel closed, shutting down");
                        break;
                    }
                },

                _ = ticker.tick() => {
                    if *self.state.read().await == EngineState::Paused {
                        debug!("Paused, skipping cycle");
                        continue;
                    }
                    self.run_cycle().await;
                }
            }
        }

        *self.state.write().await = EngineState::Stopped;
        info!(cycles = self.cycles.load(Ordering::Relaxed), "Engine stopped");
    }

    async fn run_cycle(&self) {
        if let Some((clock, max_age)) = &self.clock {
            if clock.is_stale(*max_age) {
                if let Err(e) = clock.sync().await {
                    warn!(error = %e, "Clock resync failed, keeping previous offset");
                }
            }
        }

        let results = self.runner.run_cycle().await;
        for (symbol, result) in results {
            match result {
                Ok(report) => {
                    for sink in &self.sinks {
                        if let Err(e) = sink.report(&report).await {
                            warn!(symbol = %symbol, error = %e, "Report sink failed");
                        }
                    }
                }
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, transient = e.is_transient(), "Evaluation failed");
                    let message = e.to_string();
                    for sink in &self.sinks {
                        if let Err(e) = sink.report_failure(&symbol, &message).await {
                            warn!(symbol = %symbol, error = %e, "Report sink failed");
                        }
                    }
                }
            }
        }

        let n = self.cycles.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(cycle = n, "Cycle complete");
    }
}
