use chrono::Utc;
use rand::Rng;
use std::collections::BTreeMap;
use std::future::pending;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{sleep, timeout, Sleep};

use crate::config::AppConfig;
use crate::events::{EventBus, QueueEvent};
use crate::extraction::select_best;
use crate::models::{RunConfig, RunOptions, RunPhase, RunState, StatusSnapshot, TaskResult};
use crate::persistence::{spawn_persister, StateStore};
use crate::scraper::NavigationProvider;
use crate::search::build_search_url;
use crate::utils::error::{AppError, Result};
use crate::utils::metrics::{outcome, ANOMALIES_TOTAL, CURSOR, TASKS_TOTAL};

#[derive(Debug, Clone)]
pub struct QueueSettings {
    pub load_timeout: Duration,
    pub resume_on_restore: bool,
    pub command_buffer: usize,
    pub event_buffer: usize,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            load_timeout: Duration::from_secs(8),
            resume_on_restore: false,
            command_buffer: 32,
            event_buffer: 256,
        }
    }
}

impl QueueSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            load_timeout: config.scraper.load_timeout(),
            resume_on_restore: config.queue.resume_on_restore,
            command_buffer: config.queue.command_buffer,
            event_buffer: config.queue.event_buffer,
        }
    }
}

/// Scales `base_ms` by a uniform factor in `[0.8, 1.2]`.
pub fn jittered_delay<R: Rng + ?Sized>(base_ms: u64, rng: &mut R) -> Duration {
    let factor: f64 = rng.gen_range(0.8..=1.2);
    Duration::from_millis((base_ms as f64 * factor).round() as u64)
}

enum CommandKind {
    Start { items: Vec<String>, options: RunOptions },
    Pause,
    Resume,
    Stop,
    Shutdown,
}

struct Command {
    kind: CommandKind,
    ack: oneshot::Sender<RunPhase>,
}

/// Cloneable control surface of a running [`QueueScheduler`].
#[derive(Clone)]
pub struct SchedulerHandle {
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<Arc<RunState>>,
    events: EventBus,
}

impl SchedulerHandle {
    async fn send(&self, kind: CommandKind) -> Result<RunPhase> {
        let (ack, rx) = oneshot::channel();
        self.commands
            .send(Command { kind, ack })
            .await
            .map_err(|_| AppError::SchedulerUnavailable)?;
        rx.await.map_err(|_| AppError::SchedulerUnavailable)
    }

    /// Replaces any current run with `items`, resolved against the
    /// configured defaults.
    pub async fn start(&self, items: Vec<String>, options: RunOptions) -> Result<RunPhase> {
        self.send(CommandKind::Start { items, options }).await
    }

    pub async fn pause(&self) -> Result<RunPhase> {
        self.send(CommandKind::Pause).await
    }

    pub async fn resume(&self) -> Result<RunPhase> {
        self.send(CommandKind::Resume).await
    }

    pub async fn stop(&self) -> Result<RunPhase> {
        self.send(CommandKind::Stop).await
    }

    /// Stops the scheduler loop. The in-flight task, if any, is awaited and
    /// the latest state is flushed to the store.
    pub async fn shutdown(&self) -> Result<()> {
        self.send(CommandKind::Shutdown).await.map(|_| ())
    }

    pub fn state(&self) -> Arc<RunState> {
        self.snapshots.borrow().clone()
    }

    pub fn status(&self) -> StatusSnapshot {
        self.state().status()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.events.subscribe()
    }

    /// Receiver that observes every published state snapshot.
    pub fn watch_state(&self) -> watch::Receiver<Arc<RunState>> {
        self.snapshots.clone()
    }
}

pub struct QueueScheduler {
    defaults: RunConfig,
    settings: QueueSettings,
    provider: Arc<dyn NavigationProvider>,
    store: Arc<dyn StateStore>,
}

impl QueueScheduler {
    pub fn new(
        defaults: RunConfig,
        settings: QueueSettings,
        provider: Arc<dyn NavigationProvider>,
        store: Arc<dyn StateStore>,
    ) -> Self {
        Self {
            defaults: defaults.normalized(),
            settings,
            provider,
            store,
        }
    }

    /// Restores the last persisted run and starts the scheduler loop.
    pub async fn spawn(self) -> (SchedulerHandle, JoinHandle<()>) {
        let restored = match self.store.restore().await {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!("Failed to restore run state, starting idle: {}", e);
                None
            }
        };

        let mut state = restored
            .map(RunState::sanitized)
            .unwrap_or_else(|| RunState::idle(self.defaults.clone()));

        let was_running = state.phase == RunPhase::Running;
        let auto_resume = was_running && self.settings.resume_on_restore;
        if was_running && !auto_resume {
            state.phase = RunPhase::Paused;
        }
        if was_running {
            tracing::info!(
                "Restored interrupted run at {}/{} ({})",
                state.cursor,
                state.total(),
                state.phase
            );
        }

        let (command_tx, command_rx) = mpsc::channel(self.settings.command_buffer.max(1));
        let (snapshot_tx, snapshot_rx) = watch::channel(Arc::new(state.clone()));
        let events = EventBus::new(self.settings.event_buffer);
        let persister = spawn_persister(self.store.clone(), snapshot_rx.clone());

        let runner = QueueRunner {
            state,
            defaults: self.defaults,
            settings: self.settings,
            provider: self.provider,
            events: events.clone(),
            snapshots: snapshot_tx,
            persister,
            commands: command_rx,
            in_flight: None,
            delay: None,
            epoch: 0,
        };

        let handle = SchedulerHandle {
            commands: command_tx,
            snapshots: snapshot_rx,
            events,
        };

        let join = tokio::spawn(runner.run(was_running, auto_resume));
        (handle, join)
    }
}

enum TaskOutcome {
    Priced(Option<TaskResult>),
    Anomaly,
    Failed(AppError),
}

struct InFlight {
    epoch: u64,
    cursor: usize,
    task: String,
    handle: JoinHandle<TaskOutcome>,
}

struct QueueRunner {
    state: RunState,
    defaults: RunConfig,
    settings: QueueSettings,
    provider: Arc<dyn NavigationProvider>,
    events: EventBus,
    snapshots: watch::Sender<Arc<RunState>>,
    persister: JoinHandle<()>,
    commands: mpsc::Receiver<Command>,
    in_flight: Option<InFlight>,
    delay: Option<Pin<Box<Sleep>>>,
    /// Bumped by every start; outcomes from an older epoch are discarded.
    epoch: u64,
}

async fn join_in_flight(in_flight: &mut Option<InFlight>) -> std::result::Result<TaskOutcome, JoinError> {
    match in_flight {
        Some(flight) => (&mut flight.handle).await,
        None => pending().await,
    }
}

async fn wait_delay(delay: &mut Option<Pin<Box<Sleep>>>) {
    match delay {
        Some(sleep) => sleep.as_mut().await,
        None => pending().await,
    }
}

async fn run_task(provider: Arc<dyn NavigationProvider>, url: String, load_timeout: Duration) -> TaskOutcome {
    let page = match provider.open_page(&url).await {
        Ok(page) => page,
        Err(e) => return TaskOutcome::Failed(e),
    };

    if timeout(load_timeout, provider.wait_until_loaded(&page, load_timeout))
        .await
        .is_err()
    {
        tracing::debug!("Load ceiling reached for {}, extracting anyway", url);
    }

    let extraction = provider.run_extraction(&page).await;

    if let Err(e) = provider.close_page(&page).await {
        tracing::debug!("Ignoring page close failure: {}", e);
    }

    match extraction {
        Ok(extraction) if extraction.anomaly => TaskOutcome::Anomaly,
        Ok(extraction) => TaskOutcome::Priced(extraction.grouped.as_ref().and_then(select_best)),
        Err(e) => TaskOutcome::Failed(e),
    }
}

impl QueueRunner {
    async fn run(mut self, republish: bool, auto_resume: bool) {
        if republish {
            self.publish();
        }
        if auto_resume {
            self.kick();
        }

        loop {
            tokio::select! {
                biased;

                command = self.commands.recv() => match command {
                    Some(command) => {
                        if !self.handle_command(command) {
                            break;
                        }
                    }
                    None => break,
                },
                joined = join_in_flight(&mut self.in_flight) => self.finish_task(joined),
                _ = wait_delay(&mut self.delay) => {
                    self.delay = None;
                    self.kick();
                }
            }
        }

        if let Some(flight) = self.in_flight.take() {
            let _ = flight.handle.await;
        }

        let QueueRunner {
            snapshots, persister, ..
        } = self;
        drop(snapshots);
        let _ = persister.await;
        tracing::info!("Queue scheduler stopped");
    }

    /// Returns false when the loop should exit.
    fn handle_command(&mut self, command: Command) -> bool {
        let Command { kind, ack } = command;
        match kind {
            CommandKind::Start { items, options } => self.start(items, options),
            CommandKind::Pause => {
                if self.state.phase == RunPhase::Running {
                    self.delay = None;
                    self.transition(RunPhase::Paused);
                    tracing::info!("Queue paused at {}/{}", self.state.cursor, self.state.total());
                }
            }
            CommandKind::Resume => {
                if self.state.phase == RunPhase::Paused {
                    self.transition(RunPhase::Running);
                    tracing::info!("Queue resumed at {}/{}", self.state.cursor, self.state.total());
                    self.kick();
                }
            }
            CommandKind::Stop => {
                self.delay = None;
                if self.state.phase != RunPhase::Stopped {
                    self.transition(RunPhase::Stopped);
                    tracing::info!("Queue stopped at {}/{}", self.state.cursor, self.state.total());
                }
            }
            CommandKind::Shutdown => {
                let _ = ack.send(self.state.phase);
                return false;
            }
        }
        let _ = ack.send(self.state.phase);
        true
    }

    fn start(&mut self, items: Vec<String>, options: RunOptions) {
        let config = options.resolve(&self.defaults);
        let queue = config.limit_items(items);

        self.epoch += 1;
        self.delay = None;
        let previous = self.state.phase;
        tracing::info!(
            "Starting queue of {} tasks (engine: {}, delay: {}ms)",
            queue.len(),
            config.engine,
            config.delay_ms
        );

        self.state = RunState {
            phase: RunPhase::Running,
            original_items: queue.clone(),
            queue,
            cursor: 0,
            config,
            results: BTreeMap::new(),
            updated_at: Utc::now(),
        };
        self.publish();
        if previous != RunPhase::Running {
            self.events.emit(QueueEvent::StateChanged { phase: RunPhase::Running });
        }
        metrics::gauge!(CURSOR).set(0.0);
        self.kick();
    }

    /// Publishes the new phase; `state_changed` only goes out when it differs.
    fn transition(&mut self, phase: RunPhase) {
        let previous = std::mem::replace(&mut self.state.phase, phase);
        self.publish();
        if previous != phase {
            self.events.emit(QueueEvent::StateChanged { phase });
        }
    }

    /// Starts the task at the cursor if the run is active and nothing is in
    /// flight, or completes the run when the queue is exhausted.
    fn kick(&mut self) {
        if self.state.phase != RunPhase::Running || self.in_flight.is_some() {
            return;
        }
        self.delay = None;

        let Some(task) = self.state.current_task().map(str::to_string) else {
            self.complete();
            return;
        };

        let url = build_search_url(&task, &self.state.config);
        tracing::debug!("Task {}/{}: {}", self.state.cursor + 1, self.state.total(), url);

        let handle = tokio::spawn(run_task(self.provider.clone(), url, self.settings.load_timeout));
        self.in_flight = Some(InFlight {
            epoch: self.epoch,
            cursor: self.state.cursor,
            task,
            handle,
        });
    }

    fn complete(&mut self) {
        tracing::info!(
            "Queue finished: {} of {} tasks priced",
            self.state.results.len(),
            self.state.total()
        );
        self.transition(RunPhase::Idle);
        self.events.emit(QueueEvent::Done);
    }

    fn finish_task(&mut self, joined: std::result::Result<TaskOutcome, JoinError>) {
        let Some(flight) = self.in_flight.take() else {
            return;
        };
        if flight.epoch != self.epoch {
            tracing::debug!("Discarding outcome of '{}' from a previous run", flight.task);
            self.kick();
            return;
        }

        let task_outcome = joined.unwrap_or_else(|e| {
            TaskOutcome::Failed(AppError::navigation(format!("Task pipeline aborted: {}", e)))
        });

        let result = match task_outcome {
            TaskOutcome::Anomaly => {
                metrics::counter!(ANOMALIES_TOTAL).increment(1);
                tracing::warn!("Challenge page on '{}', pausing queue", flight.task);
                self.delay = None;
                self.events.emit(QueueEvent::AnomalyDetected {
                    cursor: flight.cursor,
                    task: flight.task,
                });
                if self.state.phase == RunPhase::Running {
                    self.transition(RunPhase::Paused);
                } else {
                    self.publish();
                }
                return;
            }
            TaskOutcome::Priced(Some(result)) => {
                metrics::counter!(TASKS_TOTAL, "outcome" => outcome::PRICED).increment(1);
                tracing::info!(
                    "'{}': {} {}..{} (avg {})",
                    flight.task,
                    result.currency,
                    result.min,
                    result.max,
                    result.avg
                );
                self.state.results.insert(flight.task.clone(), result.clone());
                Some(result)
            }
            TaskOutcome::Priced(None) => {
                metrics::counter!(TASKS_TOTAL, "outcome" => outcome::EMPTY).increment(1);
                tracing::info!("'{}': no prices found", flight.task);
                None
            }
            TaskOutcome::Failed(e) => {
                metrics::counter!(TASKS_TOTAL, "outcome" => outcome::FAILED).increment(1);
                tracing::warn!("Task '{}' failed: {}", flight.task, e);
                None
            }
        };

        self.state.cursor = flight.cursor + 1;
        metrics::gauge!(CURSOR).set(self.state.cursor as f64);
        self.publish();
        self.events.emit(QueueEvent::Progress {
            cursor: self.state.cursor,
            total: self.state.total(),
            task: flight.task,
            result,
        });

        if self.state.phase != RunPhase::Running {
            return;
        }
        if self.state.is_exhausted() {
            self.complete();
        } else {
            let delay = jittered_delay(self.state.config.delay_ms, &mut rand::thread_rng());
            tracing::debug!("Next task in {:?}", delay);
            self.delay = Some(Box::pin(sleep(delay)));
        }
    }

    fn publish(&mut self) {
        self.state.updated_at = Utc::now();
        self.snapshots.send_replace(Arc::new(self.state.clone()));
    }
}
