//! Reactive scheduler: debounced, single-flight pipeline runs.
//!
//! Every trigger resets a quiet window; when it elapses the pipeline runs
//! once against whatever payload is current at that moment. A trigger that
//! arrives while a run is in progress schedules exactly one follow-up run.
//!
//! The scheduler is a tokio task. It owns the [`PipelineState`] and lends
//! it to each run, so there is never more than one run touching it.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::candidates::subtree_has_candidate;
use crate::dom::{Document, MutationRecord};
use crate::payload::PayloadStore;
use crate::pipeline::{run_pipeline, PipelineState};
use crate::status::{StatusDisplay, StatusSnapshot};
use crate::triggers::Trigger;
use crate::types::{EnricherError, EnricherResult, RunReport};

/// The live document, shared between the host and the scheduler.
pub type SharedDocument = Arc<Mutex<Document>>;

/// Where the debouncer is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    /// A run is due at the deadline.
    Scheduled(Instant),
    Running,
}

/// `Idle → Scheduled → Running → Idle` with a single pending-rerun flag.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    phase: Phase,
    rerun: bool,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            phase: Phase::Idle,
            rerun: false,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn deadline(&self) -> Option<Instant> {
        match self.phase {
            Phase::Scheduled(at) => Some(at),
            _ => None,
        }
    }

    /// Whether a trigger arrived during the current run.
    pub fn rerun_pending(&self) -> bool {
        self.rerun
    }

    /// Record a trigger. Restarts the quiet window, or marks a rerun when
    /// a run is in progress.
    pub fn trigger(&mut self, now: Instant) {
        match self.phase {
            Phase::Idle | Phase::Scheduled(_) => self.phase = Phase::Scheduled(now + self.window),
            Phase::Running => self.rerun = true,
        }
    }

    pub fn is_due(&self, now: Instant) -> bool {
        matches!(self.phase, Phase::Scheduled(at) if at <= now)
    }

    /// Enter `Running`, dropping any pending deadline. Returns `false` when
    /// a run is already in progress.
    pub fn begin(&mut self) -> bool {
        if self.phase == Phase::Running {
            return false;
        }
        self.phase = Phase::Running;
        true
    }

    /// Leave `Running`. A trigger seen during the run schedules the next
    /// one a full window from `now`; returns whether that happened.
    pub fn finish(&mut self, now: Instant) -> bool {
        if self.phase != Phase::Running {
            return false;
        }
        if std::mem::take(&mut self.rerun) {
            self.phase = Phase::Scheduled(now + self.window);
            true
        } else {
            self.phase = Phase::Idle;
            false
        }
    }
}

enum Command {
    Trigger(Trigger),
    RunNow(oneshot::Sender<RunReport>),
    Shutdown,
}

struct Finished {
    state: PipelineState,
    report: RunReport,
}

/// Cloneable handle to a running scheduler.
#[derive(Clone)]
pub struct SchedulerHandle {
    commands: mpsc::UnboundedSender<Command>,
    stats: watch::Receiver<Option<RunReport>>,
}

impl SchedulerHandle {
    /// Ask for a debounced run.
    pub fn trigger(&self, trigger: Trigger) -> EnricherResult<()> {
        self.commands
            .send(Command::Trigger(trigger))
            .map_err(|_| EnricherError::SchedulerStopped)
    }

    /// Run now, skipping the quiet window. If a run is in progress the
    /// request runs right after it. Resolves to that run's report.
    pub async fn run_now(&self) -> EnricherResult<RunReport> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::RunNow(tx))
            .map_err(|_| EnricherError::SchedulerStopped)?;
        rx.await.map_err(|_| EnricherError::SchedulerStopped)
    }

    /// Report of the most recent run, updated after every run.
    pub fn stats(&self) -> watch::Receiver<Option<RunReport>> {
        self.stats.clone()
    }

    pub fn last_report(&self) -> Option<RunReport> {
        self.stats.borrow().clone()
    }

    /// Stop the scheduler task. An in-flight run still completes.
    pub fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
    }
}

/// The scheduler task's state.
pub struct Scheduler {
    document: SharedDocument,
    store: Arc<PayloadStore>,
    status: Arc<dyn StatusDisplay>,
    debouncer: Debouncer,
    ancestor_limit: usize,
    /// `None` while lent to a run.
    state: Option<PipelineState>,
    commands: mpsc::UnboundedReceiver<Command>,
    mutations: mpsc::UnboundedReceiver<MutationRecord>,
    mutations_open: bool,
    /// Mutations seen mid-run, checked once the run releases the document.
    held_mutations: Vec<MutationRecord>,
    done_tx: mpsc::UnboundedSender<Finished>,
    done_rx: mpsc::UnboundedReceiver<Finished>,
    waiters: Vec<oneshot::Sender<RunReport>>,
    queued_waiters: Vec<oneshot::Sender<RunReport>>,
    stats: watch::Sender<Option<RunReport>>,
}

impl Scheduler {
    /// Start the scheduler task on the current runtime.
    pub fn spawn(
        document: SharedDocument,
        mutations: mpsc::UnboundedReceiver<MutationRecord>,
        store: Arc<PayloadStore>,
        status: Arc<dyn StatusDisplay>,
        window: Duration,
        state: PipelineState,
    ) -> (SchedulerHandle, JoinHandle<()>) {
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        let (stats_tx, stats_rx) = watch::channel(None);

        let scheduler = Scheduler {
            document,
            store,
            status,
            debouncer: Debouncer::new(window),
            ancestor_limit: state.ancestor_limit(),
            state: Some(state),
            commands,
            mutations,
            mutations_open: true,
            held_mutations: Vec::new(),
            done_tx,
            done_rx,
            waiters: Vec::new(),
            queued_waiters: Vec::new(),
            stats: stats_tx,
        };
        let task = tokio::spawn(scheduler.run());

        (
            SchedulerHandle {
                commands: commands_tx,
                stats: stats_rx,
            },
            task,
        )
    }

    async fn run(mut self) {
        tracing::debug!(window_ms = self.debouncer.window().as_millis() as u64, "scheduler started");
        loop {
            let deadline = self.debouncer.deadline();
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Trigger(trigger)) => self.on_trigger(trigger),
                    Some(Command::RunNow(reply)) => self.on_run_now(reply),
                    Some(Command::Shutdown) | None => break,
                },
                record = self.mutations.recv(), if self.mutations_open => match record {
                    Some(record) => self.on_mutation(record).await,
                    None => self.mutations_open = false,
                },
                _ = time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.start_run();
                }
                Some(finished) = self.done_rx.recv() => self.on_finished(finished).await,
            }
        }
        tracing::debug!("scheduler stopped");
    }

    fn on_trigger(&mut self, trigger: Trigger) {
        tracing::debug!(%trigger, phase = ?self.debouncer.phase(), "run requested");
        self.debouncer.trigger(Instant::now());
    }

    fn on_run_now(&mut self, reply: oneshot::Sender<RunReport>) {
        if self.debouncer.phase() == Phase::Running {
            self.queued_waiters.push(reply);
        } else {
            self.waiters.push(reply);
            self.start_run();
        }
    }

    async fn on_mutation(&mut self, record: MutationRecord) {
        if self.debouncer.phase() == Phase::Running {
            self.held_mutations.push(record);
            return;
        }
        if self.is_relevant(std::slice::from_ref(&record)).await {
            self.on_trigger(Trigger::Mutation);
        }
    }

    /// Whether any added subtree carries a candidate entry.
    async fn is_relevant(&self, records: &[MutationRecord]) -> bool {
        let doc = self.document.lock().await;
        records
            .iter()
            .flat_map(|r| r.added.iter())
            .any(|&id| subtree_has_candidate(&doc, id))
    }

    fn start_run(&mut self) {
        if !self.debouncer.begin() {
            return;
        }
        let mut state = self
            .state
            .take()
            .unwrap_or_else(|| PipelineState::new(self.ancestor_limit));
        // Read at fire time, never at schedule time.
        let payload = self.store.latest();
        let document = Arc::clone(&self.document);
        let done = self.done_tx.clone();

        tokio::task::spawn_blocking(move || {
            let outcome = {
                let mut doc = document.blocking_lock();
                catch_unwind(AssertUnwindSafe(|| {
                    run_pipeline(&mut doc, payload.as_deref(), &mut state)
                }))
            };
            let report = outcome.unwrap_or_else(|_| {
                tracing::error!("pipeline run panicked");
                RunReport::default()
            });
            let _ = done.send(Finished { state, report });
        });
    }

    async fn on_finished(&mut self, finished: Finished) {
        let Finished { state, report } = finished;
        self.state = Some(state);

        self.stats.send_replace(Some(report.clone()));
        self.status.update(&StatusSnapshot::from_report(&report));
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(report.clone());
        }

        if self.debouncer.finish(Instant::now()) {
            tracing::debug!("rerun scheduled after in-flight run");
        }

        let held = std::mem::take(&mut self.held_mutations);
        if !held.is_empty() && self.is_relevant(&held).await {
            self.on_trigger(Trigger::Mutation);
        }

        if !self.queued_waiters.is_empty() {
            self.waiters = std::mem::take(&mut self.queued_waiters);
            self.start_run();
        }
    }
}
