//! Worker process supervision.
//!
//! Each agent owns one slot guarded by an async mutex, so lifecycle
//! operations on the same agent are serialized while different agents
//! proceed independently. A running worker is owned by its monitor task;
//! the slot keeps only the pid and the channels needed to stop it.

use std::{
    collections::BTreeMap,
    fmt, io,
    process::ExitStatus,
    sync::{
        Arc, Weak,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use atro_config::{Config, WorkerCommand};
use atro_model::{
    AgentCategory, AgentId, AgentPatch, AgentStatus, DashboardEvent,
};
use chrono::Utc;
use dashmap::DashMap;
use futures::future::join_all;
use thiserror::Error;
use tokio::{
    process::Child,
    sync::{Mutex, oneshot, watch},
};
use tracing::{debug, error, info, warn};

use crate::{
    CoreError, EventBus,
    cache::{ContextCache, namespaces},
    store::EventStore,
};

mod ingest;
pub mod protocol;
pub mod state;
pub mod worker;

use ingest::Ingestor;
pub use protocol::{WorkerLine, parse_line};
pub use state::{WorkerSnapshot, WorkerState};
pub use worker::LineReader;

/// How long to wait for a killed worker to be reaped.
const KILL_WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub workers: BTreeMap<AgentCategory, WorkerCommand>,
    /// Time between SIGTERM and a forced kill.
    pub grace_period: Duration,
    /// Exported to workers as `REDIS_URL` when set.
    pub redis_url: Option<String>,
}

impl SupervisorConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            workers: config.agents.workers.clone(),
            grace_period: config.agents.grace_period,
            redis_url: config.redis_url().map(str::to_string),
        }
    }
}

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("agent {0} not found")]
    UnknownAgent(AgentId),

    #[error("no worker program configured for agent {agent_id} ({category})")]
    NoWorkerProgram {
        agent_id: AgentId,
        category: AgentCategory,
    },

    #[error("failed to launch worker for agent {agent_id}: {source}")]
    Launch {
        agent_id: AgentId,
        #[source]
        source: io::Error,
    },

    #[error("failed to stop worker for agent {agent_id}: {reason}")]
    Signal { agent_id: AgentId, reason: String },

    #[error(transparent)]
    Store(#[from] CoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    AlreadyStopped,
}

/// Result of a multi-agent start or stop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub changed: Vec<AgentId>,
    pub unchanged: Vec<AgentId>,
    pub failed: Vec<(AgentId, String)>,
}

impl BatchOutcome {
    /// Failures count: a failed start leaves the agent in `error`.
    pub fn needs_broadcast(&self) -> bool {
        !self.changed.is_empty() || !self.failed.is_empty()
    }
}

struct RunningProcess {
    pid: Option<u32>,
    stop_requested: Arc<AtomicBool>,
    kill_tx: Option<oneshot::Sender<()>>,
    exited: watch::Receiver<bool>,
}

#[derive(Default)]
struct AgentSlot {
    state: WorkerState,
    /// Identifies the process generation so a stale monitor cannot
    /// overwrite a newer run.
    run_id: u64,
    process: Option<RunningProcess>,
}

struct Inner {
    config: SupervisorConfig,
    store: Arc<dyn EventStore>,
    cache: Arc<dyn ContextCache>,
    bus: EventBus,
    slots: DashMap<AgentId, Arc<Mutex<AgentSlot>>>,
    next_run: AtomicU64,
}

#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<Inner>,
}

impl fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Supervisor")
            .field("slots", &self.inner.slots.len())
            .field("grace_period", &self.inner.config.grace_period)
            .finish()
    }
}

impl Supervisor {
    pub fn new(
        config: SupervisorConfig,
        store: Arc<dyn EventStore>,
        cache: Arc<dyn ContextCache>,
        bus: EventBus,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                store,
                cache,
                bus,
                slots: DashMap::new(),
                next_run: AtomicU64::new(0),
            }),
        }
    }

    /// Start one agent's worker and broadcast the agent list if anything
    /// changed.
    pub async fn start(
        &self,
        agent_id: AgentId,
    ) -> Result<StartOutcome, SupervisorError> {
        let result = self.start_one(agent_id).await;
        match &result {
            Ok(StartOutcome::AlreadyRunning)
            | Err(SupervisorError::UnknownAgent(_))
            | Err(SupervisorError::Store(_)) => {}
            _ => self.inner.broadcast_agents().await,
        }
        result
    }

    /// Stop one agent's worker; stopping a stopped agent succeeds.
    pub async fn stop(
        &self,
        agent_id: AgentId,
    ) -> Result<StopOutcome, SupervisorError> {
        let result = self.stop_one(agent_id).await;
        match &result {
            Ok(StopOutcome::Stopped) | Err(SupervisorError::Signal { .. }) => {
                self.inner.broadcast_agents().await
            }
            _ => {}
        }
        result
    }

    /// Start the given agents (all agents for `None` or an empty list).
    pub async fn start_many(
        &self,
        agent_ids: Option<&[AgentId]>,
    ) -> Result<BatchOutcome, SupervisorError> {
        let ids = self.resolve(agent_ids).await?;
        let results = join_all(ids.iter().map(|id| self.start_one(*id))).await;

        let mut outcome = BatchOutcome::default();
        for (id, result) in ids.into_iter().zip(results) {
            match result {
                Ok(StartOutcome::Started) => outcome.changed.push(id),
                Ok(StartOutcome::AlreadyRunning) => outcome.unchanged.push(id),
                Err(err) => {
                    warn!(agent_id = %id, error = %err, "failed to start agent");
                    outcome.failed.push((id, err.to_string()));
                }
            }
        }
        if outcome.needs_broadcast() {
            self.inner.broadcast_agents().await;
        }
        Ok(outcome)
    }

    /// Stop the given agents (all agents for `None` or an empty list).
    pub async fn stop_many(
        &self,
        agent_ids: Option<&[AgentId]>,
    ) -> Result<BatchOutcome, SupervisorError> {
        let ids = self.resolve(agent_ids).await?;
        let outcome = self.stop_ids(ids).await;
        if outcome.needs_broadcast() {
            self.inner.broadcast_agents().await;
        }
        Ok(outcome)
    }

    pub async fn start_all(&self) -> Result<BatchOutcome, SupervisorError> {
        self.start_many(None).await
    }

    pub async fn stop_all(&self) -> Result<BatchOutcome, SupervisorError> {
        self.stop_many(None).await
    }

    /// Stop every worker this supervisor launched. No broadcast.
    pub async fn shutdown(&self) -> BatchOutcome {
        let ids: Vec<AgentId> =
            self.inner.slots.iter().map(|entry| *entry.key()).collect();
        let outcome = self.stop_ids(ids).await;
        info!(
            stopped = outcome.changed.len(),
            failed = outcome.failed.len(),
            "supervisor shut down"
        );
        outcome
    }

    pub async fn state(&self, agent_id: AgentId) -> WorkerState {
        let Some(slot) = self.inner.slot_if_present(agent_id) else {
            return WorkerState::Stopped;
        };
        slot.lock().await.state
    }

    /// Supervisor-side view of every agent it has touched, by agent id.
    pub async fn snapshot(&self) -> Vec<WorkerSnapshot> {
        let slots: Vec<(AgentId, Arc<Mutex<AgentSlot>>)> = self
            .inner
            .slots
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect();

        let mut snapshot = Vec::with_capacity(slots.len());
        for (agent_id, slot) in slots {
            let slot = slot.lock().await;
            snapshot.push(WorkerSnapshot {
                agent_id,
                state: slot.state,
                pid: slot.process.as_ref().and_then(|process| process.pid),
            });
        }
        snapshot.sort_by_key(|entry| entry.agent_id);
        snapshot
    }

    async fn resolve(
        &self,
        agent_ids: Option<&[AgentId]>,
    ) -> Result<Vec<AgentId>, SupervisorError> {
        match agent_ids {
            Some(ids) if !ids.is_empty() => {
                let mut unique = Vec::with_capacity(ids.len());
                for id in ids {
                    if !unique.contains(id) {
                        unique.push(*id);
                    }
                }
                Ok(unique)
            }
            _ => Ok(self
                .inner
                .store
                .list_agents(None)
                .await?
                .into_iter()
                .map(|agent| agent.id)
                .collect()),
        }
    }

    async fn stop_ids(&self, ids: Vec<AgentId>) -> BatchOutcome {
        let results = join_all(ids.iter().map(|id| self.stop_one(*id))).await;

        let mut outcome = BatchOutcome::default();
        for (id, result) in ids.into_iter().zip(results) {
            match result {
                Ok(StopOutcome::Stopped) => outcome.changed.push(id),
                Ok(StopOutcome::AlreadyStopped) => outcome.unchanged.push(id),
                Err(err) => {
                    warn!(agent_id = %id, error = %err, "failed to stop agent");
                    outcome.failed.push((id, err.to_string()));
                }
            }
        }
        outcome
    }

    async fn start_one(
        &self,
        agent_id: AgentId,
    ) -> Result<StartOutcome, SupervisorError> {
        let agent = self
            .inner
            .store
            .get_agent(agent_id)
            .await?
            .ok_or(SupervisorError::UnknownAgent(agent_id))?;

        let slot = self.inner.slot(agent_id);
        let mut slot = slot.lock().await;
        if slot.state.is_running() {
            debug!(agent_id = %agent_id, "worker already running");
            return Ok(StartOutcome::AlreadyRunning);
        }
        slot.state = WorkerState::Starting;

        let Some(command) = self.inner.config.workers.get(&agent.category)
        else {
            warn!(agent_id = %agent_id, category = %agent.category, "no worker program configured");
            self.inner
                .enter(&mut slot, agent_id, WorkerState::Crashed)
                .await;
            return Err(SupervisorError::NoWorkerProgram {
                agent_id,
                category: agent.category,
            });
        };

        let mut child = match worker::spawn(
            command,
            &agent,
            self.inner.config.redis_url.as_deref(),
        ) {
            Ok(child) => child,
            Err(source) => {
                error!(agent_id = %agent_id, program = %command.program, error = %source, "failed to launch worker");
                self.inner
                    .enter(&mut slot, agent_id, WorkerState::Crashed)
                    .await;
                return Err(SupervisorError::Launch { agent_id, source });
            }
        };

        let run_id = self.inner.next_run.fetch_add(1, Ordering::Relaxed) + 1;
        let pid = child.id();

        if let Some(stdout) = child.stdout.take() {
            let ingestor = Ingestor {
                agent_id,
                agent_name: agent.name.clone(),
                store: Arc::clone(&self.inner.store),
                bus: self.inner.bus.clone(),
            };
            tokio::spawn(async move {
                let mut lines = LineReader::new(stdout);
                loop {
                    match lines.next_line().await {
                        Ok(Some(line)) => ingestor.ingest(&line).await,
                        Ok(None) => break,
                        Err(err) => {
                            warn!(agent_id = %agent_id, error = %err, "worker stdout read failed");
                            break;
                        }
                    }
                }
            });
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(worker::pump_stderr(
                agent_id,
                agent.name.clone(),
                stderr,
            ));
        }

        let stop_requested = Arc::new(AtomicBool::new(false));
        let (kill_tx, kill_rx) = oneshot::channel();
        let (exited_tx, exited_rx) = watch::channel(false);
        tokio::spawn(monitor(
            Arc::downgrade(&self.inner),
            agent_id,
            run_id,
            child,
            kill_rx,
            exited_tx,
            Arc::clone(&stop_requested),
        ));

        slot.run_id = run_id;
        slot.process = Some(RunningProcess {
            pid,
            stop_requested,
            kill_tx: Some(kill_tx),
            exited: exited_rx,
        });
        self.inner
            .enter(&mut slot, agent_id, WorkerState::Running)
            .await;
        info!(agent_id = %agent_id, agent = %agent.name, pid = ?pid, "worker started");
        Ok(StartOutcome::Started)
    }

    async fn stop_one(
        &self,
        agent_id: AgentId,
    ) -> Result<StopOutcome, SupervisorError> {
        let Some(slot) = self.inner.slot_if_present(agent_id) else {
            return match self.inner.store.get_agent(agent_id).await? {
                Some(_) => Ok(StopOutcome::AlreadyStopped),
                None => Err(SupervisorError::UnknownAgent(agent_id)),
            };
        };

        let mut slot = slot.lock().await;
        if !slot.state.is_running() {
            return Ok(StopOutcome::AlreadyStopped);
        }
        let Some(mut process) = slot.process.take() else {
            slot.state = WorkerState::Stopped;
            return Ok(StopOutcome::AlreadyStopped);
        };

        process.stop_requested.store(true, Ordering::SeqCst);
        let mut grace = self.inner.config.grace_period;
        if let Some(pid) = process.pid
            && let Err(reason) = worker::request_termination(pid)
        {
            warn!(agent_id = %agent_id, pid, reason = %reason, "SIGTERM failed; killing worker");
            grace = Duration::ZERO;
        }

        if !wait_exited(&mut process.exited, grace).await {
            info!(agent_id = %agent_id, "grace period elapsed; killing worker");
            if let Some(kill_tx) = process.kill_tx.take() {
                let _ = kill_tx.send(());
            }
            if !wait_exited(&mut process.exited, KILL_WAIT).await {
                self.inner
                    .enter(&mut slot, agent_id, WorkerState::Crashed)
                    .await;
                return Err(SupervisorError::Signal {
                    agent_id,
                    reason: "worker did not exit after kill".to_string(),
                });
            }
        }

        self.inner
            .enter(&mut slot, agent_id, WorkerState::Stopped)
            .await;
        info!(agent_id = %agent_id, "worker stopped");
        Ok(StopOutcome::Stopped)
    }
}

impl Inner {
    fn slot(&self, agent_id: AgentId) -> Arc<Mutex<AgentSlot>> {
        Arc::clone(self.slots.entry(agent_id).or_default().value())
    }

    fn slot_if_present(&self, agent_id: AgentId) -> Option<Arc<Mutex<AgentSlot>>> {
        self.slots
            .get(&agent_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Move to `state` and record the matching agent status in the store
    /// and the cache. Store and cache failures are logged only.
    async fn enter(
        &self,
        slot: &mut AgentSlot,
        agent_id: AgentId,
        state: WorkerState,
    ) {
        slot.state = state;
        if !state.is_running() {
            slot.process = None;
        }
        let Some(status) = state.agent_status() else {
            return;
        };

        let patch = if status == AgentStatus::Active {
            AgentPatch::status_active_at(status, Utc::now())
        } else {
            AgentPatch::status(status)
        };
        if let Err(err) = self.store.update_agent(agent_id, patch).await {
            warn!(agent_id = %agent_id, error = %err, "failed to record agent status");
        }

        if let Err(err) = self
            .cache
            .set(
                namespaces::AGENT_STATUS,
                &agent_id.to_string(),
                status.as_str(),
                None,
            )
            .await
        {
            debug!(agent_id = %agent_id, error = %err, "agent status not cached");
        }
    }

    async fn broadcast_agents(&self) {
        match self.store.list_agents(None).await {
            Ok(agents) => {
                self.bus.publish(DashboardEvent::AgentsStatus(agents));
            }
            Err(err) => warn!(error = %err, "failed to load agents for broadcast"),
        }
    }

    /// Record an exit nobody asked for.
    async fn handle_exit(
        &self,
        agent_id: AgentId,
        run_id: u64,
        status: io::Result<ExitStatus>,
    ) {
        let Some(slot) = self.slot_if_present(agent_id) else {
            return;
        };
        let mut slot = slot.lock().await;
        if slot.run_id != run_id || !slot.state.is_running() {
            return;
        }

        let next = match status {
            Ok(status) if status.success() => {
                info!(agent_id = %agent_id, "worker exited cleanly");
                WorkerState::Stopped
            }
            Ok(status) => {
                warn!(agent_id = %agent_id, code = ?status.code(), "worker exited unexpectedly");
                WorkerState::Crashed
            }
            Err(err) => {
                warn!(agent_id = %agent_id, error = %err, "failed to wait on worker");
                WorkerState::Crashed
            }
        };
        self.enter(&mut slot, agent_id, next).await;
        drop(slot);
        self.broadcast_agents().await;
    }
}

/// Own the child until it exits, killing it on request or when the
/// supervisor goes away.
async fn monitor(
    inner: Weak<Inner>,
    agent_id: AgentId,
    run_id: u64,
    mut child: Child,
    kill_rx: oneshot::Receiver<()>,
    exited: watch::Sender<bool>,
    stop_requested: Arc<AtomicBool>,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        _ = kill_rx => {
            if let Err(err) = child.kill().await {
                warn!(agent_id = %agent_id, error = %err, "failed to kill worker");
            }
            child.wait().await
        }
    };
    exited.send_replace(true);

    if stop_requested.load(Ordering::SeqCst) {
        return;
    }
    if let Some(inner) = inner.upgrade() {
        inner.handle_exit(agent_id, run_id, status).await;
    }
}

/// `true` once the monitor reports the exit (or is gone) within `limit`.
async fn wait_exited(exited: &mut watch::Receiver<bool>, limit: Duration) -> bool {
    tokio::time::timeout(limit, exited.wait_for(|done| *done))
        .await
        .is_ok()
}
