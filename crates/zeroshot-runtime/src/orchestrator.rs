//! The orchestrator: owner of the cluster registry and every running cluster.
//!
//! `start` wires a cluster together (ledger, bus, snapshotter, one wrapper
//! per agent), publishes the opening `ISSUE_OPENED`, and records the cluster
//! in `clusters.json`. A per-cluster watcher task finalizes the cluster when
//! its stop token fires: subscriptions dropped, snapshotter stopped, agents
//! drained, registry updated, ledger closed.
//!
//! The async [`create`] factory reopens persisted clusters from the registry
//! and replays the snapshotter bootstrap for each; a corrupt ledger aborts
//! loading that cluster only.
//!
//! [`create`]: Orchestrator::create

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use zeroshot_core::config::ClusterConfig;
use zeroshot_core::error::ConfigError;
use zeroshot_core::ids::ClusterId;
use zeroshot_core::message::{MessageContent, NewMessage};
use zeroshot_core::state::{AgentState, ClusterState};
use zeroshot_core::topic;
use zeroshot_core::validate::validate_config;
use zeroshot_events::bus::{MessageBus, Subscription};
use zeroshot_events::ledger::{Ledger, MessageQuery};

use crate::agent::{AgentStatus, AgentWrapper};
use crate::cluster::ClusterCore;
use crate::error::{Result, RuntimeError};
use crate::export;
use crate::registry::{ClusterRegistry, RegistryEntry};
use crate::runner::{TaskRequest, TaskResult, TaskRunner};
use crate::snapshotter::StateSnapshotter;

const DRAIN_POLL: Duration = Duration::from_millis(50);
const DRAIN_MAX_POLLS: u32 = 600;

/// Input that opens a cluster: the task text plus optional structured data.
#[derive(Clone, Debug, Default)]
pub struct StartInput {
    /// Task text (the issue body).
    pub text: String,
    /// Structured payload.
    pub data: Option<Value>,
    /// Where the task came from (`issue`, `text`); defaults to `text`.
    pub source: Option<String>,
}

/// Export format for transcripts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportFormat {
    /// Readable markdown transcript.
    Markdown,
}

/// Aggregate status of one cluster.
#[derive(Clone, Debug)]
pub struct ClusterStatus {
    /// Cluster id.
    pub id: String,
    /// Lifecycle state.
    pub state: ClusterState,
    /// Creation time, epoch millis.
    pub created_at: i64,
    /// Holder process id.
    pub pid: Option<u32>,
    /// Messages on the ledger.
    pub message_count: i64,
    /// Per-agent status.
    pub agents: Vec<AgentStatus>,
}

/// One cluster's runtime record.
struct ClusterRuntime {
    core: Arc<ClusterCore>,
    agents: Vec<Arc<AgentWrapper>>,
    snapshotter: Arc<StateSnapshotter>,
    subscriptions: Mutex<Vec<Subscription>>,
    pid: Option<u32>,
}

impl ClusterRuntime {
    fn detach(&self) {
        self.subscriptions.lock().clear();
        self.snapshotter.stop();
    }

    fn is_drained(&self) -> bool {
        self.agents.iter().all(|agent| {
            !matches!(
                agent.state(),
                AgentState::Executing | AgentState::BuildingContext
            )
        })
    }
}

/// Owner of clusters and the registry.
pub struct Orchestrator {
    storage_dir: PathBuf,
    registry: Arc<ClusterRegistry>,
    runner: Arc<dyn TaskRunner>,
    clusters: Mutex<HashMap<String, Arc<ClusterRuntime>>>,
    /// Self-reference handed to sub-cluster runners.
    weak: Weak<Orchestrator>,
}

impl Orchestrator {
    /// Create an orchestrator over `storage_dir` without loading persisted
    /// clusters. Use [`create`] to also reopen what the registry lists.
    ///
    /// [`create`]: Orchestrator::create
    pub fn new(storage_dir: impl Into<PathBuf>, runner: Arc<dyn TaskRunner>) -> Result<Arc<Self>> {
        let storage_dir = storage_dir.into();
        let registry = Arc::new(ClusterRegistry::open(&storage_dir)?);
        Ok(Arc::new_cyclic(|weak| Self {
            storage_dir,
            registry,
            runner,
            clusters: Mutex::new(HashMap::new()),
            weak: weak.clone(),
        }))
    }

    /// Async factory: open the registry and reopen every persisted cluster,
    /// replaying the snapshotter bootstrap for each. A cluster whose ledger
    /// cannot be opened is skipped with a warning; the rest stay usable.
    pub async fn create(
        storage_dir: impl Into<PathBuf>,
        runner: Arc<dyn TaskRunner>,
    ) -> Result<Arc<Self>> {
        let orchestrator = Self::new(storage_dir, runner)?;
        for entry in orchestrator.registry.list()? {
            if let Err(err) = orchestrator.load_cluster(&entry) {
                warn!(cluster = %entry.id, %err, "failed to reopen cluster; skipping");
            }
        }
        Ok(orchestrator)
    }

    /// The registry (shared with observers).
    #[must_use]
    pub fn registry(&self) -> &Arc<ClusterRegistry> {
        &self.registry
    }

    // ─── Lifecycle ───────────────────────────────────────────────────────

    /// Validate the config, wire up a new cluster, publish `ISSUE_OPENED`,
    /// and return the new cluster id.
    pub async fn start(
        &self,
        config: ClusterConfig,
        input: StartInput,
    ) -> Result<ClusterId> {
        let report = validate_config(&config);
        for warning in &report.warnings {
            warn!(%warning, "config warning");
        }
        if !report.is_valid() {
            return Err(ConfigError::Invalid(report.errors.join("; ")).into());
        }

        let id = ClusterId::generate();
        let created_at = chrono::Utc::now().timestamp_millis();
        let pid = std::process::id();

        let ledger = Arc::new(Ledger::open(&self.db_path(id.as_str()))?);
        let bus = Arc::new(MessageBus::new(ledger.clone()));
        let roles: HashMap<String, String> = config
            .agents
            .iter()
            .map(|a| (a.id.clone(), a.role.clone()))
            .collect();
        let core = ClusterCore::new(id.clone(), created_at, ledger, bus, roles);

        self.registry.upsert(RegistryEntry {
            id: id.to_string(),
            config: config.clone(),
            state: ClusterState::Initializing,
            created_at,
            pid: Some(pid),
        })?;

        // Snapshotter first: its subscription precedes the agents', so
        // STATE_SNAPSHOT lands before any agent output for the same event.
        let snapshotter = StateSnapshotter::new(core.bus.clone(), id.to_string());
        snapshotter.start()?;

        let mut agents = Vec::new();
        let mut subscriptions = Vec::new();
        for agent_config in &config.agents {
            let runner = self.runner_for(agent_config);
            let wrapper = AgentWrapper::new(agent_config.clone(), core.clone(), runner);
            subscriptions.push(subscribe_wrapper(&core.bus, &wrapper));
            agents.push(wrapper);
        }

        let runtime = Arc::new(ClusterRuntime {
            core: core.clone(),
            agents,
            snapshotter,
            subscriptions: Mutex::new(subscriptions),
            pid: Some(pid),
        });
        let _ = self
            .clusters
            .lock()
            .insert(id.to_string(), runtime.clone());

        self.spawn_stop_watcher(id.to_string(), runtime);

        let opening = NewMessage::broadcast(
            id.to_string(),
            topic::ISSUE_OPENED,
            "user",
            MessageContent {
                text: Some(input.text),
                data: input.data,
            },
        )
        .with_metadata(json!({
            "source": input.source.unwrap_or_else(|| "text".to_string())
        }));
        let _ = core.bus.publish(&opening)?;

        core.set_state(ClusterState::Running);
        self.registry.set_state(id.as_str(), ClusterState::Running)?;
        info!(cluster = %id, "cluster started");
        Ok(id)
    }

    /// Graceful stop: in-flight runs finish, then the cluster finalizes.
    pub fn stop(&self, id: &str) -> Result<()> {
        let runtime = self.get_runtime(id)?;
        let _ = runtime.core.request_stop();
        Ok(())
    }

    /// Forceful stop: abort runners, skip pending hooks.
    pub fn kill(&self, id: &str) -> Result<()> {
        let runtime = self.get_runtime(id)?;
        let _ = runtime.core.kill();
        Ok(())
    }

    /// Re-activate a persisted cluster: fresh core and agents over the
    /// existing ledger, snapshotter bootstrap from durable state, no new
    /// `ISSUE_OPENED`.
    pub async fn resume(&self, id: &str) -> Result<()> {
        let entry = self
            .registry
            .get(id)?
            .ok_or_else(|| RuntimeError::ClusterNotFound(id.to_string()))?;

        // Drop (and close) any previous incarnation.
        if let Some(previous) = self.clusters.lock().remove(id) {
            previous.detach();
            previous.core.ledger.close();
        }

        let runtime = self.open_runtime(&entry)?;
        {
            let mut subscriptions = runtime.subscriptions.lock();
            for wrapper in &runtime.agents {
                subscriptions.push(subscribe_wrapper(&runtime.core.bus, wrapper));
            }
        }

        runtime.core.set_state(ClusterState::Running);
        self.registry.set_state(id, ClusterState::Running)?;
        self.spawn_stop_watcher(id.to_string(), runtime.clone());
        let _ = self.clusters.lock().insert(id.to_string(), runtime);
        info!(cluster = %id, "cluster resumed");
        Ok(())
    }

    /// Stop every cluster and close every ledger.
    pub async fn shutdown(&self) {
        let runtimes: Vec<Arc<ClusterRuntime>> =
            self.clusters.lock().values().cloned().collect();
        for runtime in &runtimes {
            let _ = runtime.core.request_stop();
        }
        for runtime in &runtimes {
            wait_drained(runtime).await;
            runtime.detach();
            runtime.core.ledger.close();
        }
        self.clusters.lock().clear();
    }

    // ─── Observation ─────────────────────────────────────────────────────

    /// Aggregate status for one cluster.
    pub fn get_status(&self, id: &str) -> Result<ClusterStatus> {
        let runtime = self.get_runtime(id)?;
        // A finalized cluster's ledger is closed; count through a fresh
        // read handle in that case.
        let message_count = match runtime.core.ledger.count(id) {
            Ok(count) => count,
            Err(_) => Ledger::open(&self.db_path(id))
                .and_then(|ledger| ledger.count(id))
                .unwrap_or(0),
        };
        Ok(ClusterStatus {
            id: id.to_string(),
            state: runtime.core.state(),
            created_at: runtime.core.created_at,
            pid: runtime.pid,
            message_count,
            agents: runtime.agents.iter().map(|a| a.status()).collect(),
        })
    }

    /// All persisted clusters.
    pub fn list_clusters(&self) -> Result<Vec<RegistryEntry>> {
        self.registry.list()
    }

    /// Poll the registry for clusters that appear after this call.
    pub fn watch_for_new_clusters(
        &self,
        on_new: impl Fn(RegistryEntry) + Send + 'static,
        interval: Duration,
    ) -> WatchHandle {
        let registry = self.registry.clone();
        let token = CancellationToken::new();
        let task_token = token.clone();

        let join = tokio::spawn(async move {
            let mut known: HashSet<String> = registry
                .list()
                .unwrap_or_default()
                .into_iter()
                .map(|e| e.id)
                .collect();
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    () = task_token.cancelled() => break,
                    _ = ticker.tick() => {
                        let entries = registry.list().unwrap_or_default();
                        for entry in entries {
                            if known.insert(entry.id.clone()) {
                                on_new(entry);
                            }
                        }
                    }
                }
            }
        });

        WatchHandle {
            token,
            join: Some(join),
        }
    }

    /// Render a cluster's transcript. Works for running and finalized
    /// clusters alike.
    pub fn export(&self, id: &str, format: ExportFormat) -> Result<String> {
        let messages = match self.get_runtime(id) {
            Ok(runtime) if !runtime.core.ledger.is_closed() => {
                runtime.core.ledger.query(&MessageQuery::cluster(id))?
            }
            _ => {
                let _ = self
                    .registry
                    .get(id)?
                    .ok_or_else(|| RuntimeError::ClusterNotFound(id.to_string()))?;
                let ledger = Ledger::open(&self.db_path(id))?;
                let messages = ledger.query(&MessageQuery::cluster(id))?;
                ledger.close();
                messages
            }
        };
        match format {
            ExportFormat::Markdown => Ok(export::to_markdown(id, &messages)),
        }
    }

    /// Publish operator guidance to a cluster (or one agent of it).
    pub fn send_guidance(&self, id: &str, agent: Option<&str>, text: &str) -> Result<()> {
        let runtime = self.get_runtime(id)?;
        let (guidance_topic, receiver) = match agent {
            Some(agent_id) => (topic::USER_GUIDANCE_AGENT, agent_id.to_string()),
            None => (topic::USER_GUIDANCE_CLUSTER, "broadcast".to_string()),
        };
        let mut msg =
            NewMessage::broadcast(id, guidance_topic, "user", MessageContent::text(text));
        msg.receiver = receiver;
        let _ = runtime.core.bus.publish(&msg)?;
        Ok(())
    }

    // ─── Internal ────────────────────────────────────────────────────────

    fn db_path(&self, id: &str) -> PathBuf {
        self.storage_dir.join(format!("{id}.db"))
    }

    fn get_runtime(&self, id: &str) -> Result<Arc<ClusterRuntime>> {
        self.clusters
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| RuntimeError::ClusterNotFound(id.to_string()))
    }

    fn runner_for(&self, agent: &zeroshot_core::config::AgentConfig) -> Arc<dyn TaskRunner> {
        match (&agent.config, agent.is_subcluster()) {
            (Some(inner), true) => Arc::new(SubclusterRunner {
                orchestrator: self.weak.clone(),
                config: (**inner).clone(),
            }),
            _ => self.runner.clone(),
        }
    }

    /// Reopen a persisted cluster: ledger, bus, snapshotter bootstrap,
    /// agents constructed but not subscribed (that's `resume`'s job).
    fn load_cluster(&self, entry: &RegistryEntry) -> Result<()> {
        let runtime = self.open_runtime(entry)?;
        let _ = self.clusters.lock().insert(entry.id.clone(), runtime);
        info!(cluster = %entry.id, "cluster reopened from registry");
        Ok(())
    }

    fn open_runtime(&self, entry: &RegistryEntry) -> Result<Arc<ClusterRuntime>> {
        let ledger = Arc::new(Ledger::open(&self.db_path(&entry.id))?);
        let bus = Arc::new(MessageBus::new(ledger.clone()));
        let roles: HashMap<String, String> = entry
            .config
            .agents
            .iter()
            .map(|a| (a.id.clone(), a.role.clone()))
            .collect();
        let core = ClusterCore::new(
            ClusterId::from(entry.id.as_str()),
            entry.created_at,
            ledger,
            bus,
            roles,
        );
        core.set_state(entry.state);

        let snapshotter = StateSnapshotter::new(core.bus.clone(), entry.id.clone());
        snapshotter.start()?;

        let agents = entry
            .config
            .agents
            .iter()
            .map(|agent_config| {
                let runner = self.runner_for(agent_config);
                AgentWrapper::new(agent_config.clone(), core.clone(), runner)
            })
            .collect();

        Ok(Arc::new(ClusterRuntime {
            core,
            agents,
            snapshotter,
            subscriptions: Mutex::new(Vec::new()),
            pid: entry.pid,
        }))
    }

    fn spawn_stop_watcher(&self, id: String, runtime: Arc<ClusterRuntime>) {
        let registry = self.registry.clone();
        let _ = tokio::spawn(async move {
            runtime.core.stop_token().cancelled().await;
            wait_drained(&runtime).await;
            runtime.detach();
            if let Err(err) = registry.set_state(&id, runtime.core.state()) {
                warn!(cluster = %id, %err, "failed to persist terminal state");
            }
            runtime.core.ledger.close();
            info!(cluster = %id, "cluster finalized");
        });
    }
}

/// Subscribe a wrapper to its cluster bus through a weak reference so the
/// bus never keeps a dropped wrapper alive.
fn subscribe_wrapper(bus: &MessageBus, wrapper: &Arc<AgentWrapper>) -> Subscription {
    let weak = Arc::downgrade(wrapper);
    bus.subscribe(move |msg| {
        if let Some(wrapper) = weak.upgrade() {
            wrapper.on_message(msg);
        }
    })
}

async fn wait_drained(runtime: &ClusterRuntime) {
    for _ in 0..DRAIN_MAX_POLLS {
        if runtime.is_drained() {
            return;
        }
        tokio::time::sleep(DRAIN_POLL).await;
    }
    warn!("agents did not drain in time; finalizing anyway");
}

/// Handle to a registry watch task; cancels on drop.
pub struct WatchHandle {
    token: CancellationToken,
    join: Option<tokio::task::JoinHandle<()>>,
}

impl WatchHandle {
    /// Stop the watch task and wait for it to finish.
    pub async fn stop(mut self) {
        self.token.cancel();
        if let Some(join) = self.join.take() {
            let _ = join.await;
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Subcluster runner
// ─────────────────────────────────────────────────────────────────────────────

/// Runs a sub-cluster agent: starts the inner cluster with the assembled
/// context as its issue text, waits for it to stop, and returns the inner
/// cluster's final `CLUSTER_COMPLETE` (or last message) as output.
struct SubclusterRunner {
    orchestrator: Weak<Orchestrator>,
    config: ClusterConfig,
}

#[async_trait]
impl TaskRunner for SubclusterRunner {
    async fn run(&self, request: TaskRequest) -> TaskResult {
        let Some(orchestrator) = self.orchestrator.upgrade() else {
            return TaskResult::failed("orchestrator is gone");
        };

        let started = orchestrator
            .start(
                self.config.clone(),
                StartInput {
                    text: request.context,
                    data: None,
                    source: Some("subcluster".into()),
                },
            )
            .await;
        let inner_id = match started {
            Ok(id) => id,
            Err(err) => return TaskResult::failed(format!("subcluster start failed: {err}")),
        };

        // Wait for the inner cluster to reach a terminal state.
        loop {
            match orchestrator.get_status(inner_id.as_str()) {
                Ok(status) if status.state.is_terminal() => break,
                Ok(_) => tokio::time::sleep(Duration::from_millis(50)).await,
                Err(err) => {
                    return TaskResult::failed(format!("subcluster status failed: {err}"))
                }
            }
        }

        let runtime = match orchestrator.get_runtime(inner_id.as_str()) {
            Ok(runtime) => runtime,
            Err(err) => return TaskResult::failed(format!("subcluster vanished: {err}")),
        };
        let output = runtime
            .core
            .ledger
            .find_last(
                &MessageQuery::cluster(inner_id.as_str()).topic(topic::CLUSTER_COMPLETE),
            )
            .ok()
            .flatten()
            .and_then(|msg| msg.content.text)
            .unwrap_or_default();

        TaskResult {
            success: true,
            output,
            error: None,
            task_id: Some(inner_id.to_string()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::MockTaskRunner;
    use serde_json::json;

    fn single_worker_config() -> ClusterConfig {
        serde_json::from_value(json!({
            "agents": [
                {
                    "id": "worker", "role": "implementation", "prompt": "do it",
                    "triggers": [{"topic": "ISSUE_OPENED"}],
                    "hooks": {"onComplete": {"action": "publish_message", "config": {"topic": "CLUSTER_COMPLETE"}}}
                },
                {
                    "id": "completion", "role": "orchestrator",
                    "triggers": [{"topic": "CLUSTER_COMPLETE", "action": "stop_cluster"}]
                }
            ]
        }))
        .unwrap()
    }

    async fn wait_stopped(orchestrator: &Arc<Orchestrator>, id: &str) -> ClusterStatus {
        for _ in 0..200 {
            let status = orchestrator.get_status(id).unwrap();
            if status.state == ClusterState::Stopped {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("cluster never stopped");
    }

    #[tokio::test]
    async fn invalid_config_is_rejected_without_a_cluster() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator =
            Orchestrator::new(dir.path(), Arc::new(MockTaskRunner::new())).unwrap();

        let config: ClusterConfig = serde_json::from_value(json!({"agents": []})).unwrap();
        let err = orchestrator
            .start(config, StartInput::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::Config(ConfigError::Invalid(_))
        ));
        assert!(orchestrator.list_clusters().unwrap().is_empty());
    }

    #[tokio::test]
    async fn start_publishes_issue_and_registers() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator =
            Orchestrator::new(dir.path(), Arc::new(MockTaskRunner::new())).unwrap();

        let id = orchestrator
            .start(
                single_worker_config(),
                StartInput {
                    text: "Do the thing".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let entries = orchestrator.list_clusters().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, id.to_string());

        let status = wait_stopped(&orchestrator, id.as_str()).await;
        assert!(status.message_count >= 3);
        orchestrator.shutdown().await;
    }

    #[tokio::test]
    async fn unknown_cluster_operations_fail() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator =
            Orchestrator::new(dir.path(), Arc::new(MockTaskRunner::new())).unwrap();

        assert!(matches!(
            orchestrator.stop("cl_missing"),
            Err(RuntimeError::ClusterNotFound(_))
        ));
        assert!(matches!(
            orchestrator.get_status("cl_missing"),
            Err(RuntimeError::ClusterNotFound(_))
        ));
        assert!(matches!(
            orchestrator.export("cl_missing", ExportFormat::Markdown),
            Err(RuntimeError::ClusterNotFound(_))
        ));
    }

    #[tokio::test]
    async fn export_renders_transcript() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator =
            Orchestrator::new(dir.path(), Arc::new(MockTaskRunner::new())).unwrap();

        let id = orchestrator
            .start(
                single_worker_config(),
                StartInput {
                    text: "Readable task".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let _ = wait_stopped(&orchestrator, id.as_str()).await;

        let md = orchestrator
            .export(id.as_str(), ExportFormat::Markdown)
            .unwrap();
        assert!(md.contains("ISSUE_OPENED"));
        assert!(md.contains("Readable task"));
        orchestrator.shutdown().await;
    }

    #[tokio::test]
    async fn watcher_sees_new_clusters() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator =
            Orchestrator::new(dir.path(), Arc::new(MockTaskRunner::new())).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handle = orchestrator.watch_for_new_clusters(
            move |entry| sink.lock().push(entry.id),
            Duration::from_millis(10),
        );

        let id = orchestrator
            .start(single_worker_config(), StartInput::default())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.stop().await;

        assert_eq!(seen.lock().clone(), vec![id.to_string()]);
        orchestrator.shutdown().await;
    }

    #[tokio::test]
    async fn guidance_lands_on_the_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator =
            Orchestrator::new(dir.path(), Arc::new(MockTaskRunner::new())).unwrap();
        let id = orchestrator
            .start(single_worker_config(), StartInput::default())
            .await
            .unwrap();

        orchestrator
            .send_guidance(id.as_str(), None, "hurry up")
            .unwrap();
        orchestrator
            .send_guidance(id.as_str(), Some("worker"), "focus")
            .unwrap();

        let runtime = orchestrator.get_runtime(id.as_str()).unwrap();
        let cluster_wide = runtime
            .core
            .ledger
            .find_last(
                &MessageQuery::cluster(id.as_str()).topic(topic::USER_GUIDANCE_CLUSTER),
            )
            .unwrap()
            .unwrap();
        assert_eq!(cluster_wide.receiver, "broadcast");

        let targeted = runtime
            .core
            .ledger
            .find_last(&MessageQuery::cluster(id.as_str()).topic(topic::USER_GUIDANCE_AGENT))
            .unwrap()
            .unwrap();
        assert_eq!(targeted.receiver, "worker");
        orchestrator.shutdown().await;
    }
}
