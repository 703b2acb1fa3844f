//! # zeroshot-runtime
//!
//! The cluster execution engine: everything that turns a declarative agent
//! graph into a running workflow.
//!
//! - **[`TaskRunner`]**: the sole seam to external provider CLIs, with a
//!   scripted [`MockTaskRunner`] for tests
//! - **Trigger predicates**: declarative condition trees, falsy-on-error
//! - **[`StateSnapshotter`]**: folds state-affecting topics into durable
//!   working memory, re-published on content change
//! - **[`AgentWrapper`]**: per-agent lifecycle (evaluate, build context,
//!   run, apply hooks) with timeouts and iteration caps
//! - **[`Orchestrator`]**: owns clusters; start/stop/kill/resume, status,
//!   registry, watch, markdown export
//!
//! [`TaskRunner`]: runner::TaskRunner
//! [`MockTaskRunner`]: runner::MockTaskRunner
//! [`StateSnapshotter`]: snapshotter::StateSnapshotter
//! [`AgentWrapper`]: agent::AgentWrapper
//! [`Orchestrator`]: orchestrator::Orchestrator

#![deny(unsafe_code)]

pub mod agent;
pub mod cluster;
pub mod error;
pub mod export;
pub mod file_lock;
pub mod hooks;
pub mod orchestrator;
pub mod predicate;
pub mod registry;
pub mod runner;
pub mod snapshot;
pub mod snapshotter;

pub use agent::{AgentStatus, AgentWrapper};
pub use cluster::ClusterCore;
pub use error::{Result, RuntimeError};
pub use orchestrator::{ClusterStatus, ExportFormat, Orchestrator, StartInput, WatchHandle};
pub use registry::{ClusterRegistry, RegistryEntry};
pub use runner::{MockTaskRunner, TaskRequest, TaskResult, TaskRunner};
pub use snapshot::{WorkingState, SNAPSHOT_VERSION};
pub use snapshotter::StateSnapshotter;
