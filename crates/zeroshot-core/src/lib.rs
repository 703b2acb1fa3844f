//! # zeroshot-core
//!
//! Foundation types for the zeroshot cluster engine.
//!
//! This crate provides the shared vocabulary that all other zeroshot crates
//! depend on:
//!
//! - **Messages**: the [`Message`] unit carried by the ledger and bus
//! - **Topics**: reserved topic names and the state-affecting subset
//! - **Branded IDs**: [`ClusterId`] / [`AgentId`] newtypes for type safety
//! - **Configuration**: the declarative cluster/agent graph ([`ClusterConfig`])
//! - **Config validation**: static analysis performed before a cluster starts
//! - **Model rules**: per-iteration model selection patterns
//! - **Errors**: [`ConfigError`] via `thiserror`
//!
//! [`Message`]: message::Message
//! [`ClusterId`]: ids::ClusterId
//! [`AgentId`]: ids::AgentId
//! [`ClusterConfig`]: config::ClusterConfig
//! [`ConfigError`]: error::ConfigError

#![deny(unsafe_code)]

pub mod config;
pub mod env;
pub mod error;
pub mod ids;
pub mod message;
pub mod model_rules;
pub mod normalize;
pub mod state;
pub mod topic;
pub mod validate;

pub use config::{
    AgentConfig, ClusterConfig, ContextSource, ContextStrategy, HookAction, HookConfig,
    HooksConfig, IsolationMode, ModelLevel, ModelRule, OutputFormat, Predicate, PromptSpec,
    SourcePriority, SourceStrategy, TriggerAction, TriggerConfig,
};
pub use error::{ConfigError, Result};
pub use ids::{AgentId, ClusterId};
pub use message::{Message, MessageContent, NewMessage};
pub use state::{AgentState, ClusterState};
pub use validate::{validate_config, ValidationReport};
