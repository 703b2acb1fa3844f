//! # zeroshot-context
//!
//! Context assembly for agents: select and render prompt content under a
//! token budget.
//!
//! - **Token estimation**: chars/4 approximation, [`tokens::estimate_tokens`]
//! - **Packs**: prioritized prompt fragments with full/compact variants
//! - **[`ContextPackBuilder`]**: budgeted selection with a hard char guard
//! - **[`AgentContextBuilder`]**: resolves ledger sources and composes the
//!   static sections (header, instructions, schemas, validator skips) plus
//!   dynamic source packs
//! - **Metrics**: per-build accounting, printable or publishable
//!
//! [`ContextPackBuilder`]: builder::ContextPackBuilder
//! [`AgentContextBuilder`]: agent_builder::AgentContextBuilder

#![deny(unsafe_code)]

pub mod agent_builder;
pub mod builder;
pub mod error;
pub mod metrics;
pub mod pack;
pub mod tokens;

pub use agent_builder::{is_platform_mismatch, AgentContextBuilder, BuildParams};
pub use builder::{BudgetReport, BuiltContext, ContextPackBuilder, PackDecision, PackStatus,
    PackVariant, DEFAULT_MAX_CHARS};
pub use error::{ContextError, Result};
pub use metrics::ContextMetrics;
pub use pack::{ContextPack, PackPriority};
pub use tokens::estimate_tokens;
