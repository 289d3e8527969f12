//! # agentmesh-contracts
//!
//! Shared types and error contracts for the AgentMesh audit core.
//!
//! No business logic lives in this crate — only the data definitions that
//! callers use to describe governed actions, and the unified error type.

pub mod error;
pub mod event;

pub use error::{AuditError, AuditResult};
pub use event::{event_type, AuditEvent, AuditOutcome};
