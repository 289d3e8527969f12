//! The audit entry: one immutable, content-hashed record of a governed action.
//!
//! Every field that contributes to an entry's hash is listed explicitly in
//! `compute_hash()` so nothing is accidentally omitted.
//!
//! Hash input layout: the canonical JSON object
//!   {action, agent_did, data, entry_id, event_type, outcome,
//!    previous_hash, resource, timestamp}
//! serialized by `serde_json` (whose map type sorts keys), fed into SHA-256.
//! The timestamp contributes as its RFC 3339 rendering.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use agentmesh_contracts::event::{AuditEvent, AuditOutcome};

/// One immutable record in the audit chain.
///
/// Entries are created exactly once, by `AuditLog::append`. The two hash
/// fields are filled in at creation time: `previous_hash` links the entry to
/// its predecessor (empty string for the first entry), and `entry_hash`
/// commits to the entry's own canonical content, `previous_hash` included.
/// Modifying any hashed field afterwards invalidates `entry_hash` and every
/// subsequent entry's `previous_hash`, which `verify_chain` detects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Unique entry identifier (UUID v4), generated at creation.
    pub entry_id: String,

    /// Wall-clock time (UTC) the entry was created.
    pub timestamp: DateTime<Utc>,

    /// Event category (see `agentmesh_contracts::event_type`).
    pub event_type: String,

    /// DID of the agent whose action is recorded.
    pub agent_did: String,

    /// The action taken.
    pub action: String,

    /// The resource the action touched, when one applies.
    pub resource: Option<String>,

    /// The counterparty agent, for agent-to-agent events.
    pub target_did: Option<String>,

    /// Caller-supplied context map. Keys serialize in sorted order, which
    /// keeps the canonical hash deterministic.
    pub data: serde_json::Map<String, Value>,

    /// How the action concluded.
    pub outcome: AuditOutcome,

    /// The policy engine's decision string, when one was made.
    pub policy_decision: Option<String>,

    /// The policy rule that matched, when one did.
    pub matched_rule: Option<String>,

    /// Distributed-trace correlation id.
    pub trace_id: Option<String>,

    /// Session correlation id.
    pub session_id: Option<String>,

    /// SHA-256 hash (hex) of the previous entry, or the empty string for
    /// the first entry in the chain.
    pub previous_hash: String,

    /// SHA-256 hash (hex) of this entry's canonical content.
    pub entry_hash: String,
}

impl AuditEntry {
    /// Seal a caller-supplied event description into an entry.
    ///
    /// Assigns a fresh UUID and the current UTC timestamp. Both hash fields
    /// start empty; the chain fills them in during `add_entry`.
    pub(crate) fn from_event(event: AuditEvent) -> Self {
        Self {
            entry_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event.event_type,
            agent_did: event.agent_did,
            action: event.action,
            resource: event.resource,
            target_did: event.target_did,
            data: event.data,
            outcome: event.outcome,
            policy_decision: event.policy_decision,
            matched_rule: event.matched_rule,
            trace_id: event.trace_id,
            session_id: event.session_id,
            previous_hash: String::new(),
            entry_hash: String::new(),
        }
    }

    /// Compute the SHA-256 hash of this entry's canonical content.
    ///
    /// Pure function of entry state: same fields in, same 64-character
    /// lowercase hex digest out. The canonical form is a field-sorted JSON
    /// object — `serde_json`'s map type is BTree-backed, so both the top
    /// level and the nested `data` map serialize with sorted keys.
    ///
    /// # Panics
    ///
    /// Panics if the canonical object cannot be serialized to JSON — which
    /// cannot happen for these field types.
    pub fn compute_hash(&self) -> String {
        let canonical = serde_json::json!({
            "action": self.action,
            "agent_did": self.agent_did,
            "data": self.data,
            "entry_id": self.entry_id,
            "event_type": self.event_type,
            "outcome": self.outcome,
            "previous_hash": self.previous_hash,
            "resource": self.resource,
            "timestamp": self.timestamp.to_rfc3339(),
        });
        let bytes = serde_json::to_vec(&canonical)
            .expect("canonical audit entry must always be serializable to JSON");

        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        hex::encode(hasher.finalize())
    }

    /// Return whether the stored `entry_hash` matches a fresh recomputation.
    ///
    /// True immediately after creation; false as soon as any hashed field
    /// has been altered.
    pub fn verify_hash(&self) -> bool {
        self.entry_hash == self.compute_hash()
    }
}
