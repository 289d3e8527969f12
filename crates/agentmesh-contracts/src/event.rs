//! Event description types supplied by callers of the audit log.
//!
//! An `AuditEvent` is what a governed component hands to the log: the
//! who/what/where of one action, before the log assigns identity,
//! timestamps, and hashes. The log seals it into an immutable entry.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AuditError, AuditResult};

/// Well-known event categories.
///
/// The category is an open string so platform extensions can define their
/// own; these constants cover the events the core platform emits.
pub mod event_type {
    /// An agent invoked a tool through the mesh.
    pub const TOOL_INVOCATION: &str = "tool_invocation";
    /// The policy engine ruled on a proposed action.
    pub const POLICY_DECISION: &str = "policy_decision";
    /// An action proceeded in violation of policy (detected after the fact).
    pub const POLICY_VIOLATION: &str = "policy_violation";
    /// A new agent identity was registered with the mesh.
    pub const AGENT_REGISTERED: &str = "agent_registered";
    /// An agent identity was revoked.
    pub const AGENT_REVOKED: &str = "agent_revoked";
    /// An agent's identity claim was verified.
    pub const IDENTITY_VERIFIED: &str = "identity_verified";
    /// One agent delegated authority to another.
    pub const DELEGATION_CREATED: &str = "delegation_created";
}

/// The outcome of a governed action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOutcome {
    /// The action completed as intended.
    Success,
    /// The action ran but did not achieve its intent.
    Failure,
    /// Policy refused the action before it ran.
    Denied,
    /// The action aborted with an error.
    Error,
}

impl AuditOutcome {
    /// The lowercase wire form, as used in hashes and exports.
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditOutcome::Success => "success",
            AuditOutcome::Failure => "failure",
            AuditOutcome::Denied => "denied",
            AuditOutcome::Error => "error",
        }
    }
}

impl std::fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A caller-supplied description of one governed action.
///
/// Required fields are set at construction; everything else defaults to
/// absent and is filled in with the `with_*` builder methods:
///
/// ```rust,ignore
/// let event = AuditEvent::new(event_type::TOOL_INVOCATION, "did:mesh:translator-01", "invoke_tool")
///     .with_resource("tool/web_search")
///     .with_outcome(AuditOutcome::Success)
///     .with_trace_id("trace-4f2a");
/// log.append(event)?;
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Event category (see the `event_type` constants).
    pub event_type: String,
    /// DID of the agent whose action is recorded.
    pub agent_did: String,
    /// The action taken (e.g. "invoke_tool", "register").
    pub action: String,
    /// The resource the action touched, when one applies.
    pub resource: Option<String>,
    /// The counterparty agent, for agent-to-agent events.
    pub target_did: Option<String>,
    /// Caller-supplied context. Arbitrary JSON values; no secrets.
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
}

impl AuditEvent {
    /// Describe an event with the three required fields.
    ///
    /// The outcome defaults to `Success`; every optional field starts absent.
    pub fn new(
        event_type: impl Into<String>,
        agent_did: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            agent_did: agent_did.into(),
            action: action.into(),
            resource: None,
            target_did: None,
            data: serde_json::Map::new(),
            outcome: AuditOutcome::Success,
            policy_decision: None,
            matched_rule: None,
            trace_id: None,
            session_id: None,
        }
    }

    /// Set the resource identifier.
    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    /// Set the counterparty agent DID.
    pub fn with_target(mut self, target_did: impl Into<String>) -> Self {
        self.target_did = Some(target_did.into());
        self
    }

    /// Replace the context map wholesale.
    pub fn with_data(mut self, data: serde_json::Map<String, Value>) -> Self {
        self.data = data;
        self
    }

    /// Insert one key into the context map.
    pub fn with_data_entry(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// Set the outcome.
    pub fn with_outcome(mut self, outcome: AuditOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    /// Set the policy decision string.
    pub fn with_policy_decision(mut self, decision: impl Into<String>) -> Self {
        self.policy_decision = Some(decision.into());
        self
    }

    /// Set the matched policy rule name.
    pub fn with_matched_rule(mut self, rule: impl Into<String>) -> Self {
        self.matched_rule = Some(rule.into());
        self
    }

    /// Set the trace correlation id.
    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    /// Set the session correlation id.
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Reject malformed events before they can become entries.
    ///
    /// The three required fields must be non-empty. Everything else is
    /// optional by design.
    pub fn validate(&self) -> AuditResult<()> {
        if self.event_type.is_empty() {
            return Err(AuditError::InvalidEvent {
                reason: "event_type must not be empty".to_string(),
            });
        }
        if self.agent_did.is_empty() {
            return Err(AuditError::InvalidEvent {
                reason: "agent_did must not be empty".to_string(),
            });
        }
        if self.action.is_empty() {
            return Err(AuditError::InvalidEvent {
                reason: "action must not be empty".to_string(),
            });
        }
        Ok(())
    }
}
