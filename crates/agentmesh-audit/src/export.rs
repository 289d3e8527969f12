//! Export formats: CloudEvents v1.0 envelopes and the verifiable bulk export.
//!
//! Both formats are serialization adapters over the entry's own fields.
//! The bulk export embeds the Merkle root current at export time, so a
//! consumer holding a separately retained root can re-verify the export
//! without talking to the producer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entry::AuditEntry;

/// CloudEvents spec version emitted by this adapter.
const SPECVERSION: &str = "1.0";

/// Reverse-DNS prefix for all AgentMesh event types.
const TYPE_PREFIX: &str = "ai.agentmesh";

/// Map an internal event category to its CloudEvents `type` string.
///
/// Known categories get curated reverse-DNS names; anything else falls
/// back to `ai.agentmesh.<category>` so extension categories still export.
pub fn cloudevents_type(event_type: &str) -> String {
    match event_type {
        "tool_invocation" => format!("{}.tool.invoked", TYPE_PREFIX),
        "policy_decision" => format!("{}.policy.decided", TYPE_PREFIX),
        "policy_violation" => format!("{}.policy.violated", TYPE_PREFIX),
        "agent_registered" => format!("{}.agent.registered", TYPE_PREFIX),
        "agent_revoked" => format!("{}.agent.revoked", TYPE_PREFIX),
        "identity_verified" => format!("{}.identity.verified", TYPE_PREFIX),
        "delegation_created" => format!("{}.delegation.created", TYPE_PREFIX),
        other => format!("{}.{}", TYPE_PREFIX, other),
    }
}

/// One audit entry rendered as a CloudEvents v1.0 envelope.
///
/// The `entryhash` and `previoushash` extension attributes carry the
/// entry's chain hashes, so a consumer can splice exported events back
/// into integrity checks. `traceid`/`sessionid` appear only when the entry
/// carries them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudEvent {
    /// Always `"1.0"`.
    pub specversion: String,
    /// The entry id.
    pub id: String,
    /// Reverse-DNS event type (see `cloudevents_type`).
    #[serde(rename = "type")]
    pub event_type: String,
    /// The acting agent's DID.
    pub source: String,
    /// Entry creation time, RFC 3339.
    pub time: String,
    /// Always `"application/json"`.
    pub datacontenttype: String,
    /// Action/resource/outcome/policy fields merged over the caller's
    /// context map.
    pub data: serde_json::Map<String, Value>,
    /// Extension: the entry's own hash.
    pub entryhash: String,
    /// Extension: the previous entry's hash (empty for the first entry).
    pub previoushash: String,
    /// Extension: trace correlation id, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traceid: Option<String>,
    /// Extension: session correlation id, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sessionid: Option<String>,
}

impl CloudEvent {
    /// Render one entry as a CloudEvents envelope.
    ///
    /// The `data` object starts from the caller's context map; the entry's
    /// own fields are written over it afterwards, so an entry field wins
    /// any key collision with caller context.
    pub fn from_entry(entry: &AuditEntry) -> Self {
        let mut data = entry.data.clone();
        data.insert("action".to_string(), Value::String(entry.action.clone()));
        if let Some(resource) = &entry.resource {
            data.insert("resource".to_string(), Value::String(resource.clone()));
        }
        data.insert(
            "outcome".to_string(),
            Value::String(entry.outcome.as_str().to_string()),
        );
        if let Some(decision) = &entry.policy_decision {
            data.insert(
                "policy_decision".to_string(),
                Value::String(decision.clone()),
            );
        }
        if let Some(rule) = &entry.matched_rule {
            data.insert("matched_rule".to_string(), Value::String(rule.clone()));
        }
        if let Some(target) = &entry.target_did {
            data.insert("target_did".to_string(), Value::String(target.clone()));
        }

        Self {
            specversion: SPECVERSION.to_string(),
            id: entry.entry_id.clone(),
            event_type: cloudevents_type(&entry.event_type),
            source: entry.agent_did.clone(),
            time: entry.timestamp.to_rfc3339(),
            datacontenttype: "application/json".to_string(),
            data,
            entryhash: entry.entry_hash.clone(),
            previoushash: entry.previous_hash.clone(),
            traceid: entry.trace_id.clone(),
            sessionid: entry.session_id.clone(),
        }
    }
}

/// The verifiable bulk export: a time-windowed entry snapshot plus the
/// Merkle root the producer held at export time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditExport {
    /// When the export was produced.
    pub exported_at: DateTime<Utc>,
    /// The chain's root hash at export time; `None` for an empty log.
    pub merkle_root: Option<String>,
    /// Number of entries in this export.
    pub entry_count: usize,
    /// The exported entries, in insertion order.
    pub entries: Vec<AuditEntry>,
}
