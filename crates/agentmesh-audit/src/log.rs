//! The queryable audit log: a Merkle audit chain plus secondary indexes.
//!
//! The log is the write surface of the audit core. `append` is the only
//! mutating operation — it seals a caller-supplied event into an entry,
//! hands it to the chain, and updates the per-agent and per-category
//! indexes. Everything else is a read over the chain's state.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use agentmesh_contracts::{AuditEvent, AuditOutcome, AuditResult};

use crate::{
    entry::AuditEntry,
    export::{AuditExport, CloudEvent},
    merkle::{verify_proof, ChainStatus, MerkleAuditChain, ProofStep},
};

/// Default cap on query results when the caller does not set one.
const DEFAULT_QUERY_LIMIT: usize = 100;

// ── Query ─────────────────────────────────────────────────────────────────────

/// A conjunctive filter over audit entries.
///
/// Filters are independent; an unset filter places no restriction on that
/// field. Built fluently:
///
/// ```rust,ignore
/// let denials = log.query(
///     &AuditQuery::new()
///         .for_agent("did:mesh:translator-01")
///         .with_outcome(AuditOutcome::Denied)
///         .since(window_start)
///         .limit(20),
/// );
/// ```
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    agent_did: Option<String>,
    event_type: Option<String>,
    outcome: Option<AuditOutcome>,
    since: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
    limit: Option<usize>,
}

impl AuditQuery {
    /// A query matching everything, capped at the default limit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to one agent's entries.
    pub fn for_agent(mut self, agent_did: impl Into<String>) -> Self {
        self.agent_did = Some(agent_did.into());
        self
    }

    /// Restrict to one event category.
    pub fn of_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    /// Restrict to one outcome.
    pub fn with_outcome(mut self, outcome: AuditOutcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    /// Keep entries created at or after this instant.
    pub fn since(mut self, start: DateTime<Utc>) -> Self {
        self.since = Some(start);
        self
    }

    /// Keep entries created at or before this instant.
    pub fn until(mut self, end: DateTime<Utc>) -> Self {
        self.until = Some(end);
        self
    }

    /// Cap the number of results.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// True when the entry satisfies every set filter.
    fn matches(&self, entry: &AuditEntry) -> bool {
        if let Some(did) = &self.agent_did {
            if &entry.agent_did != did {
                return false;
            }
        }
        if let Some(event_type) = &self.event_type {
            if &entry.event_type != event_type {
                return false;
            }
        }
        if let Some(outcome) = self.outcome {
            if entry.outcome != outcome {
                return false;
            }
        }
        if let Some(since) = self.since {
            if entry.timestamp < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if entry.timestamp > until {
                return false;
            }
        }
        true
    }
}

// ── Proof bundle ──────────────────────────────────────────────────────────────

/// Everything a caller needs to hand an inclusion proof to a third party.
///
/// `verified` is pre-computed against the bundled root so callers that only
/// relay the bundle need not re-run the check themselves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofBundle {
    /// The entry the proof covers.
    pub entry: AuditEntry,
    /// Sibling hashes from the entry's leaf to just below the root.
    pub proof: Vec<ProofStep>,
    /// The chain's root at the time the bundle was produced.
    pub root_hash: String,
    /// Result of verifying `proof` against `root_hash`.
    pub verified: bool,
}

// ── The log ───────────────────────────────────────────────────────────────────

/// An append-only audit log with per-agent and per-category indexes.
///
/// Owns one `MerkleAuditChain`. The indexes hold entry ids in insertion
/// order and are updated on the single append path, never pruned — they
/// are always a consistent view of the chain's entries.
///
/// The log has no internal locking: writers must be serialized by the
/// caller, and reads may run concurrently once no writer is active.
#[derive(Debug, Default)]
pub struct AuditLog {
    chain: MerkleAuditChain,
    by_agent: HashMap<String, Vec<String>>,
    by_type: HashMap<String, Vec<String>>,
}

impl AuditLog {
    /// An empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a log (chain, tree, and indexes) from bulk-loaded entries.
    ///
    /// Uses the chain's full-rebuild path. The caller is expected to run
    /// `verify_integrity` before trusting the result; the persistence
    /// wrapper in `store` does exactly that.
    pub fn from_entries(entries: Vec<AuditEntry>) -> Self {
        let chain = MerkleAuditChain::from_entries(entries);
        let mut by_agent: HashMap<String, Vec<String>> = HashMap::new();
        let mut by_type: HashMap<String, Vec<String>> = HashMap::new();
        for entry in chain.entries() {
            by_agent
                .entry(entry.agent_did.clone())
                .or_default()
                .push(entry.entry_id.clone());
            by_type
                .entry(entry.event_type.clone())
                .or_default()
                .push(entry.entry_id.clone());
        }
        Self {
            chain,
            by_agent,
            by_type,
        }
    }

    /// Record one governed action.
    ///
    /// Validates the event, seals it into an entry (fresh id and
    /// timestamp), appends it to the chain, and indexes it. Returns a copy
    /// of the sealed entry. The only failure mode is a malformed event,
    /// rejected before any state mutates.
    pub fn append(&mut self, event: AuditEvent) -> AuditResult<AuditEntry> {
        event.validate()?;

        let entry = self.chain.add_entry(AuditEntry::from_event(event)).clone();

        self.by_agent
            .entry(entry.agent_did.clone())
            .or_default()
            .push(entry.entry_id.clone());
        self.by_type
            .entry(entry.event_type.clone())
            .or_default()
            .push(entry.entry_id.clone());

        debug!(
            entry_id = %entry.entry_id,
            agent_did = %entry.agent_did,
            event_type = %entry.event_type,
            outcome = %entry.outcome,
            "audit entry appended"
        );

        Ok(entry)
    }

    /// Look up an entry by id.
    pub fn entry(&self, entry_id: &str) -> Option<&AuditEntry> {
        self.chain.entry(entry_id)
    }

    /// The most recent `limit` entries recorded for one agent, oldest first.
    pub fn entries_for_agent(&self, agent_did: &str, limit: usize) -> Vec<&AuditEntry> {
        self.indexed_entries(self.by_agent.get(agent_did), limit)
    }

    /// The most recent `limit` entries of one event category, oldest first.
    pub fn entries_by_type(&self, event_type: &str, limit: usize) -> Vec<&AuditEntry> {
        self.indexed_entries(self.by_type.get(event_type), limit)
    }

    fn indexed_entries(&self, ids: Option<&Vec<String>>, limit: usize) -> Vec<&AuditEntry> {
        let Some(ids) = ids else {
            return Vec::new();
        };
        ids[ids.len().saturating_sub(limit)..]
            .iter()
            .filter_map(|id| self.chain.entry(id))
            .collect()
    }

    /// Apply a conjunctive filter by linear scan over the chain.
    ///
    /// Results come back in insertion order, truncated to the most recent
    /// `limit` matches (default 100).
    pub fn query(&self, query: &AuditQuery) -> Vec<&AuditEntry> {
        let matches: Vec<&AuditEntry> = self
            .chain
            .entries()
            .iter()
            .filter(|entry| query.matches(entry))
            .collect();
        let limit = query.limit.unwrap_or(DEFAULT_QUERY_LIMIT);
        let skip = matches.len().saturating_sub(limit);
        matches.into_iter().skip(skip).collect()
    }

    /// Run the authoritative O(n) integrity check over the whole chain.
    pub fn verify_integrity(&self) -> ChainStatus {
        self.chain.verify_chain()
    }

    /// Produce a self-contained proof bundle for one entry.
    ///
    /// Returns `None` for an unknown id. The bundle carries the entry, its
    /// Merkle proof, the current root, and the pre-computed verification
    /// result.
    pub fn proof(&self, entry_id: &str) -> Option<ProofBundle> {
        let entry = self.chain.entry(entry_id)?.clone();
        let proof = self.chain.proof(entry_id)?;
        let root_hash = self.chain.root_hash()?.to_string();
        let verified = verify_proof(&entry.entry_hash, &proof, &root_hash);
        Some(ProofBundle {
            entry,
            proof,
            root_hash,
            verified,
        })
    }

    /// The current Merkle root, or `None` while the log is empty.
    pub fn root_hash(&self) -> Option<&str> {
        self.chain.root_hash()
    }

    /// Number of recorded entries.
    pub fn len(&self) -> usize {
        self.chain.len()
    }

    /// True when nothing has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    /// Read access to the underlying chain.
    pub fn chain(&self) -> &MerkleAuditChain {
        &self.chain
    }

    /// Serialize a time-windowed subset of entries for external retention.
    ///
    /// The export embeds the current root hash, so a consumer holding a
    /// separately retained root can re-verify the export independently.
    pub fn export(
        &self,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> AuditExport {
        let entries: Vec<AuditEntry> = self
            .chain
            .entries()
            .iter()
            .filter(|e| in_window(e, since, until))
            .cloned()
            .collect();
        AuditExport {
            exported_at: Utc::now(),
            merkle_root: self.chain.root_hash().map(str::to_string),
            entry_count: entries.len(),
            entries,
        }
    }

    /// Serialize a time-windowed subset of entries as CloudEvents v1.0.
    pub fn export_cloudevents(
        &self,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> Vec<CloudEvent> {
        self.chain
            .entries()
            .iter()
            .filter(|e| in_window(e, since, until))
            .map(CloudEvent::from_entry)
            .collect()
    }
}

fn in_window(
    entry: &AuditEntry,
    since: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
) -> bool {
    if let Some(start) = since {
        if entry.timestamp < start {
            return false;
        }
    }
    if let Some(end) = until {
        if entry.timestamp > end {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentmesh_contracts::event_type;

    fn tool_event(agent: &str, action: &str) -> AuditEvent {
        AuditEvent::new(event_type::TOOL_INVOCATION, agent, action)
    }

    fn populated_log() -> AuditLog {
        let mut log = AuditLog::new();
        log.append(tool_event("did:mesh:a", "search")).unwrap();
        log.append(
            AuditEvent::new(event_type::POLICY_DECISION, "did:mesh:b", "evaluate")
                .with_outcome(AuditOutcome::Denied)
                .with_matched_rule("no-external-tools"),
        )
        .unwrap();
        log.append(tool_event("did:mesh:a", "summarize")).unwrap();
        log
    }

    // ── Append and lookup ────────────────────────────────────────────────────

    #[test]
    fn append_returns_sealed_entry() {
        let mut log = AuditLog::new();
        let entry = log.append(tool_event("did:mesh:a", "search")).unwrap();
        assert!(!entry.entry_id.is_empty());
        assert!(entry.verify_hash());
        assert_eq!(entry.previous_hash, "");
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn append_rejects_malformed_events_without_mutating() {
        let mut log = AuditLog::new();
        let err = log.append(AuditEvent::new("", "did:mesh:a", "act"));
        assert!(err.is_err());
        assert!(log.is_empty(), "a rejected event must leave no trace");
        assert!(log.root_hash().is_none());
    }

    #[test]
    fn entry_lookup_by_id() {
        let mut log = AuditLog::new();
        let entry = log.append(tool_event("did:mesh:a", "search")).unwrap();
        assert!(log.entry(&entry.entry_id).is_some());
        assert!(log.entry("no-such-id").is_none());
    }

    // ── Indexes ──────────────────────────────────────────────────────────────

    #[test]
    fn agent_index_returns_insertion_order() {
        let log = populated_log();
        let entries = log.entries_for_agent("did:mesh:a", 10);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action, "search");
        assert_eq!(entries[1].action, "summarize");
    }

    #[test]
    fn agent_index_limit_keeps_most_recent() {
        let log = populated_log();
        let entries = log.entries_for_agent("did:mesh:a", 1);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, "summarize");
    }

    #[test]
    fn type_index_partitions_by_category() {
        let log = populated_log();
        assert_eq!(log.entries_by_type(event_type::TOOL_INVOCATION, 10).len(), 2);
        assert_eq!(log.entries_by_type(event_type::POLICY_DECISION, 10).len(), 1);
        assert!(log.entries_by_type("unknown_category", 10).is_empty());
    }

    #[test]
    fn unknown_agent_yields_empty_not_error() {
        let log = populated_log();
        assert!(log.entries_for_agent("did:mesh:nobody", 10).is_empty());
    }

    // ── Query ────────────────────────────────────────────────────────────────

    #[test]
    fn query_filters_conjunctively() {
        let log = populated_log();

        let for_a = log.query(&AuditQuery::new().for_agent("did:mesh:a"));
        assert_eq!(for_a.len(), 2);

        let denied = log.query(&AuditQuery::new().with_outcome(AuditOutcome::Denied));
        assert_eq!(denied.len(), 1);
        assert_eq!(denied[0].agent_did, "did:mesh:b");

        let both = log.query(
            &AuditQuery::new()
                .for_agent("did:mesh:a")
                .with_outcome(AuditOutcome::Denied),
        );
        assert!(both.is_empty(), "conjunction must intersect filters");
    }

    #[test]
    fn query_time_window() {
        let log = populated_log();
        let all = log.query(&AuditQuery::new());
        let first_ts = all[0].timestamp;
        let last_ts = all[2].timestamp;

        let windowed = log.query(&AuditQuery::new().since(first_ts).until(last_ts));
        assert_eq!(windowed.len(), 3, "inclusive window must keep endpoints");

        let future = log.query(&AuditQuery::new().since(last_ts + chrono::Duration::seconds(1)));
        assert!(future.is_empty());
    }

    #[test]
    fn query_limit_keeps_most_recent_in_order() {
        let mut log = AuditLog::new();
        for i in 0..5 {
            log.append(tool_event("did:mesh:a", &format!("act-{}", i)))
                .unwrap();
        }
        let last_two = log.query(&AuditQuery::new().for_agent("did:mesh:a").limit(2));
        assert_eq!(last_two.len(), 2);
        assert_eq!(last_two[0].action, "act-3");
        assert_eq!(last_two[1].action, "act-4");
    }

    // ── Integrity and proofs ─────────────────────────────────────────────────

    #[test]
    fn verify_integrity_delegates_to_chain() {
        let log = populated_log();
        assert!(log.verify_integrity().is_valid());
    }

    #[test]
    fn proof_bundle_is_pre_verified() {
        let log = populated_log();
        let target = log.query(&AuditQuery::new())[1].entry_id.clone();
        let bundle = log.proof(&target).unwrap();
        assert!(bundle.verified);
        assert_eq!(bundle.root_hash, log.root_hash().unwrap());
        assert!(verify_proof(
            &bundle.entry.entry_hash,
            &bundle.proof,
            &bundle.root_hash
        ));
    }

    #[test]
    fn proof_for_unknown_id_is_none() {
        let log = populated_log();
        assert!(log.proof("no-such-id").is_none());
    }

    // ── Export ───────────────────────────────────────────────────────────────

    #[test]
    fn export_embeds_root_and_count() {
        let log = populated_log();
        let export = log.export(None, None);
        assert_eq!(export.entry_count, 3);
        assert_eq!(export.entries.len(), 3);
        assert_eq!(export.merkle_root.as_deref(), log.root_hash());
    }

    #[test]
    fn export_respects_time_window() {
        let log = populated_log();
        let all = log.query(&AuditQuery::new());
        let last_ts = all[2].timestamp;

        let inclusive = log.export(None, Some(last_ts));
        assert_eq!(inclusive.entry_count, 3, "inclusive window must keep endpoints");

        let future = log.export(Some(last_ts + chrono::Duration::seconds(1)), None);
        assert_eq!(future.entry_count, 0, "a window after the last entry is empty");
        assert_eq!(
            future.merkle_root.as_deref(),
            log.root_hash(),
            "even an empty window embeds the current root"
        );
    }

    #[test]
    fn rebuilt_log_preserves_indexes_and_root() {
        let log = populated_log();
        let root = log.root_hash().unwrap().to_string();
        let rebuilt = AuditLog::from_entries(log.export(None, None).entries);

        assert_eq!(rebuilt.root_hash(), Some(root.as_str()));
        assert_eq!(rebuilt.entries_for_agent("did:mesh:a", 10).len(), 2);
        assert_eq!(
            rebuilt.entries_by_type(event_type::POLICY_DECISION, 10).len(),
            1
        );
        assert!(rebuilt.verify_integrity().is_valid());
    }
}
