//! The storage collaborator seam and the persistence wrapper.
//!
//! The core holds everything in memory and is storage-agnostic. A caller
//! that needs durability implements `AuditStore` over its backend (Redis,
//! SQL, flat files — anything exposing string get/set, list append, and a
//! field map) and wraps the log in `PersistentAuditLog`, which:
//!
//! - persists each entry *after* the in-memory append succeeds,
//! - maintains an append-only list of entry ids and running metadata
//!   (entry count, current root hash),
//! - on load, rebuilds the tree through the chain's full-rebuild path and
//!   refuses corrupt state with a hard error.

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::info;

use agentmesh_contracts::{AuditError, AuditEvent, AuditResult};

use crate::{
    entry::AuditEntry,
    log::AuditLog,
    merkle::ChainStatus,
};

/// Key prefix for individual entry records.
const ENTRY_KEY_PREFIX: &str = "audit:entry:";
/// Key of the append-only entry-id list.
const ENTRY_LIST_KEY: &str = "audit:entries";
/// Key of the running-metadata field map.
const META_KEY: &str = "audit:meta";

// ── The collaborator trait ────────────────────────────────────────────────────

/// The minimum surface a durable backend must expose.
///
/// All values are opaque strings; the wrapper handles serialization.
/// Implementations decide their own durability and retry semantics — the
/// core has none.
pub trait AuditStore: Send + Sync {
    /// Read the value stored at `key`, if any.
    fn get(&self, key: &str) -> AuditResult<Option<String>>;

    /// Store `value` at `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> AuditResult<()>;

    /// Append `value` to the list at `key`, creating it if absent.
    fn list_append(&self, key: &str, value: &str) -> AuditResult<()>;

    /// Read the whole list at `key`; empty if absent.
    fn list_range(&self, key: &str) -> AuditResult<Vec<String>>;

    /// Read one field of the map at `key`, if present.
    fn hash_get(&self, key: &str, field: &str) -> AuditResult<Option<String>>;

    /// Write one field of the map at `key`, creating the map if absent.
    fn hash_set(&self, key: &str, field: &str, value: &str) -> AuditResult<()>;
}

// ── In-memory reference implementation ────────────────────────────────────────

/// The mutable interior of a `MemoryStore`.
#[derive(Debug, Default)]
struct MemoryState {
    values: HashMap<String, String>,
    lists: HashMap<String, Vec<String>>,
    maps: HashMap<String, HashMap<String, String>>,
}

/// An in-memory `AuditStore`: the reference implementation and test double.
///
/// All operations acquire an internal `Mutex`, so a `MemoryStore` can be
/// shared across threads without extra synchronization.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn locked(&self) -> AuditResult<std::sync::MutexGuard<'_, MemoryState>> {
        self.state.lock().map_err(|e| AuditError::Storage {
            reason: format!("memory store lock poisoned: {}", e),
        })
    }
}

impl AuditStore for MemoryStore {
    fn get(&self, key: &str) -> AuditResult<Option<String>> {
        Ok(self.locked()?.values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> AuditResult<()> {
        self.locked()?.values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn list_append(&self, key: &str, value: &str) -> AuditResult<()> {
        self.locked()?
            .lists
            .entry(key.to_string())
            .or_default()
            .push(value.to_string());
        Ok(())
    }

    fn list_range(&self, key: &str) -> AuditResult<Vec<String>> {
        Ok(self.locked()?.lists.get(key).cloned().unwrap_or_default())
    }

    fn hash_get(&self, key: &str, field: &str) -> AuditResult<Option<String>> {
        Ok(self
            .locked()?
            .maps
            .get(key)
            .and_then(|m| m.get(field))
            .cloned())
    }

    fn hash_set(&self, key: &str, field: &str, value: &str) -> AuditResult<()> {
        self.locked()?
            .maps
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }
}

// ── Persistence wrapper ───────────────────────────────────────────────────────

/// An `AuditLog` that mirrors every append into an `AuditStore`.
///
/// Durability ordering follows the chain's trust model: the in-memory
/// append (which computes the hashes) happens first, then the entry record,
/// the id-list entry, and the metadata are written out. On restart, `load`
/// restores the log from the store and refuses to serve state that fails
/// verification.
pub struct PersistentAuditLog<S: AuditStore> {
    store: S,
    log: AuditLog,
}

impl<S: AuditStore> PersistentAuditLog<S> {
    /// Start a fresh log over an empty (or expendable) store.
    pub fn new(store: S) -> Self {
        Self {
            store,
            log: AuditLog::new(),
        }
    }

    /// Restore a log previously persisted into `store`.
    ///
    /// Reads the id list, fetches and decodes every entry record, rebuilds
    /// the chain through the full-rebuild path, then runs the authoritative
    /// chain verification. A missing or undecodable record yields
    /// `AuditError::CorruptRecord`; a chain that fails verification — or a
    /// stored root that disagrees with the rebuilt one — yields
    /// `AuditError::IntegrityFailure`. Neither is recoverable here: the
    /// caller must escalate, not retry.
    pub fn load(store: S) -> AuditResult<Self> {
        let ids = store.list_range(ENTRY_LIST_KEY)?;
        let mut entries = Vec::with_capacity(ids.len());

        for id in &ids {
            let key = format!("{}{}", ENTRY_KEY_PREFIX, id);
            let raw = store.get(&key)?.ok_or_else(|| AuditError::CorruptRecord {
                key: key.clone(),
                reason: "entry record missing from store".to_string(),
            })?;
            let entry: AuditEntry =
                serde_json::from_str(&raw).map_err(|e| AuditError::CorruptRecord {
                    key: key.clone(),
                    reason: e.to_string(),
                })?;
            entries.push(entry);
        }

        let log = AuditLog::from_entries(entries);

        if let ChainStatus::Broken { index, reason } = log.verify_integrity() {
            return Err(AuditError::IntegrityFailure { index, reason });
        }

        // The checkpointed root must agree with the rebuilt tree.
        if let Some(stored_root) = store.hash_get(META_KEY, "root_hash")? {
            if log.root_hash() != Some(stored_root.as_str()) {
                return Err(AuditError::IntegrityFailure {
                    index: log.len().saturating_sub(1),
                    reason: "stored root hash does not match rebuilt tree".to_string(),
                });
            }
        }

        info!(
            entry_count = log.len(),
            root_hash = log.root_hash().unwrap_or(""),
            "audit log restored from store"
        );

        Ok(Self { store, log })
    }

    /// Record one governed action and persist it.
    ///
    /// The in-memory append runs first; only a sealed entry is written out.
    /// A storage failure after the append leaves the in-memory log ahead of
    /// the store — the caller should treat that as fatal for the store, not
    /// for the log.
    pub fn append(&mut self, event: AuditEvent) -> AuditResult<AuditEntry> {
        let entry = self.log.append(event)?;

        let record = serde_json::to_string(&entry).map_err(|e| AuditError::Storage {
            reason: format!("failed to serialize entry record: {}", e),
        })?;
        let key = format!("{}{}", ENTRY_KEY_PREFIX, entry.entry_id);
        self.store.set(&key, &record)?;
        self.store.list_append(ENTRY_LIST_KEY, &entry.entry_id)?;

        self.store
            .hash_set(META_KEY, "entry_count", &self.log.len().to_string())?;
        if let Some(root) = self.log.root_hash() {
            self.store.hash_set(META_KEY, "root_hash", root)?;
        }

        Ok(entry)
    }

    /// Read access to the wrapped log.
    pub fn log(&self) -> &AuditLog {
        &self.log
    }

    /// Consume the wrapper, returning the store and the log.
    pub fn into_parts(self) -> (S, AuditLog) {
        (self.store, self.log)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentmesh_contracts::event_type;

    fn tool_event(action: &str) -> AuditEvent {
        AuditEvent::new(event_type::TOOL_INVOCATION, "did:mesh:a", action)
    }

    // ── MemoryStore primitives ───────────────────────────────────────────────

    #[test]
    fn memory_store_get_set() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k").unwrap(), None);
        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
        store.set("k", "v2").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v2"));
    }

    #[test]
    fn memory_store_list_preserves_order() {
        let store = MemoryStore::new();
        assert!(store.list_range("l").unwrap().is_empty());
        store.list_append("l", "a").unwrap();
        store.list_append("l", "b").unwrap();
        assert_eq!(store.list_range("l").unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn memory_store_hash_fields() {
        let store = MemoryStore::new();
        assert_eq!(store.hash_get("m", "f").unwrap(), None);
        store.hash_set("m", "f", "1").unwrap();
        store.hash_set("m", "g", "2").unwrap();
        assert_eq!(store.hash_get("m", "f").unwrap().as_deref(), Some("1"));
        assert_eq!(store.hash_get("m", "g").unwrap().as_deref(), Some("2"));
    }

    // ── Persistence round trip ───────────────────────────────────────────────

    #[test]
    fn persisted_log_restores_with_identical_root() {
        let mut persistent = PersistentAuditLog::new(MemoryStore::new());
        for i in 0..5 {
            persistent.append(tool_event(&format!("act-{}", i))).unwrap();
        }
        let root = persistent.log().root_hash().unwrap().to_string();
        let (store, _) = persistent.into_parts();

        let restored = PersistentAuditLog::load(store).unwrap();
        assert_eq!(restored.log().len(), 5);
        assert_eq!(restored.log().root_hash(), Some(root.as_str()));
        assert!(restored.log().verify_integrity().is_valid());
    }

    #[test]
    fn restored_log_keeps_appending() {
        let mut persistent = PersistentAuditLog::new(MemoryStore::new());
        persistent.append(tool_event("before-restart")).unwrap();
        let (store, _) = persistent.into_parts();

        let mut restored = PersistentAuditLog::load(store).unwrap();
        let entry = restored.append(tool_event("after-restart")).unwrap();

        assert_eq!(restored.log().len(), 2);
        assert_eq!(
            entry.previous_hash,
            restored.log().chain().entries()[0].entry_hash,
            "the restarted chain must link through the restored tail"
        );
    }

    #[test]
    fn load_of_empty_store_is_empty_log() {
        let restored = PersistentAuditLog::load(MemoryStore::new()).unwrap();
        assert!(restored.log().is_empty());
        assert!(restored.log().root_hash().is_none());
    }

    // ── Corruption is a hard failure ─────────────────────────────────────────

    #[test]
    fn missing_entry_record_fails_load() {
        let mut persistent = PersistentAuditLog::new(MemoryStore::new());
        let entry = persistent.append(tool_event("act")).unwrap();
        let (store, _) = persistent.into_parts();

        // Blank out the record while leaving the id list intact.
        store
            .set(&format!("{}{}", ENTRY_KEY_PREFIX, entry.entry_id), "")
            .unwrap();
        match PersistentAuditLog::load(store) {
            Err(AuditError::CorruptRecord { .. }) => {}
            other => panic!("expected CorruptRecord, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn tampered_entry_record_fails_load_with_index() {
        let mut persistent = PersistentAuditLog::new(MemoryStore::new());
        persistent.append(tool_event("act-0")).unwrap();
        let victim = persistent.append(tool_event("act-1")).unwrap();
        persistent.append(tool_event("act-2")).unwrap();
        let (store, _) = persistent.into_parts();

        // Rewrite one persisted record with an altered action.
        let key = format!("{}{}", ENTRY_KEY_PREFIX, victim.entry_id);
        let mut tampered = victim.clone();
        tampered.action = "TAMPERED".to_string();
        store
            .set(&key, &serde_json::to_string(&tampered).unwrap())
            .unwrap();

        match PersistentAuditLog::load(store) {
            Err(AuditError::IntegrityFailure { index, .. }) => assert_eq!(index, 1),
            other => panic!("expected IntegrityFailure, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn stale_root_checkpoint_fails_load() {
        let mut persistent = PersistentAuditLog::new(MemoryStore::new());
        persistent.append(tool_event("act")).unwrap();
        let (store, _) = persistent.into_parts();

        store
            .hash_set(META_KEY, "root_hash", &"f".repeat(64))
            .unwrap();
        match PersistentAuditLog::load(store) {
            Err(AuditError::IntegrityFailure { .. }) => {}
            other => panic!("expected IntegrityFailure, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn metadata_tracks_count_and_root() {
        let mut persistent = PersistentAuditLog::new(MemoryStore::new());
        persistent.append(tool_event("act-0")).unwrap();
        persistent.append(tool_event("act-1")).unwrap();
        let root = persistent.log().root_hash().unwrap().to_string();
        let (store, _) = persistent.into_parts();

        assert_eq!(
            store.hash_get(META_KEY, "entry_count").unwrap().as_deref(),
            Some("2")
        );
        assert_eq!(
            store.hash_get(META_KEY, "root_hash").unwrap().as_deref(),
            Some(root.as_str())
        );
    }
}
