use std::sync::Arc;

use roomdrop_protocol::FileFingerprint;
use tracing::debug;

use crate::LedgerError;
use crate::store::KeyValueStore;

/// Namespace of ledger keys inside a shared store.
pub const LEDGER_KEY_PREFIX: &str = "roomdrop::";

/// Maps file fingerprints to server-assigned upload resource ids.
///
/// An entry is written when a resource is created and removed when the
/// server no longer knows the resource. Entries never expire on their own.
#[derive(Clone)]
pub struct ResumeLedger {
    store: Arc<dyn KeyValueStore>,
}

impl ResumeLedger {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    fn key(fingerprint: &FileFingerprint) -> String {
        format!("{LEDGER_KEY_PREFIX}{fingerprint}")
    }

    /// Returns the resource id recorded for `fingerprint`, if any.
    pub fn lookup(&self, fingerprint: &FileFingerprint) -> Result<Option<String>, LedgerError> {
        let id = self
            .store
            .get(&Self::key(fingerprint))?
            .filter(|id| !id.is_empty());
        Ok(id)
    }

    /// Records that `fingerprint` is being uploaded to `resource_id`.
    pub fn store(&self, fingerprint: &FileFingerprint, resource_id: &str) -> Result<(), LedgerError> {
        debug!(fingerprint = %fingerprint, resource = %resource_id, "ledger store");
        self.store.set(&Self::key(fingerprint), resource_id)
    }

    /// Forgets the resource recorded for `fingerprint`.
    pub fn delete(&self, fingerprint: &FileFingerprint) -> Result<(), LedgerError> {
        debug!(fingerprint = %fingerprint, "ledger delete");
        self.store.delete(&Self::key(fingerprint))
    }

    /// Lists `(fingerprint, resource_id)` pairs, sorted by fingerprint.
    ///
    /// Keys in the store that do not belong to the ledger are skipped.
    pub fn entries(&self) -> Result<Vec<(String, String)>, LedgerError> {
        let mut entries = Vec::new();
        for key in self.store.keys()? {
            let Some(fingerprint) = key.strip_prefix(LEDGER_KEY_PREFIX) else {
                continue;
            };
            if let Some(resource_id) = self.store.get(&key)? {
                entries.push((fingerprint.to_string(), resource_id));
            }
        }
        entries.sort();
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{JsonFileStore, MemoryStore};
    use roomdrop_protocol::UploadTarget;

    fn fingerprint(name: &str) -> FileFingerprint {
        UploadTarget {
            file_name: name.into(),
            mime_type: "text/plain".into(),
            size_bytes: 10,
            last_modified_hint: 1,
            container_id: "room".into(),
        }
        .fingerprint()
    }

    #[test]
    fn lookup_store_delete() {
        let ledger = ResumeLedger::new(Arc::new(MemoryStore::new()));
        let fp = fingerprint("a.txt");

        assert!(ledger.lookup(&fp).unwrap().is_none());
        ledger.store(&fp, "res-1").unwrap();
        assert_eq!(ledger.lookup(&fp).unwrap().as_deref(), Some("res-1"));
        ledger.delete(&fp).unwrap();
        assert!(ledger.lookup(&fp).unwrap().is_none());
    }

    #[test]
    fn keys_are_namespaced() {
        let store = Arc::new(MemoryStore::new());
        let ledger = ResumeLedger::new(store.clone());
        let fp = fingerprint("a.txt");
        ledger.store(&fp, "res-1").unwrap();

        let raw = store.get(&format!("roomdrop::{fp}")).unwrap();
        assert_eq!(raw.as_deref(), Some("res-1"));
    }

    #[test]
    fn entries_skip_foreign_keys() {
        let store = Arc::new(MemoryStore::new());
        store.set("theme", "dark").unwrap();
        let ledger = ResumeLedger::new(store);

        let a = fingerprint("a.txt");
        let b = fingerprint("b.txt");
        ledger.store(&a, "res-a").unwrap();
        ledger.store(&b, "res-b").unwrap();

        let entries = ledger.entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.contains(&(a.to_string(), "res-a".to_string())));
        assert!(entries.contains(&(b.to_string(), "res-b".to_string())));
    }

    #[test]
    fn empty_resource_id_reads_as_missing() {
        let store = Arc::new(MemoryStore::new());
        let ledger = ResumeLedger::new(store.clone());
        let fp = fingerprint("a.txt");
        store.set(&format!("roomdrop::{fp}"), "").unwrap();
        assert!(ledger.lookup(&fp).unwrap().is_none());
    }

    #[test]
    fn survives_process_restart() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("ledger.json");
        let fp = fingerprint("movie.mp4");

        {
            let ledger = ResumeLedger::new(Arc::new(JsonFileStore::open(path.clone()).unwrap()));
            ledger.store(&fp, "24e533e0").unwrap();
        }

        let ledger = ResumeLedger::new(Arc::new(JsonFileStore::open(path).unwrap()));
        assert_eq!(ledger.lookup(&fp).unwrap().as_deref(), Some("24e533e0"));
    }
}
