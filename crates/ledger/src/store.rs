use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use tracing::debug;

use crate::LedgerError;

/// String key-value storage that outlives the process.
///
/// Implementations must be safe to share between concurrent uploads.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, LedgerError>;

    fn set(&self, key: &str, value: &str) -> Result<(), LedgerError>;

    /// Removes `key`. Removing a missing key is not an error.
    fn delete(&self, key: &str) -> Result<(), LedgerError>;

    /// Returns every stored key.
    fn keys(&self) -> Result<Vec<String>, LedgerError>;
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// Store that lives only as long as the process.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, LedgerError> {
        Ok(self.entries.read().unwrap().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), LedgerError> {
        self.entries
            .write()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), LedgerError> {
        self.entries.write().unwrap().remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, LedgerError> {
        Ok(self.entries.read().unwrap().keys().cloned().collect())
    }
}

// ---------------------------------------------------------------------------
// JsonFileStore
// ---------------------------------------------------------------------------

/// Store cached in memory and persisted to a JSON object on disk.
///
/// Every mutation rewrites the file through a temporary sibling and a
/// rename, so a crash never leaves a half-written ledger behind.
pub struct JsonFileStore {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, String>>,
}

impl JsonFileStore {
    /// Opens the store at `path`, loading existing entries if the file exists.
    pub fn open(path: PathBuf) -> Result<Self, LedgerError> {
        let entries = load_entries(&path)?;
        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the given entries to disk.
    fn persist(&self, entries: &BTreeMap<String, String>) -> Result<(), LedgerError> {
        let json = serde_json::to_string_pretty(entries)?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        debug!("persisted {} ledger entr(ies) to {:?}", entries.len(), self.path);
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>, LedgerError> {
        Ok(self.entries.read().unwrap().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), LedgerError> {
        let mut map = self.entries.write().unwrap();
        let mut next = map.clone();
        next.insert(key.to_string(), value.to_string());
        self.persist(&next)?;
        *map = next;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), LedgerError> {
        let mut map = self.entries.write().unwrap();
        if !map.contains_key(key) {
            return Ok(());
        }
        let mut next = map.clone();
        next.remove(key);
        self.persist(&next)?;
        *map = next;
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, LedgerError> {
        Ok(self.entries.read().unwrap().keys().cloned().collect())
    }
}

/// Loads entries from a JSON file on disk; a missing file is an empty store.
fn load_entries(path: &Path) -> Result<BTreeMap<String, String>, LedgerError> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let data = std::fs::read_to_string(path)?;
    if data.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    let entries: BTreeMap<String, String> = serde_json::from_str(&data)?;
    debug!("loaded {} ledger entr(ies) from {:?}", entries.len(), path);
    Ok(entries)
}

/// Returns the default ledger file path.
pub fn default_ledger_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("roomdrop").join("ledger.json"))
}

/// Returns the platform-specific config directory.
fn config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var("HOME")
                    .ok()
                    .map(|h| PathBuf::from(h).join(".config"))
            })
    }

    #[cfg(target_os = "windows")]
    {
        std::env::var("APPDATA").ok().map(PathBuf::from)
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join(".config"))
    }
}
