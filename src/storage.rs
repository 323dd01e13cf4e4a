use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::errors::StorageError;

/// Key-value persistence port backing the cart store.
///
/// The cart writes its full serialized line list under a fixed key after
/// every mutation (write-through) and reads it back once at construction.
/// Keeping this a port separates the pure cart transition from the side
/// effect, so the store stays testable without a real backend.
pub trait CartStorage: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn write(&self, key: &str, snapshot: &str) -> Result<(), StorageError>;
}

/// Volatile storage for tests and the demo binary.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CartStorage for InMemoryStorage {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| StorageError::Backend("storage lock poisoned".to_string()))?;
        Ok(entries.get(key).cloned())
    }

    fn write(&self, key: &str, snapshot: &str) -> Result<(), StorageError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| StorageError::Backend("storage lock poisoned".to_string()))?;
        entries.insert(key.to_string(), snapshot.to_string());
        Ok(())
    }
}

/// File-backed storage: one JSON file per key under a base directory.
///
/// This is the durable analogue of the browser's local storage; a reload of
/// the embedding application reconstructs the cart from the same file.
#[derive(Debug)]
pub struct JsonFileStorage {
    dir: PathBuf,
}

impl JsonFileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        // Keys are dotted identifiers; anything else is flattened defensively.
        let safe: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            })
            .collect();
        self.dir.join(format!("{}.json", safe))
    }
}

impl CartStorage for JsonFileStorage {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    fn write(&self, key: &str, snapshot: &str) -> Result<(), StorageError> {
        fs::write(self.path_for(key), snapshot)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_round_trip() {
        let storage = InMemoryStorage::new();
        assert!(storage.read("cart").expect("read").is_none());

        storage.write("cart", "[]").expect("write");
        assert_eq!(storage.read("cart").expect("read").as_deref(), Some("[]"));
    }

    #[test]
    fn file_storage_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = JsonFileStorage::new(dir.path()).expect("storage");

        assert!(storage.read("rentkart.cart.v1").expect("read").is_none());
        storage
            .write("rentkart.cart.v1", r#"[{"quantity":1}]"#)
            .expect("write");
        assert_eq!(
            storage.read("rentkart.cart.v1").expect("read").as_deref(),
            Some(r#"[{"quantity":1}]"#)
        );
    }

    #[test]
    fn file_storage_flattens_hostile_keys() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = JsonFileStorage::new(dir.path()).expect("storage");

        storage.write("../escape", "x").expect("write");
        assert_eq!(storage.read("../escape").expect("read").as_deref(), Some("x"));
        // Nothing may land outside the base directory.
        assert!(dir.path().join(".._escape.json").exists());
    }
}
