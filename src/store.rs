use std::fs;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard};

use camino::{Utf8Path, Utf8PathBuf};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::domain::{Account, AccountMap};
use crate::error::LamError;

/// Key under which the account collection is stored.
pub const ACCOUNTS_KEY: &str = "accounts";

/// Opaque key-value backend. `set` and `clear` touch the in-memory view;
/// nothing is durable until `save`.
pub trait BlobStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>, LamError>;
    fn set(&self, key: &str, value: Value) -> Result<(), LamError>;
    fn save(&self) -> Result<(), LamError>;
    fn clear(&self) -> Result<(), LamError>;
}

impl<T: BlobStore + ?Sized> BlobStore for Arc<T> {
    fn get(&self, key: &str) -> Result<Option<Value>, LamError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: Value) -> Result<(), LamError> {
        (**self).set(key, value)
    }

    fn save(&self) -> Result<(), LamError> {
        (**self).save()
    }

    fn clear(&self) -> Result<(), LamError> {
        (**self).clear()
    }
}

/// A single JSON object file, loaded lazily on first access.
#[derive(Debug)]
pub struct JsonFileStore {
    path: Utf8PathBuf,
    entries: Mutex<Option<Map<String, Value>>>,
}

impl JsonFileStore {
    pub fn new(path: Utf8PathBuf) -> Self {
        Self {
            path,
            entries: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    fn lock(&self) -> Result<MutexGuard<'_, Option<Map<String, Value>>>, LamError> {
        self.entries
            .lock()
            .map_err(|_| LamError::Storage("store lock poisoned".to_string()))
    }

    fn with_entries<T>(
        &self,
        f: impl FnOnce(&mut Map<String, Value>) -> T,
    ) -> Result<T, LamError> {
        let mut guard = self.lock()?;
        if guard.is_none() {
            *guard = Some(read_object(&self.path)?);
        }
        let entries = guard.get_or_insert_with(Map::new);
        Ok(f(entries))
    }

    /// Like `with_entries`, but an unreadable file is replaced by an empty
    /// object so that writes can recover from it.
    fn with_entries_for_write<T>(
        &self,
        f: impl FnOnce(&mut Map<String, Value>) -> T,
    ) -> Result<T, LamError> {
        let mut guard = self.lock()?;
        if guard.is_none() {
            let entries = read_object(&self.path).unwrap_or_else(|err| {
                warn!(path = %self.path, error = %err, "discarding unreadable store");
                Map::new()
            });
            *guard = Some(entries);
        }
        let entries = guard.get_or_insert_with(Map::new);
        Ok(f(entries))
    }
}

impl BlobStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<Value>, LamError> {
        self.with_entries(|entries| entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), LamError> {
        self.with_entries_for_write(|entries| {
            entries.insert(key.to_string(), value);
        })
    }

    fn save(&self) -> Result<(), LamError> {
        let content = self.with_entries_for_write(|entries| serde_json::to_vec_pretty(&*entries))?
            .map_err(|err| LamError::Storage(err.to_string()))?;
        write_bytes_atomic(&self.path, &content)?;
        debug!(path = %self.path, bytes = content.len(), "store saved");
        Ok(())
    }

    fn clear(&self) -> Result<(), LamError> {
        let mut guard = self.lock()?;
        *guard = Some(Map::new());
        Ok(())
    }
}

fn read_object(path: &Utf8Path) -> Result<Map<String, Value>, LamError> {
    let content = match fs::read(path.as_std_path()) {
        Ok(content) => content,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Map::new()),
        Err(err) => return Err(LamError::Storage(format!("read {path}: {err}"))),
    };
    if content.iter().all(|byte| byte.is_ascii_whitespace()) {
        return Ok(Map::new());
    }
    serde_json::from_slice(&content).map_err(|err| LamError::Storage(format!("parse {path}: {err}")))
}

/// Writes through a temp file in the target directory, then renames over the target.
pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), LamError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    };
    fs::create_dir_all(parent.as_std_path()).map_err(|err| LamError::Storage(err.to_string()))?;
    let mut temp = tempfile::Builder::new()
        .prefix(".lam-store")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| LamError::Storage(err.to_string()))?;
    temp.write_all(content)
        .map_err(|err| LamError::Storage(err.to_string()))?;
    temp.as_file()
        .sync_all()
        .map_err(|err| LamError::Storage(err.to_string()))?;
    temp.persist(path.as_std_path())
        .map_err(|err| LamError::Storage(err.to_string()))?;
    Ok(())
}

/// Reads and writes the whole account collection as one blob of
/// `[userName, Account]` pairs under [`ACCOUNTS_KEY`].
#[derive(Debug)]
pub struct AccountStore<B: BlobStore> {
    backend: B,
}

impl<B: BlobStore> AccountStore<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// `Ok(None)` when nothing was ever stored.
    pub fn load(&self) -> Result<Option<AccountMap>, LamError> {
        let Some(value) = self.backend.get(ACCOUNTS_KEY)? else {
            return Ok(None);
        };
        if value.is_null() {
            return Ok(None);
        }
        let pairs: Vec<(String, Account)> = serde_json::from_value(value)
            .map_err(|err| LamError::Storage(format!("decode accounts: {err}")))?;
        Ok(Some(pairs.into_iter().collect()))
    }

    /// Full overwrite of the stored collection.
    pub fn save_all(&self, accounts: &AccountMap) -> Result<(), LamError> {
        let value = serde_json::to_value(accounts.entries())
            .map_err(|err| LamError::Storage(err.to_string()))?;
        self.backend.set(ACCOUNTS_KEY, value)?;
        self.backend.save()
    }

    /// Load, insert or replace one account, save everything back.
    pub fn save_account(&self, account: &Account) -> Result<(), LamError> {
        let mut accounts = self.load()?.unwrap_or_default();
        accounts.insert(account.user_name.clone(), account.clone());
        self.save_all(&accounts)
    }

    pub fn clear(&self) -> Result<(), LamError> {
        self.backend.clear()?;
        self.backend.save()
    }
}
