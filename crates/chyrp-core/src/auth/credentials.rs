use std::collections::{BTreeMap, HashMap};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use keyring::Entry;
use thiserror::Error;
use tracing::{debug, warn};

/// Store key holding the bearer access token
pub const ACCESS_TOKEN_KEY: &str = "access_token";

/// Store key holding the refresh token
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";

/// Keychain service name
const SERVICE_NAME: &str = "chyrp";

/// Credential file name in the config directory
const CREDENTIALS_FILE: &str = "credentials.json";

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("Keychain error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("Credential file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Credential file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Durable key-value storage for session credentials.
///
/// Values must survive a process restart. The store never expires entries
/// itself; a token is stale only once the server rejects it.
pub trait CredentialStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, CredentialError>;
    fn set(&self, key: &str, value: &str) -> Result<(), CredentialError>;
    fn remove(&self, key: &str) -> Result<(), CredentialError>;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// OS keychain
// ============================================================================

/// Credentials kept in the OS keychain, one entry per key.
pub struct KeyringCredentialStore {
    service: String,
}

impl KeyringCredentialStore {
    pub fn new() -> Self {
        Self::with_service(SERVICE_NAME)
    }

    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, key: &str) -> Result<Entry, CredentialError> {
        Ok(Entry::new(&self.service, key)?)
    }
}

impl Default for KeyringCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore for KeyringCredentialStore {
    fn get(&self, key: &str) -> Result<Option<String>, CredentialError> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CredentialError> {
        self.entry(key)?.set_password(value)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CredentialError> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// ============================================================================
// JSON file
// ============================================================================

/// Credentials kept in a JSON file readable only by the current user.
pub struct FileCredentialStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process
    guard: Mutex<()>,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    /// Store located in the given config directory
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(CREDENTIALS_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>, CredentialError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let contents = std::fs::read_to_string(&self.path)?;
        if contents.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_str(&contents)?)
    }

    /// Contents for a read-modify-write, plus whether the file on disk was
    /// unreadable. A corrupt file holds nothing worth keeping and gets replaced.
    fn read_for_update(&self) -> Result<(BTreeMap<String, String>, bool), CredentialError> {
        match self.read_all() {
            Ok(values) => Ok((values, false)),
            Err(CredentialError::Corrupt(e)) => {
                warn!(path = %self.path.display(), error = %e, "Discarding corrupt credential file");
                Ok((BTreeMap::new(), true))
            }
            Err(e) => Err(e),
        }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn write_all(&self, values: &BTreeMap<String, String>) -> Result<(), CredentialError> {
        if values.is_empty() {
            if self.path.exists() {
                std::fs::remove_file(&self.path)?;
                debug!(path = %self.path.display(), "Removed empty credential file");
            }
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(values)?;

        // Write a private temp file next to the target, then rename over it
        let tmp_path = self.temp_path();
        match std::fs::remove_file(&tmp_path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        let mut tmp_file = private_file_options().open(&tmp_path)?;
        tmp_file.write_all(contents.as_bytes())?;
        tmp_file.sync_all()?;
        drop(tmp_file);

        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

/// Options for a new file only the current user can read
fn private_file_options() -> OpenOptions {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options
}

impl CredentialStore for FileCredentialStore {
    fn get(&self, key: &str) -> Result<Option<String>, CredentialError> {
        let _guard = lock(&self.guard);
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CredentialError> {
        let _guard = lock(&self.guard);
        let (mut values, _) = self.read_for_update()?;
        values.insert(key.to_string(), value.to_string());
        self.write_all(&values)
    }

    fn remove(&self, key: &str) -> Result<(), CredentialError> {
        let _guard = lock(&self.guard);
        let (mut values, corrupt) = self.read_for_update()?;
        if values.remove(key).is_some() || corrupt {
            self.write_all(&values)?;
        }
        Ok(())
    }
}

// ============================================================================
// In-memory
// ============================================================================

/// Process-local store. Nothing survives a restart; meant for tests and
/// for embedding where the host owns persistence.
#[derive(Default)]
pub struct MemoryCredentialStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        lock(&self.values).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.values).is_empty()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self, key: &str) -> Result<Option<String>, CredentialError> {
        Ok(lock(&self.values).get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CredentialError> {
        lock(&self.values).insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CredentialError> {
        lock(&self.values).remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_store_round_trip_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::in_dir(dir.path());
        assert_eq!(store.get(ACCESS_TOKEN_KEY).unwrap(), None);

        store.set(ACCESS_TOKEN_KEY, "A").unwrap();
        store.set(REFRESH_TOKEN_KEY, "R").unwrap();

        let reopened = FileCredentialStore::in_dir(dir.path());
        assert_eq!(reopened.get(ACCESS_TOKEN_KEY).unwrap().as_deref(), Some("A"));
        assert_eq!(reopened.get(REFRESH_TOKEN_KEY).unwrap().as_deref(), Some("R"));
    }

    #[test]
    fn test_file_store_remove_deletes_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::in_dir(dir.path());
        store.set(ACCESS_TOKEN_KEY, "A").unwrap();
        assert!(store.path().exists());

        store.remove(ACCESS_TOKEN_KEY).unwrap();
        store.remove(ACCESS_TOKEN_KEY).unwrap();
        assert!(!store.path().exists());
        assert_eq!(store.get(ACCESS_TOKEN_KEY).unwrap(), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_file_store_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::in_dir(dir.path());
        store.set(ACCESS_TOKEN_KEY, "A").unwrap();
        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[cfg(unix)]
    #[test]
    fn test_file_store_replaces_readable_file() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::in_dir(dir.path());
        std::fs::write(store.path(), "{}").unwrap();
        std::fs::set_permissions(store.path(), std::fs::Permissions::from_mode(0o644)).unwrap();
        // A temp file left behind by an interrupted write
        std::fs::write(store.temp_path(), "{\"access_token\": \"old\"}").unwrap();
        std::fs::set_permissions(store.temp_path(), std::fs::Permissions::from_mode(0o644))
            .unwrap();

        store.set(ACCESS_TOKEN_KEY, "A").unwrap();

        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert!(!store.temp_path().exists());
        assert_eq!(store.get(ACCESS_TOKEN_KEY).unwrap().as_deref(), Some("A"));
    }

    #[test]
    fn test_file_store_writes_leave_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::in_dir(dir.path());
        store.set(ACCESS_TOKEN_KEY, "A").unwrap();
        store.set(REFRESH_TOKEN_KEY, "R").unwrap();

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from(CREDENTIALS_FILE)]);
    }

    #[test]
    fn test_file_store_reports_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::in_dir(dir.path());
        std::fs::write(store.path(), "not json").unwrap();
        assert!(matches!(
            store.get(ACCESS_TOKEN_KEY),
            Err(CredentialError::Corrupt(_))
        ));
    }

    #[test]
    fn test_file_store_recovers_from_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::in_dir(dir.path());

        std::fs::write(store.path(), r#"{"access_token": "A"#).unwrap();
        store.remove(REFRESH_TOKEN_KEY).unwrap();
        assert!(!store.path().exists());

        std::fs::write(store.path(), "not json").unwrap();
        store.set(ACCESS_TOKEN_KEY, "B").unwrap();
        assert_eq!(store.get(ACCESS_TOKEN_KEY).unwrap().as_deref(), Some("B"));
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryCredentialStore::new();
        store.set(ACCESS_TOKEN_KEY, "A").unwrap();
        assert_eq!(store.len(), 1);
        store.remove(ACCESS_TOKEN_KEY).unwrap();
        store.remove(REFRESH_TOKEN_KEY).unwrap();
        assert!(store.is_empty());
    }
}
