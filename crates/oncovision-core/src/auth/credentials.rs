//! Durable key/value storage for the three session fields.
//!
//! The store is deliberately dumb: `get` never fails and `set`/`clear` are
//! fire-and-forget. Backend failures are logged and read back as absent.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use keyring::Entry;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Keychain service name for the keyring backend
const SERVICE_NAME: &str = "oncovision";

/// Credentials file name in the config directory
const CREDENTIALS_FILE: &str = "credentials.json";

/// Owner read/write only
#[cfg(unix)]
const CREDENTIALS_FILE_MODE: u32 = 0o600;

/// The persisted session keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CredentialKey {
    #[serde(rename = "accessToken")]
    AccessToken,
    #[serde(rename = "refreshToken")]
    RefreshToken,
    #[serde(rename = "username")]
    Username,
}

impl CredentialKey {
    pub const ALL: [CredentialKey; 3] = [
        CredentialKey::AccessToken,
        CredentialKey::RefreshToken,
        CredentialKey::Username,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialKey::AccessToken => "accessToken",
            CredentialKey::RefreshToken => "refreshToken",
            CredentialKey::Username => "username",
        }
    }
}

impl fmt::Display for CredentialKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub trait CredentialStore: Send + Sync {
    fn get(&self, key: CredentialKey) -> Option<String>;

    fn set(&self, key: CredentialKey, value: &str);

    fn clear(&self, key: CredentialKey);

    /// Remove every session key.
    fn clear_all(&self) {
        for key in CredentialKey::ALL {
            self.clear(key);
        }
    }

    /// Short backend name for status output and logs.
    fn name(&self) -> &'static str;
}

// ============================================================================
// In-memory backend
// ============================================================================

/// Process-local store, used by tests and by embedders that persist elsewhere.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    values: Mutex<HashMap<CredentialKey, String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.values.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self, key: CredentialKey) -> Option<String> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned()
    }

    fn set(&self, key: CredentialKey, value: &str) {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, value.to_string());
    }

    fn clear(&self, key: CredentialKey) {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key);
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

// ============================================================================
// JSON file backend
// ============================================================================

/// Stores the keys in a single JSON object on disk.
///
/// Every operation goes to disk so that separate processes (one CLI
/// invocation after another) observe each other's writes.
pub struct FileCredentialStore {
    path: PathBuf,
    // Serializes read-modify-write within this process
    write_lock: Mutex<()>,
}

impl FileCredentialStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    /// Store under `<dir>/credentials.json`.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(CREDENTIALS_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> HashMap<CredentialKey, String> {
        if !self.path.exists() {
            return HashMap::new();
        }
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read credentials file");
                return HashMap::new();
            }
        };
        match serde_json::from_str(&contents) {
            Ok(values) => values,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to parse credentials file");
                HashMap::new()
            }
        }
    }

    fn write_all(&self, values: &HashMap<CredentialKey, String>) -> std::io::Result<()> {
        if values.is_empty() {
            if self.path.exists() {
                std::fs::remove_file(&self.path)?;
            }
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(values)?;
        write_private(&self.path, contents.as_bytes())
    }

    fn update(&self, f: impl FnOnce(&mut HashMap<CredentialKey, String>)) {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut values = self.read_all();
        f(&mut values);
        if let Err(e) = self.write_all(&values) {
            warn!(path = %self.path.display(), error = %e, "Failed to write credentials file");
        }
    }
}

/// Write `contents` readable by the owner only; the file holds bearer tokens.
#[cfg(unix)]
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(CREDENTIALS_FILE_MODE)
        .open(path)?;
    // mode() only applies on creation; tighten a file left by an older write
    file.set_permissions(std::fs::Permissions::from_mode(CREDENTIALS_FILE_MODE))?;
    file.write_all(contents)?;
    file.sync_all()
}

#[cfg(not(unix))]
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    std::fs::write(path, contents)
}

impl CredentialStore for FileCredentialStore {
    fn get(&self, key: CredentialKey) -> Option<String> {
        self.read_all().remove(&key)
    }

    fn set(&self, key: CredentialKey, value: &str) {
        self.update(|values| {
            values.insert(key, value.to_string());
        });
    }

    fn clear(&self, key: CredentialKey) {
        self.update(|values| {
            values.remove(&key);
        });
    }

    fn clear_all(&self) {
        self.update(|values| values.clear());
    }

    fn name(&self) -> &'static str {
        "file"
    }
}

// ============================================================================
// OS keychain backend
// ============================================================================

/// Stores each key as a separate keychain entry.
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

    fn entry(&self, key: CredentialKey) -> Option<Entry> {
        match Entry::new(&self.service, key.as_str()) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to create keyring entry");
                None
            }
        }
    }
}

impl Default for KeyringCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore for KeyringCredentialStore {
    fn get(&self, key: CredentialKey) -> Option<String> {
        let entry = self.entry(key)?;
        match entry.get_password() {
            Ok(value) => Some(value),
            Err(keyring::Error::NoEntry) => None,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to read from keychain");
                None
            }
        }
    }

    fn set(&self, key: CredentialKey, value: &str) {
        if let Some(entry) = self.entry(key) {
            if let Err(e) = entry.set_password(value) {
                warn!(key = %key, error = %e, "Failed to store value in keychain");
            }
        }
    }

    fn clear(&self, key: CredentialKey) {
        if let Some(entry) = self.entry(key) {
            match entry.delete_credential() {
                Ok(()) | Err(keyring::Error::NoEntry) => {}
                Err(e) => warn!(key = %key, error = %e, "Failed to delete keychain entry"),
            }
        }
        debug!(key = %key, "Keychain entry cleared");
    }

    fn name(&self) -> &'static str {
        "keyring"
    }
}
