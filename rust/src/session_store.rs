//! Credential persistence for the signed-in session.
//!
//! On iOS/Android the platform vault (`keyring-core` default store) holds the
//! values. Targets without a native vault fall back to a small JSON key-value
//! file inside the app data dir, readable only by the current user.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use anyhow::{anyhow, Context, Result};

// Keep stable IDs; the keychain entries outlive app upgrades.
pub const SERVICE_ID: &str = "com.artisthub.app";
pub const SESSION_KEY: &str = "artisthub.session";

pub const FALLBACK_FILE: &str = "session_store.json";

pub fn init_keyring_once(#[allow(unused)] keychain_group: &str) -> Result<()> {
    static INIT: OnceLock<std::result::Result<(), String>> = OnceLock::new();
    match INIT.get_or_init(|| init_keyring_inner(keychain_group).map_err(|e| e.to_string())) {
        Ok(()) => Ok(()),
        Err(e) => Err(anyhow!(e.clone())),
    }
}

fn init_keyring_inner(#[allow(unused)] keychain_group: &str) -> Result<()> {
    // `set_default_store` can only be called once per process; guarded by `OnceLock` above.
    #[cfg(target_os = "ios")]
    {
        let mut config = std::collections::HashMap::new();
        config.insert("access-group", keychain_group);
        let store = apple_native_keyring_store::protected::Store::new_with_configuration(&config)
            .context("failed to create Apple protected keyring store with shared access group")?;
        keyring_core::set_default_store(store);
        return Ok(());
    }

    #[cfg(target_os = "android")]
    {
        use android_native_keyring_store::credential::AndroidStore;

        let store = AndroidStore::from_ndk_context().context(
            "Android keyring store not initialized. Call Keyring.init(context) early in MainActivity.",
        )?;
        keyring_core::set_default_store(store);
        return Ok(());
    }

    #[cfg(not(any(target_os = "android", target_os = "ios")))]
    {
        Err(anyhow!("no platform credential vault on this target"))
    }
}

enum Backing {
    Vault,
    File {
        path: PathBuf,
        // Serializes read-modify-write cycles on the fallback file.
        lock: Mutex<()>,
    },
}

pub struct SessionStore {
    backing: Backing,
}

impl SessionStore {
    /// Prefer the platform vault; fall back to the data-dir file when it is unavailable.
    pub fn open(data_dir: &str, keychain_group: &str) -> Self {
        match init_keyring_once(keychain_group) {
            Ok(()) => {
                tracing::info!("session store: using platform credential vault");
                Self {
                    backing: Backing::Vault,
                }
            }
            Err(e) => {
                tracing::info!(%e, "session store: falling back to data dir file");
                Self::file_backed(Path::new(data_dir).join(FALLBACK_FILE))
            }
        }
    }

    pub fn file_backed(path: PathBuf) -> Self {
        Self {
            backing: Backing::File {
                path,
                lock: Mutex::new(()),
            },
        }
    }

    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        match &self.backing {
            Backing::Vault => vault_entry(key)?
                .set_password(value)
                .with_context(|| format!("keyring write failed for {key}")),
            Backing::File { path, lock } => {
                let _guard = lock.lock().unwrap_or_else(|poison| poison.into_inner());
                let mut map = read_map(path)?;
                map.insert(key.to_string(), value.to_string());
                write_map(path, &map)
            }
        }
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        match &self.backing {
            Backing::Vault => match vault_entry(key)?.get_password() {
                Ok(v) => Ok(Some(v)),
                Err(keyring_core::Error::NoEntry) => Ok(None),
                Err(e) => Err(anyhow!(e).context(format!("keyring read failed for {key}"))),
            },
            Backing::File { path, lock } => {
                let _guard = lock.lock().unwrap_or_else(|poison| poison.into_inner());
                Ok(read_map(path)?.remove(key))
            }
        }
    }

    /// Deleting a missing key is not an error.
    pub fn delete(&self, key: &str) -> Result<()> {
        match &self.backing {
            Backing::Vault => match vault_entry(key)?.delete_credential() {
                Ok(()) | Err(keyring_core::Error::NoEntry) => Ok(()),
                Err(e) => Err(anyhow!(e).context(format!("keyring delete failed for {key}"))),
            },
            Backing::File { path, lock } => {
                let _guard = lock.lock().unwrap_or_else(|poison| poison.into_inner());
                let mut map = read_map(path)?;
                if map.remove(key).is_some() {
                    write_map(path, &map)?;
                }
                Ok(())
            }
        }
    }
}

fn vault_entry(key: &str) -> Result<keyring_core::Entry> {
    keyring_core::Entry::new(SERVICE_ID, key)
        .with_context(|| format!("keyring entry unavailable for {key}"))
}

fn read_map(path: &Path) -> Result<BTreeMap<String, String>> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(e) => return Err(e).with_context(|| format!("read {}", path.display())),
    };
    if raw.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))
}

fn write_map(path: &Path, map: &BTreeMap<String, String>) -> Result<()> {
    let bytes = serde_json::to_vec(map).context("encode session store")?;
    let tmp = path.with_extension("json.tmp");
    write_private_file(&tmp, &bytes).with_context(|| format!("write {}", tmp.display()))?;
    std::fs::rename(&tmp, path).with_context(|| format!("replace {}", path.display()))
}

/// Mode 0600 from creation on unix.
fn write_private_file(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    use std::io::Write;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    // A leftover from an interrupted write keeps whatever mode it had; start over.
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}
