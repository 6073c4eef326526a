use anyhow::{bail, Context, Result};
use directories::ProjectDirs;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// Key-value storage the auth client keeps its session in.
pub trait TokenStore: Send + Sync {
    fn name(&self) -> &'static str;
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
    fn keys(&self) -> Result<Vec<String>>;
}

/// Whether `key` holds a cached auth token (`sb-<ref>-auth-token` and friends).
pub fn is_auth_token_key(key: &str) -> bool {
    key.starts_with("sb-") && key.contains("auth-token")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenStoreKind {
    /// Browser-style storage, lives as long as the process.
    Memory,
    /// OS-level private storage on device.
    Secure,
}

impl TokenStoreKind {
    pub fn for_platform() -> Self {
        if cfg!(target_arch = "wasm32") {
            Self::Memory
        } else {
            Self::Secure
        }
    }

    pub fn open(self) -> Result<Arc<dyn TokenStore>> {
        match self {
            Self::Memory => Ok(Arc::new(MemoryTokenStore::default())),
            Self::Secure => Ok(Arc::new(FileTokenStore::default_location()?)),
        }
    }
}

#[derive(Default)]
pub struct MemoryTokenStore {
    entries: RwLock<HashMap<String, String>>,
}

impl TokenStore for MemoryTokenStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.write().insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.write().remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.entries.read().keys().cloned().collect())
    }
}

/// One file per key inside a private directory.
#[derive(Clone)]
pub struct FileTokenStore {
    root: PathBuf,
}

impl FileTokenStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("failed to create {}", root.display()))?;
        restrict_permissions(&root, 0o700)?;
        Ok(Self { root })
    }

    pub fn default_location() -> Result<Self> {
        let dirs = ProjectDirs::from("app", "fitcoach", "fitcoach")
            .context("no home directory for secure token storage")?;
        Self::new(dirs.data_local_dir().join("secure-store"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.'))
            && !key.starts_with('.');
        if !valid {
            bail!("unsupported token key {key:?}");
        }
        Ok(self.root.join(key))
    }
}

impl TokenStore for FileTokenStore {
    fn name(&self) -> &'static str {
        "secure"
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.entry_path(key)?;
        match fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| format!("failed to read {}", path.display())),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.entry_path(key)?;
        let tmp = self.root.join(format!(".{}.tmp", Uuid::new_v4()));
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(value.as_bytes())?;
            file.sync_all()?;
        }
        restrict_permissions(&tmp, 0o600)?;
        fs::rename(&tmp, &path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.entry_path(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).with_context(|| format!("failed to remove {}", path.display())),
        }
    }

    fn keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if !name.starts_with('.') {
                    keys.push(name.to_owned());
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}
