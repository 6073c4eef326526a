use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

const FORMAT_VERSION: u32 = 1;

/// JSON file holding the conversation → assistant thread mapping across launches.
#[derive(Clone, Debug)]
pub struct ThreadMapStore {
    path: PathBuf,
}

#[derive(Serialize, Deserialize)]
struct ThreadMapFile {
    version: u32,
    #[serde(default)]
    threads: BTreeMap<String, String>,
}

impl ThreadMapStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store in a fresh temp location; for tests and the smoke task.
    pub fn temporary() -> Self {
        let mut path = std::env::temp_dir();
        path.push(format!("fitcoach-{}", Uuid::new_v4()));
        path.push("threads.json");
        Self::new(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        let file: ThreadMapFile = serde_json::from_str(&contents)
            .with_context(|| format!("invalid thread map {}", self.path.display()))?;
        if file.version != FORMAT_VERSION {
            anyhow::bail!(
                "unsupported thread map version {} in {}",
                file.version,
                self.path.display()
            );
        }
        Ok(file.threads)
    }

    pub fn persist(&self, threads: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let file = ThreadMapFile {
            version: FORMAT_VERSION,
            threads: threads.clone(),
        };
        let serialized = serde_json::to_vec_pretty(&file)?;
        let tmp = self.path.with_extension(format!("{}.tmp", Uuid::new_v4()));
        fs::write(&tmp, serialized)?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        Ok(())
    }
}
