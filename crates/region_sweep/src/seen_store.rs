use std::collections::HashSet;
use std::io;
use std::path::PathBuf;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::sweep_types::SweepError;

/// Persistent set of result keys already reported
///
/// The file holds one key per line. It is read once at load and rewritten
/// atomically on [`SeenSetStore::flush`].
pub struct SeenSetStore {
    path: PathBuf,
    keys: Mutex<HashSet<String>>,
}

impl SeenSetStore {
    /// Load keys from `path`; a missing file means an empty set
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, SweepError> {
        let path = path.into();

        let read = tokio::fs::read_to_string(&path).await;
        let keys = match read {
            Ok(contents) => contents
                .split('\n')
                .map(|line| line.strip_suffix('\r').unwrap_or(line))
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No seen-set at {}, starting empty", path.display());
                HashSet::new()
            }
            Err(source) => return Err(SweepError::Persistence { path, source }),
        };

        info!("Loaded {} seen result keys from {}", keys.len(), path.display());

        Ok(Self {
            path,
            keys: Mutex::new(keys),
        })
    }

    /// In-memory store seeded with `keys`, persisted to `path` on flush
    pub fn with_keys(path: impl Into<PathBuf>, keys: impl IntoIterator<Item = String>) -> Self {
        Self {
            path: path.into(),
            keys: Mutex::new(keys.into_iter().collect()),
        }
    }

    /// Whether `key` was already reported
    pub async fn contains(&self, key: &str) -> bool {
        self.keys.lock().await.contains(key)
    }

    /// Insert `key`, returning true only for the caller that added it first
    pub async fn add_if_absent(&self, key: &str) -> bool {
        let mut keys = self.keys.lock().await;
        if keys.contains(key) {
            return false;
        }
        keys.insert(key.to_string())
    }

    /// Number of keys held
    pub async fn len(&self) -> usize {
        self.keys.lock().await.len()
    }

    /// Whether the set is empty
    pub async fn is_empty(&self) -> bool {
        self.keys.lock().await.is_empty()
    }

    /// Sorted copy of the keys
    pub async fn snapshot(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.keys.lock().await.iter().cloned().collect();
        keys.sort();
        keys
    }

    /// Write every key to disk, replacing the previous file
    pub async fn flush(&self) -> Result<(), SweepError> {
        let keys = self.snapshot().await;
        let mut contents = keys.join("\n");
        contents.push('\n');

        let tmp_path = self.tmp_path();
        let persist = async {
            tokio::fs::write(&tmp_path, contents.as_bytes()).await?;
            tokio::fs::rename(&tmp_path, &self.path).await
        };

        persist
            .await
            .map_err(|source| SweepError::Persistence {
                path: self.path.clone(),
                source,
            })?;

        info!("Persisted {} seen result keys to {}", keys.len(), self.path.display());
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }
}
