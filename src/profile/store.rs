//! Profile persistence: durable mapping from user to company profile.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::error::StoreError;

use super::model::{CompanyProfile, UserId};

/// Backend-agnostic profile store.
///
/// `put` fully replaces any earlier record for the user. Reads never fail:
/// a store that cannot load its backing data behaves as empty.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Get the saved profile for a user.
    async fn get(&self, user: &UserId) -> Option<CompanyProfile>;

    /// Save (overwrite) the profile for a user.
    async fn put(&self, user: &UserId, profile: CompanyProfile) -> Result<(), StoreError>;
}

/// Profile store backed by a single pretty-printed JSON file.
///
/// The whole map is cached in memory and rewritten on every `put`. Writes
/// go through a temp file and a rename so a crash never leaves a truncated
/// file behind.
pub struct JsonProfileStore {
    path: PathBuf,
    profiles: RwLock<BTreeMap<UserId, CompanyProfile>>,
    write_lock: Mutex<()>,
}

impl JsonProfileStore {
    /// Open the store at `path`. A missing or malformed file yields an
    /// empty store.
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let profiles = load_profiles(&path).await;
        tracing::info!(
            path = %path.display(),
            profiles = profiles.len(),
            "Profile store loaded"
        );
        Self {
            path,
            profiles: RwLock::new(profiles),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of saved profiles.
    pub async fn len(&self) -> usize {
        self.profiles.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.profiles.read().await.is_empty()
    }
}

#[async_trait]
impl ProfileStore for JsonProfileStore {
    async fn get(&self, user: &UserId) -> Option<CompanyProfile> {
        self.profiles.read().await.get(user).cloned()
    }

    async fn put(&self, user: &UserId, profile: CompanyProfile) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;

        let mut snapshot = self.profiles.read().await.clone();
        snapshot.insert(user.clone(), profile.clone());

        let mut encoded = serde_json::to_string_pretty(&snapshot)?;
        encoded.push('\n');
        write_atomic(&self.path, &encoded).await?;

        self.profiles.write().await.insert(user.clone(), profile);
        tracing::debug!(user_id = %user, "Profile saved");
        Ok(())
    }
}

/// In-process profile store. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryProfileStore {
    profiles: RwLock<HashMap<UserId, CompanyProfile>>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn get(&self, user: &UserId) -> Option<CompanyProfile> {
        self.profiles.read().await.get(user).cloned()
    }

    async fn put(&self, user: &UserId, profile: CompanyProfile) -> Result<(), StoreError> {
        self.profiles.write().await.insert(user.clone(), profile);
        Ok(())
    }
}

async fn load_profiles(path: &Path) -> BTreeMap<UserId, CompanyProfile> {
    let raw = match fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
        Err(e) => {
            tracing::warn!(path = %path.display(), "Failed to read profile store, starting empty: {e}");
            return BTreeMap::new();
        }
    };

    match serde_json::from_str(&raw) {
        Ok(profiles) => profiles,
        Err(e) => {
            tracing::warn!(path = %path.display(), "Malformed profile store, starting empty: {e}");
            BTreeMap::new()
        }
    }
}

/// Write `content` to a sibling temp file, then rename it over `path`.
pub(crate) async fn write_atomic(path: &Path, content: impl AsRef<[u8]>) -> Result<(), StoreError> {
    let io_err = |source| StoreError::Io {
        path: path.display().to_string(),
        source,
    };

    let parent = path
        .parent()
        .ok_or_else(|| StoreError::InvalidPath(path.display().to_string()))?;
    if !parent.as_os_str().is_empty() {
        fs::create_dir_all(parent).await.map_err(io_err)?;
    }

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| StoreError::InvalidPath(path.display().to_string()))?;
    let tmp_path = path.with_file_name(format!(".{file_name}.{}.tmp", Uuid::new_v4()));

    if let Err(e) = fs::write(&tmp_path, content).await {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(io_err(e));
    }
    if let Err(e) = fs::rename(&tmp_path, path).await {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(io_err(e));
    }
    Ok(())
}
