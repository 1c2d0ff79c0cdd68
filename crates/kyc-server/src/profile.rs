use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use kyc_crypto::EntryHasher;
use kyc_types::{Digest, SubjectId};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::{ServerError, ServerResult};

/// Applicant fields captured at submission.
///
/// Kept outside the ledger; the ledger only records the profile's digest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub name: String,
    pub dob: String,
    pub address: String,
    pub document_id: String,
    pub document_location: String,
}

impl Profile {
    /// Canonical fingerprint, recorded in the submission entry.
    pub fn digest(&self) -> ServerResult<Digest> {
        EntryHasher::PROFILE
            .hash_canonical(self)
            .map_err(|e| ServerError::Internal(e.to_string()))
    }
}

/// Mutable key/value store of applicant profiles.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn put(&self, subject: &SubjectId, profile: Profile) -> ServerResult<()>;
    async fn get(&self, subject: &SubjectId) -> ServerResult<Option<Profile>>;
}

#[derive(Default)]
pub struct InMemoryProfileStore {
    profiles: RwLock<HashMap<SubjectId, Profile>>,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn put(&self, subject: &SubjectId, profile: Profile) -> ServerResult<()> {
        self.profiles
            .write()
            .map_err(|_| ServerError::Internal("profile store lock poisoned".into()))?
            .insert(subject.clone(), profile);
        Ok(())
    }

    async fn get(&self, subject: &SubjectId) -> ServerResult<Option<Profile>> {
        Ok(self
            .profiles
            .read()
            .map_err(|_| ServerError::Internal("profile store lock poisoned".into()))?
            .get(subject)
            .cloned())
    }
}

/// Profiles kept in a single pretty-printed JSON object keyed by subject id.
///
/// The whole file is rewritten on every `put`, through a temporary file and a
/// rename, so a crash never leaves a half-written store.
pub struct JsonFileProfileStore {
    path: PathBuf,
    profiles: Mutex<BTreeMap<String, Profile>>,
}

impl JsonFileProfileStore {
    pub async fn open(path: &Path) -> ServerResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let profiles = match tokio::fs::read(path).await {
            Ok(bytes) if bytes.is_empty() => BTreeMap::new(),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                ServerError::Storage(format!("{}: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        tracing::debug!(path = %path.display(), count = profiles.len(), "loaded profile store");
        Ok(Self {
            path: path.to_path_buf(),
            profiles: Mutex::new(profiles),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ProfileStore for JsonFileProfileStore {
    async fn put(&self, subject: &SubjectId, profile: Profile) -> ServerResult<()> {
        let mut profiles = self.profiles.lock().await;
        let mut updated = profiles.clone();
        updated.insert(subject.as_str().to_string(), profile);

        let bytes = serde_json::to_vec_pretty(&updated)
            .map_err(|e| ServerError::Storage(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        *profiles = updated;
        Ok(())
    }

    async fn get(&self, subject: &SubjectId) -> ServerResult<Option<Profile>> {
        Ok(self.profiles.lock().await.get(subject.as_str()).cloned())
    }
}
