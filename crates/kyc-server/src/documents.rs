use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use kyc_types::SubjectId;

use crate::error::{ServerError, ServerResult};

/// URL prefix under which stored documents are served.
pub const UPLOADS_ROUTE: &str = "/uploads";

/// Blob store for uploaded identity documents.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Store `contents` and return the location string recorded in the ledger.
    async fn save(&self, subject: &SubjectId, file_name: &str, contents: Bytes) -> ServerResult<String>;
}

/// Stores each document as `<root>/<subject>_<file name>`.
pub struct DirectoryDocumentStore {
    root: PathBuf,
}

impl DirectoryDocumentStore {
    pub async fn open(root: &Path) -> ServerResult<Self> {
        tokio::fs::create_dir_all(root).await?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl DocumentStore for DirectoryDocumentStore {
    async fn save(&self, subject: &SubjectId, file_name: &str, contents: Bytes) -> ServerResult<String> {
        let stored_name = format!("{}_{}", subject.as_str(), sanitize_file_name(file_name)?);
        let path = self.root.join(&stored_name);
        tokio::fs::write(&path, &contents).await?;
        tracing::debug!(path = %path.display(), len = contents.len(), "stored document");
        Ok(format!("{UPLOADS_ROUTE}/{stored_name}"))
    }
}

/// Reduce an uploaded file name to its final component, keeping only
/// characters that are safe in a path and a URL.
fn sanitize_file_name(raw: &str) -> ServerResult<String> {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        return Err(ServerError::BadRequest(format!("unusable file name {raw:?}")));
    }
    Ok(cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_directories_and_odd_characters() {
        assert_eq!(sanitize_file_name("passport.png").unwrap(), "passport.png");
        assert_eq!(sanitize_file_name("../../etc/passwd").unwrap(), "passwd");
        assert_eq!(sanitize_file_name("C:\\scans\\id card.jpg").unwrap(), "id_card.jpg");
        assert_eq!(sanitize_file_name(".hidden").unwrap(), "hidden");
        assert!(sanitize_file_name("..").is_err());
        assert!(sanitize_file_name("").is_err());
    }

    #[tokio::test]
    async fn save_writes_under_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryDocumentStore::open(&dir.path().join("uploads")).await.unwrap();
        let subject = SubjectId::new("abc").unwrap();

        let location = store
            .save(&subject, "id.png", Bytes::from_static(b"\x89PNG"))
            .await
            .unwrap();
        assert_eq!(location, "/uploads/abc_id.png");
        assert_eq!(
            std::fs::read(store.root().join("abc_id.png")).unwrap(),
            b"\x89PNG"
        );
    }
}
