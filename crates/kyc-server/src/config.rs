use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use kyc_ledger::SyncMode;
use serde::{Deserialize, Serialize};

use crate::error::{ServerError, ServerResult};

/// File name of the ledger journal inside `data_dir`.
pub const JOURNAL_FILE: &str = "ledger.journal";
/// File name of the profile store inside `data_dir`.
pub const PROFILES_FILE: &str = "profiles.json";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Holds the ledger journal and the profile store.
    pub data_dir: PathBuf,
    /// Uploaded documents, served back under `/uploads`.
    pub upload_dir: PathBuf,
    /// Browser origins allowed by CORS.
    pub allowed_origins: Vec<String>,
    pub max_upload_bytes: usize,
    pub sync_mode: SyncMode,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 8000)),
            data_dir: PathBuf::from("data"),
            upload_dir: PathBuf::from("uploads"),
            allowed_origins: vec!["http://localhost:5173".into()],
            max_upload_bytes: 10 * 1024 * 1024,
            sync_mode: SyncMode::default(),
        }
    }
}

impl ServerConfig {
    /// Read a TOML config file. Missing keys take their default.
    pub fn load(path: &Path) -> ServerResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ServerError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> ServerResult<Self> {
        toml::from_str(text).map_err(|e| ServerError::Config(e.to_string()))
    }

    pub fn to_toml(&self) -> ServerResult<String> {
        toml::to_string_pretty(self).map_err(|e| ServerError::Config(e.to_string()))
    }

    pub fn journal_path(&self) -> PathBuf {
        self.data_dir.join(JOURNAL_FILE)
    }

    pub fn profiles_path(&self) -> PathBuf {
        self.data_dir.join(PROFILES_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = ServerConfig::default();
        assert_eq!(c.bind_addr, "127.0.0.1:8000".parse::<SocketAddr>().unwrap());
        assert_eq!(c.max_upload_bytes, 10 * 1024 * 1024);
        assert_eq!(c.allowed_origins, vec!["http://localhost:5173".to_string()]);
        assert_eq!(c.sync_mode, SyncMode::OsDefault);
        assert_eq!(c.journal_path(), PathBuf::from("data/ledger.journal"));
        assert_eq!(c.profiles_path(), PathBuf::from("data/profiles.json"));
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let c = ServerConfig::from_toml(
            r#"
            bind_addr = "0.0.0.0:9000"
            sync_mode = "every-write"
            "#,
        )
        .unwrap();
        assert_eq!(c.bind_addr.port(), 9000);
        assert_eq!(c.sync_mode, SyncMode::EveryWrite);
        assert_eq!(c.upload_dir, PathBuf::from("uploads"));
    }

    #[test]
    fn toml_roundtrip() {
        let original = ServerConfig {
            data_dir: "/var/lib/kyc".into(),
            ..ServerConfig::default()
        };
        let parsed = ServerConfig::from_toml(&original.to_toml().unwrap()).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kyc.toml");
        std::fs::write(&path, "max_upload_bytes = 1024\n").unwrap();
        assert_eq!(ServerConfig::load(&path).unwrap().max_upload_bytes, 1024);
    }

    #[test]
    fn invalid_file_is_config_error() {
        let err = ServerConfig::from_toml("bind_addr = 12").unwrap_err();
        assert!(matches!(err, ServerError::Config(_)));
    }
}
