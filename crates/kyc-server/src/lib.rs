//! HTTP boundary for the KYC ledger.
//!
//! Accepts applicant submissions (profile fields plus an identity document),
//! records verifier decisions, and answers status queries by folding the
//! ledger. Also exposes read-only audit endpoints over the raw entry history.

pub mod config;
pub mod documents;
pub mod error;
pub mod handler;
pub mod profile;
pub mod router;
pub mod server;
pub mod state;

pub use config::ServerConfig;
pub use documents::{DirectoryDocumentStore, DocumentStore};
pub use error::{ServerError, ServerResult};
pub use profile::{InMemoryProfileStore, JsonFileProfileStore, Profile, ProfileStore};
pub use server::KycServer;
pub use state::AppState;
