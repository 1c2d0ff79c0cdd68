use std::sync::Arc;

use kyc_ledger::{Ledger, StatusResolver};

use crate::documents::DocumentStore;
use crate::profile::ProfileStore;

/// Handles shared by every request.
///
/// The ledger is owned by the hosting process and injected here; handlers
/// reach it only through the resolver.
#[derive(Clone)]
pub struct AppState {
    pub resolver: StatusResolver<Ledger>,
    pub profiles: Arc<dyn ProfileStore>,
    pub documents: Arc<dyn DocumentStore>,
    pub version: &'static str,
}

impl AppState {
    pub fn new(
        ledger: Arc<Ledger>,
        profiles: Arc<dyn ProfileStore>,
        documents: Arc<dyn DocumentStore>,
    ) -> Self {
        Self {
            resolver: StatusResolver::new(ledger),
            profiles,
            documents,
            version: env!("CARGO_PKG_VERSION"),
        }
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        self.resolver.ledger()
    }
}
