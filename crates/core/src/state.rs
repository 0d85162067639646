//! Application state shared across all handlers.

use std::sync::Arc;

use crate::config::Config;
use crate::session::{RefreshTokenVerifier, TokenMinter};
use crate::store::Store;

/// Shared application state.
///
/// Wrapped in Arc internally so Clone is cheap.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Persistence for clients, authorizations, and grants.
    store: Arc<dyn Store>,

    /// Server configuration, immutable after startup.
    config: Config,

    /// External token factory.
    minter: Arc<dyn TokenMinter>,

    /// External refresh-token verifier.
    refresh_verifier: Arc<dyn RefreshTokenVerifier>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Store>,
        config: Config,
        minter: Arc<dyn TokenMinter>,
        refresh_verifier: Arc<dyn RefreshTokenVerifier>,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                store,
                config,
                minter,
                refresh_verifier,
            }),
        }
    }

    pub fn store(&self) -> &dyn Store {
        self.inner.store.as_ref()
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn minter(&self) -> &dyn TokenMinter {
        self.inner.minter.as_ref()
    }

    pub fn refresh_verifier(&self) -> &dyn RefreshTokenVerifier {
        self.inner.refresh_verifier.as_ref()
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", self.config())
            .finish()
    }
}
