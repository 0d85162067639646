//! Periodic cleanup of expired grants.
//!
//! Expired grants are already invisible to lookups; the sweep only reclaims
//! rows. It is idempotent, so the host may run it on any schedule, on any
//! number of nodes.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::store::Store;

/// Run the expired-grant sweep forever at `interval`. Spawn on the host's
/// scheduler:
///
/// ```ignore
/// tokio::spawn(sweep::run_expired_grant_sweeper(store, Duration::from_secs(300)));
/// ```
pub async fn run_expired_grant_sweeper(store: Arc<dyn Store>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    // The first tick fires immediately; skip it so startup stays quiet.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        match store.delete_expired_grants().await {
            Ok(0) => {}
            Ok(deleted) => debug!(deleted, "swept expired grants"),
            Err(e) => warn!(error = %e, "expired-grant sweep failed"),
        }
    }
}
