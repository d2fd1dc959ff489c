//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor and
//! handed to the liveness monitor. It is cheap to clone: the registry is an
//! `Arc` internally, and the store and authenticator are trait objects so
//! tests can swap in in-memory doubles.

use std::sync::Arc;

use crate::config::RealtimeConfig;
use crate::registry::ConnectionRegistry;
use crate::services::auth::Authenticator;
use crate::store::Store;

#[derive(Clone)]
pub struct AppState {
    pub registry: ConnectionRegistry,
    pub store: Arc<dyn Store>,
    pub auth: Arc<dyn Authenticator>,
    pub config: RealtimeConfig,
}

impl AppState {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, auth: Arc<dyn Authenticator>, config: RealtimeConfig) -> Self {
        Self { registry: ConnectionRegistry::new(), store, auth, config }
    }
}

#[cfg(test)]
#[path = "state_helpers_test.rs"]
pub mod test_helpers;
