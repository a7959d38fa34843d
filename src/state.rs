//! Shared application state for the side-table server.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor. It
//! holds only the side-table store; every request is a single load or save,
//! so there is no in-memory cache to keep coherent.

use std::sync::Arc;

use crate::services::persistence::SideTableStore;

/// Clone is required by Axum; the store is Arc-wrapped.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn SideTableStore>,
}

impl AppState {
    #[must_use]
    pub fn new(store: Arc<dyn SideTableStore>) -> Self {
        Self { store }
    }
}
