use std::sync::Arc;

use crate::state::store::Store;

/// Shared state handed to every route.
///
/// Holds only a store handle; all mutable data lives in the database so
/// separate worker processes see the same view.
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub service_name: Arc<str>,
}

impl AppState {
    pub fn new(store: Store, service_name: impl Into<Arc<str>>) -> Self {
        Self {
            store,
            service_name: service_name.into(),
        }
    }
}
