//! Shared application state for all routes.

use crate::orchestrator::RestOps;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub ops: Arc<dyn RestOps>,
}
