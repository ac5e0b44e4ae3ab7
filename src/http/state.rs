use std::sync::Arc;

use crate::meet::{MeetManager, TurnEngine};
use crate::store::UserDirectory;

/// Shared application state for HTTP handlers. Everything is Arc'd and
/// constructed once at startup; handlers never build collaborators.
#[derive(Clone)]
pub struct AppState {
    pub service_name: String,
    pub manager: Arc<MeetManager>,
    pub engine: Arc<TurnEngine>,
    pub users: Arc<dyn UserDirectory>,
}

impl AppState {
    pub fn new(
        service_name: String,
        manager: Arc<MeetManager>,
        engine: Arc<TurnEngine>,
        users: Arc<dyn UserDirectory>,
    ) -> Self {
        Self {
            service_name,
            manager,
            engine,
            users,
        }
    }
}
