//! Shared Application State

use crate::config::Config;
use readaloud_core::Session;
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
/// Every handler shares the one multiplexed synthesis session.
#[derive(Clone)]
pub struct AppState {
    pub session: Session,
    pub config: Arc<Config>,
}
