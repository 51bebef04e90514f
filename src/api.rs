//! HTTP API for the engines

mod handlers;
mod types;

pub use handlers::create_router;

use crate::engine::Catalog;
use crate::gateway::CompletionGateway;
use crate::session::{Session, SessionRunner};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

/// Live sessions. Each one sits behind its own lock so that a turn in
/// flight excludes any other operation on the same session.
pub type SessionStore = Arc<RwLock<HashMap<Uuid, Arc<Mutex<Session>>>>>;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<Catalog>,
    /// Absent when no provider credential is configured
    pub runner: Option<SessionRunner>,
    pub sessions: SessionStore,
}

impl AppState {
    pub fn new(catalog: Catalog, gateway: Option<CompletionGateway>) -> Self {
        Self {
            catalog: Arc::new(catalog),
            runner: gateway.map(SessionRunner::new),
            sessions: SessionStore::default(),
        }
    }
}
