use std::sync::Arc;

use crate::hireflix::HireflixClient;
use crate::store::EvaluationStore;

/// Hireflix client plus the position new candidates are invited into.
#[derive(Clone)]
pub struct Invites {
    pub client: Arc<HireflixClient>,
    pub position_id: String,
}

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn EvaluationStore>,
    /// Absent when the Hireflix key or position is not configured; the invite
    /// endpoint then answers with a configuration error page.
    pub invites: Option<Invites>,
}
