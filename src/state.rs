//! Shared application state.

use std::sync::Arc;

use crate::auth::Auth;
use crate::config::ConfigV1;
use crate::gate::Gate;
use crate::metrics::Metrics;
use crate::workspace::Workspaces;

/// Application state shared across all HTTP handlers and the access gate.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration loaded at startup.
    pub config: Arc<ConfigV1>,
    /// Login methods and the session authority.
    pub auth: Arc<Auth>,
    /// Static route classification.
    pub gate: Arc<Gate>,
    /// Per-caller facade and cache.
    pub workspaces: Arc<Workspaces>,
    pub metrics: Metrics,
}
