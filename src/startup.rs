//! Application startup and server initialization.
//!
//! Builds the login methods, session authority, access gate and client
//! workspaces from the configuration, then serves the router.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::auth::Auth;
use crate::client::remote_http_client;
use crate::config::ConfigV1;
use crate::gate::Gate;
use crate::metrics::Metrics;
use crate::providers::{create_auth_providers, provider_http_client};
use crate::routes;
use crate::session::SessionAuthority;
use crate::state::AppState;
use crate::utils::clock::SystemClock;
use crate::workspace::Workspaces;

/// Wires every component from `config`. Fails on configuration that can
/// only be detected once it is used (bad provider or gate settings).
pub fn build_state(config: Arc<ConfigV1>) -> Result<AppState, Box<dyn std::error::Error>> {
    if config.session.secret.trim().is_empty() {
        return Err("session.secret must not be empty".into());
    }
    if config.session.max_age_in_secs <= 0 {
        return Err("session.max_age_in_secs must be positive".into());
    }
    let metrics = Metrics::new();
    let timeout = Duration::from_millis(config.remote.timeout_in_ms);

    let providers = create_auth_providers(
        &config.credentials,
        &config.providers,
        provider_http_client(timeout)?,
    )?;
    let authority = Arc::new(SessionAuthority::new(&config.session));
    let auth = Arc::new(Auth::new(providers, authority, timeout, metrics.clone()));
    let gate = Arc::new(Gate::new(&config.gate)?);
    let workspaces = Arc::new(Workspaces::new(
        remote_http_client(&config.remote)?,
        &config.remote,
        &config.cache,
        Arc::new(SystemClock),
        metrics.clone(),
    ));

    Ok(AppState {
        config,
        auth,
        gate,
        workspaces,
        metrics,
    })
}

/// Periodically purges cache entries nobody has looked at for a while.
fn spawn_sweeper(workspaces: Arc<Workspaces>, every: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            let evicted = workspaces.sweep();
            if evicted > 0 {
                debug!("Evicted {} expired cache entries", evicted);
            }
        }
    });
}

/// Initializes and runs the application server.
///
/// # Errors
///
/// Returns an error if the components cannot be built, the bind address is
/// unavailable, or the server fails while running.
pub async fn run(config: Arc<ConfigV1>) -> Result<(), Box<dyn std::error::Error>> {
    let state = build_state(config.clone()).inspect_err(|e| {
        error!("Invalid configuration: {}", e);
    })?;

    let sweep_every = Duration::from_secs(config.cache.sweep_interval_in_secs.max(1));
    spawn_sweeper(state.workspaces.clone(), sweep_every);

    let app = routes::create_router(state);

    info!("Starting server on {}", config.bind_address);
    let listener = TcpListener::bind(&config.bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;

    Ok(())
}
