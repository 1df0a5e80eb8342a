use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::{middleware, Router};
use dit_protocol::endpoints;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::auth::{provider_for, require_auth, AuthProvider};
use crate::config::ServerConfig;
use crate::handler;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub auth: Arc<dyn AuthProvider>,
}

impl AppState {
    /// State whose auth provider follows `config.auth_token`.
    pub fn new(config: ServerConfig) -> Self {
        let auth = provider_for(config.auth_token.as_deref());
        Self::with_auth(config, auth)
    }

    pub fn with_auth(config: ServerConfig, auth: Arc<dyn AuthProvider>) -> Self {
        Self {
            config: Arc::new(config),
            auth,
        }
    }
}

/// Build the axum router with all deploy endpoints.
pub fn build_router(state: AppState) -> Router {
    let limit = state.config.max_upload_size;
    let deploy = post(handler::deploy_handler).route_layer(middleware::from_fn_with_state(
        state.auth.clone(),
        require_auth,
    ));

    Router::new()
        .route(endpoints::HEALTH, get(handler::health_handler))
        .route(endpoints::DEPLOY, deploy)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
