//! HTTP backend: `GET /token` and `GET /places`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use crate::bootstrap::{Bootstrapper, TokenResponse};
use crate::config::AppConfig;
use crate::geo::client_ip;
use crate::places::{GENERIC_FAILURE, PlacesClient, PlacesLookup, PlacesResponse};
use crate::{Error, Result};

pub use crate::error::ErrorBody;

const TOKEN_FAILURE: &str = "Error generating token";

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ErrorBody { error: message.into() })).into_response()
}

#[derive(Clone)]
pub struct AppState {
    pub bootstrapper: Arc<Bootstrapper>,
    pub places: Arc<dyn PlacesLookup>,
}

impl AppState {
    /// # Errors
    /// Returns an error if one of the upstream clients cannot be built.
    #[allow(clippy::result_large_err)]
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let places: Arc<dyn PlacesLookup> = Arc::new(PlacesClient::new(config.places.clone())?);
        let bootstrapper = Bootstrapper::from_config(config)?.with_places(Arc::clone(&places));
        Ok(Self { bootstrapper: Arc::new(bootstrapper), places })
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/token", get(token))
        .route("/places", get(places))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `HOST:PORT` and serve until the process is interrupted.
///
/// # Errors
/// Returns an error if the listener cannot be bound or the server fails.
pub async fn serve(config: &AppConfig) -> Result<()> {
    let app = router(AppState::from_config(config)?);
    let listener = tokio::net::TcpListener::bind(config.address()).await?;
    tracing::info!(address = %listener.local_addr()?, "backend listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

async fn token(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    let ip = client_ip(&headers, Some(peer));
    match state.bootstrapper.bootstrap(ip).await {
        Ok(outcome) => Json(TokenResponse::from(outcome)).into_response(),
        Err(err) => {
            tracing::error!("token bootstrap failed: {err}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, TOKEN_FAILURE)
        }
    }
}

#[derive(Debug, Deserialize)]
struct PlacesParams {
    query: Option<String>,
    location: Option<String>,
}

async fn places(State(state): State<AppState>, Query(params): Query<PlacesParams>) -> Response {
    let present = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
    let (Some(query), Some(location)) = (present(params.query), present(params.location)) else {
        return error_response(StatusCode::BAD_REQUEST, "Missing query or location");
    };

    match state.places.search(&query, &location).await {
        Ok(places) => Json(PlacesResponse { query, places }).into_response(),
        Err(err) => {
            tracing::warn!(%query, "places lookup failed: {err}");
            let message = match err {
                Error::Upstream { message, .. } | Error::Validation(message) => message,
                _ => GENERIC_FAILURE.to_string(),
            };
            error_response(StatusCode::INTERNAL_SERVER_ERROR, message)
        }
    }
}
