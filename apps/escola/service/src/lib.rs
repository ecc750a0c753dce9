use std::sync::Arc;
use std::time::SystemTime;

use anyhow::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::middleware::map_response;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

pub mod api_envelope;
pub mod config;
pub mod goal_routes;
pub mod goal_store;

use crate::api_envelope::internal_error;
use crate::config::Config;
use crate::goal_routes::{ROUTE_GOALS, ROUTE_GOALS_BY_ID, ROUTE_GOALS_PROGRESS};
use crate::goal_store::{GoalRepository, GoalStore};

const SERVICE_NAME: &str = "escola-goals-service";

#[derive(Clone)]
pub(crate) struct AppState {
    config: Arc<Config>,
    goals: Arc<dyn GoalRepository>,
    started_at: SystemTime,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
    uptime_seconds: u64,
    persistent_store: bool,
}

pub fn build_router(config: Config) -> Router {
    let goals = Arc::new(GoalStore::from_config(&config));
    build_router_with_repository(config, goals)
}

/// Builds the router over any goal backend; tests use this to inject failing stores.
pub fn build_router_with_repository(config: Config, goals: Arc<dyn GoalRepository>) -> Router {
    let request_timeout = config.request_timeout;
    let state = AppState {
        config: Arc::new(config),
        goals,
        started_at: SystemTime::now(),
    };

    Router::new()
        .route("/healthz", get(health))
        .route(
            ROUTE_GOALS,
            get(goal_routes::list_goals).post(goal_routes::create_goal),
        )
        .route(
            ROUTE_GOALS_BY_ID,
            get(goal_routes::show_goal)
                .put(goal_routes::update_goal)
                .delete(goal_routes::delete_goal),
        )
        .route(
            ROUTE_GOALS_PROGRESS,
            post(goal_routes::update_goal_progress),
        )
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(TraceLayer::new_for_http())
                .layer(map_response(timeout_as_internal_error))
                .layer(TimeoutLayer::new(request_timeout)),
        )
}

pub async fn serve(config: Config) -> Result<()> {
    let listener = TcpListener::bind(config.bind_addr).await?;
    info!(
        service = SERVICE_NAME,
        bind_addr = %config.bind_addr,
        persistent_store = config.goal_store_path.is_some(),
        "goals service listening"
    );
    axum::serve(listener, build_router(config))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!(service = SERVICE_NAME, "goals service stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %error, "unable to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

/// The timeout layer answers with a bare 408; callers get the usual 500 envelope instead.
async fn timeout_as_internal_error(response: Response) -> Response {
    if response.status() != StatusCode::REQUEST_TIMEOUT {
        return response;
    }
    tracing::error!(target: "escola.goals", "request exceeded the configured timeout");
    internal_error().into_response()
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime_seconds = match state.started_at.elapsed() {
        Ok(duration) => duration.as_secs(),
        Err(_) => 0,
    };

    Json(HealthResponse {
        status: "ok",
        service: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds,
        persistent_store: state.config.goal_store_path.is_some(),
    })
}
