//! Route definitions and router setup
//!
//! Configures all API routes and middleware.

mod data;
mod operation;

use crate::config::Settings;
use crate::request_log::log_requests;
use crate::state::SharedState;
use axum::{
    http::{header, Method},
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    request_id::MakeRequestUuid,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
    ServiceBuilderExt,
};
use tracing::Level;

/// Create the application router with all routes and middleware
pub fn create_router(state: SharedState, settings: &Settings) -> Router {
    // Build CORS layer
    let cors = build_cors_layer(settings);

    // Build tracing/logging layer
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    // Build middleware stack
    let middleware = ServiceBuilder::new()
        .set_x_request_id(MakeRequestUuid)
        .layer(trace_layer)
        .layer(CompressionLayer::new())
        .layer(cors)
        .propagate_x_request_id();

    Router::new()
        .route("/health", get(health_check))

        // Table data routes
        .route("/data", get(data::list_tables))
        .route("/data/import", post(data::import_all))
        .route("/data/{table}/read", get(data::read_table))
        .route("/data/{table}/create", get(data::create_form).post(data::create_record))
        .route("/data/{table}/{pk}/update", get(data::update_form).post(data::update_record))
        .route("/data/{table}/{pk}/delete", post(data::delete_record))
        .route("/data/{table}/export", get(data::export_table))
        .route("/data/{table}/import", post(data::import_table))
        .route("/data/{table}/table_delete", post(data::clear_table))

        // Routine routes
        .route("/operation", get(operation::list_routines))
        .route("/operation/execute_sql", post(operation::execute_sql))
        .route("/operation/execute_form/{kind}/{name}", post(operation::execute_without_form))
        .route(
            "/operation/execute/{kind}/{name}/{params}",
            get(operation::routine_form).post(operation::execute_with_form),
        )

        .layer(from_fn(log_requests))
        .layer(middleware)
        .with_state(state)
}

/// Build CORS layer from settings
fn build_cors_layer(settings: &Settings) -> CorsLayer {
    let origins: Vec<_> = settings
        .cors
        .allowed_origins
        .iter()
        .filter_map(|s| s.parse().ok())
        .collect();

    let cors = if origins.is_empty() {
        CorsLayer::new().allow_origin(Any)
    } else {
        CorsLayer::new().allow_origin(origins)
    };
    cors.allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .max_age(Duration::from_secs(3600))
}

/// Health check endpoint
async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "success": true,
        "message": "Server is running fine.",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}
