//! Request log middleware
//!
//! One line per request with method, path, status and remote address. Error
//! responses also carry the detail of the recovered error.

use crate::error::ErrorDetail;
use axum::{
    extract::{ConnectInfo, Request},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;
use tracing::{error, info, warn, Level};

/// Log level for a response status
pub fn severity(status: StatusCode) -> Level {
    if status.is_server_error() {
        Level::ERROR
    } else if status.is_success() {
        Level::INFO
    } else {
        Level::WARN
    }
}

pub async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let remote = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "-".to_string());

    let response = next.run(request).await;

    let status = response.status();
    let detail = response
        .extensions()
        .get::<ErrorDetail>()
        .map(|ErrorDetail(detail)| detail.as_str())
        .unwrap_or("");

    match severity(status) {
        Level::ERROR => error!("{} {} {} {} {}", method, path, status.as_u16(), remote, detail),
        Level::INFO => info!("{} {} {} {}", method, path, status.as_u16(), remote),
        _ => warn!("{} {} {} {} {}", method, path, status.as_u16(), remote, detail),
    }

    response
}
