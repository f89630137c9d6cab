use crate::config::AppConfig;
use crate::utils::client_ip::client_ip;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

pub async fn request_logger(
    State(config): State<Arc<AppConfig>>,
    req: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let uri = req.uri().clone();
    let ip = client_ip(&req, config.server.trust_proxy);

    info!("{} {} from {}", method, uri, ip);

    let response = next.run(req).await;

    info!(
        method = %method,
        uri = %uri,
        status = %response.status().as_u16(),
        latency_ms = %start.elapsed().as_millis(),
        "request_completed"
    );

    response
}
