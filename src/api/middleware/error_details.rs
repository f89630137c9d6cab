use crate::api::error::{ErrorReport, internal_body};
use axum::{
    body::Body,
    extract::Request,
    http::header,
    middleware::Next,
    response::Response,
};
use serde_json::Value;

/// Rewrites 500 bodies to carry the recorded failure detail.
///
/// Only mounted outside production.
pub async fn expose_error_details(req: Request, next: Next) -> Response {
    let response = next.run(req).await;
    let Some(ErrorReport(detail)) = response.extensions().get::<ErrorReport>().cloned() else {
        return response;
    };

    let (mut parts, _) = response.into_parts();
    parts.headers.remove(header::CONTENT_LENGTH);
    let body = internal_body(Value::String(detail)).to_string();
    Response::from_parts(parts, Body::from(body))
}
