pub mod api;
pub mod config;
pub mod infrastructure;
pub mod models;
pub mod services;
pub mod utils;

use crate::api::middleware::rate_limit::{RateLimiter, rate_limit, window_phrase};
use crate::config::{AppConfig, MIB, ServerConfig};
use crate::services::drive::RemoteStorage;
use crate::services::temp_storage::TempStorage;
use crate::services::upload_service::UploadService;
use crate::services::upload_tracker::UploadTracker;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, header},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::health::health_check,
        api::handlers::upload::upload_files,
        api::handlers::upload::upload_status,
    ),
    components(
        schemas(
            api::handlers::health::HealthResponse,
            api::handlers::upload::types::UploadResponse,
            api::handlers::upload::types::UploadForm,
            api::handlers::upload::types::ErrorResponse,
            models::RemoteFolder,
            models::RemoteFile,
            services::upload_tracker::UploadStatus,
            services::upload_tracker::UploadState,
        )
    ),
    tags(
        (name = "upload", description = "Image and voice note uploads to Google Drive"),
        (name = "system", description = "Service health")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub upload_service: Arc<UploadService>,
    pub temp_storage: Arc<TempStorage>,
    pub tracker: UploadTracker,
    pub api_limiter: Arc<RateLimiter>,
    pub upload_limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(config: AppConfig, storage: Arc<dyn RemoteStorage>) -> Self {
        let temp_storage = Arc::new(TempStorage::new(config.upload.temp_dir.clone()));
        let upload_service = Arc::new(UploadService::new(
            storage,
            temp_storage.clone(),
            config.drive.parent_folder_id.clone(),
        ));
        let limits = &config.rate_limit;
        let trust_proxy = config.server.trust_proxy;
        let api_limiter = Arc::new(RateLimiter::new(
            limits.api_max_requests,
            limits.api_window_secs,
            format!(
                "Too many requests from this IP, please try again after {}",
                window_phrase(limits.api_window_secs)
            ),
            trust_proxy,
        ));
        let upload_limiter = Arc::new(RateLimiter::new(
            limits.upload_max_requests,
            limits.upload_window_secs,
            format!(
                "Too many uploads from this IP, please try again after {}",
                window_phrase(limits.upload_window_secs)
            ),
            trust_proxy,
        ));

        Self {
            config: Arc::new(config),
            upload_service,
            temp_storage,
            tracker: UploadTracker::new(),
            api_limiter,
            upload_limiter,
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    let config = state.config.clone();

    let api_routes = Router::new()
        .route(
            "/api/health",
            get(api::handlers::health::health_check).fallback(api::handlers::not_found),
        )
        .route(
            "/api/upload",
            post(api::handlers::upload::upload_files)
                .layer(DefaultBodyLimit::max(config.upload.max_body_size()))
                .layer(from_fn_with_state(state.upload_limiter.clone(), rate_limit))
                .fallback(api::handlers::not_found),
        )
        .route(
            "/api/upload/status/:upload_id",
            get(api::handlers::upload::upload_status).fallback(api::handlers::not_found),
        )
        .layer(from_fn_with_state(state.api_limiter.clone(), rate_limit));

    let mut app = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_routes)
        .fallback(api::handlers::not_found)
        .layer(DefaultBodyLimit::max(MIB));

    if !config.server.is_production() {
        app = app.layer(from_fn(
            api::middleware::error_details::expose_error_details,
        ));
    }

    app.layer(from_fn_with_state(
        config.clone(),
        api::middleware::request_logger::request_logger,
    ))
    .layer(cors_layer(&config.server))
    .layer(from_fn(api::middleware::security::security_headers))
    .layer(from_fn(api::middleware::request_id::request_id_middleware))
    .with_state(state)
}

fn cors_layer(server: &ServerConfig) -> CorsLayer {
    let origin = if server.frontend_url == "*" {
        AllowOrigin::any()
    } else {
        match HeaderValue::from_str(&server.frontend_url) {
            Ok(origin) => AllowOrigin::exact(origin),
            Err(_) => {
                tracing::warn!(
                    "Invalid FRONTEND_URL {:?}, allowing any origin",
                    server.frontend_url
                );
                AllowOrigin::any()
            }
        }
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}
