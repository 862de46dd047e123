pub mod auth;
pub mod middleware;
pub mod rest;
pub mod state;

use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{ACCEPT, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware as axum_middleware,
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::error::ApiError;
use rest::ApiDoc;
use state::AppState;

/// Several files may arrive in one multipart body.
const FILES_PER_REQUEST: usize = 8;

/// Builds the complete application: API routes behind the workspace middleware,
/// CORS, body limits, and the Swagger UI.
pub fn router(app_state: Arc<AppState>) -> Result<Router, ApiError> {
    let origin = app_state
        .config
        .cors_origin
        .parse::<HeaderValue>()
        .map_err(|e| ApiError::Internal(format!("invalid CORS_ORIGIN: {}", e)))?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, ACCEPT]);
    let body_limit = app_state
        .config
        .max_upload_bytes
        .saturating_mul(FILES_PER_REQUEST);

    let api_router = Router::new()
        .route("/auth/register", post(auth::register_handler))
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/logout", post(auth::logout_handler))
        .route("/auth/session", get(auth::session_handler))
        .route(
            "/uploads/{target}",
            get(rest::list_files_handler).post(rest::upload_handler),
        )
        .route("/uploads/{target}/clipboard", post(rest::paste_handler))
        .route("/uploads/{target}/{index}", delete(rest::remove_file_handler))
        .route("/camera/open", post(rest::camera_open_handler))
        .route("/camera/capture", post(rest::camera_capture_handler))
        .route("/camera/close", post(rest::camera_close_handler))
        .route("/settings", put(rest::settings_handler))
        .route("/generate", post(rest::generate_handler))
        .route("/search", post(rest::search_handler))
        .route("/chat", post(rest::chat_handler))
        .route("/refine", post(rest::refine_handler))
        .route("/result", get(rest::current_result_handler))
        .route("/result/clear", post(rest::clear_result_handler))
        .route(
            "/history",
            get(rest::history_handler).delete(rest::clear_history_handler),
        )
        .route("/history/{id}/select", post(rest::select_history_handler))
        .route("/export", post(rest::export_handler))
        .route("/admin/users", get(rest::list_users_handler))
        .route(
            "/admin/config",
            get(rest::get_config_handler).put(rest::update_config_handler),
        )
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            middleware::attach_workspace,
        ))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    Ok(Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi())))
}
