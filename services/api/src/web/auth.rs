//! services/api/src/web/auth.rs
//!
//! Authentication endpoints for registration, login, logout and the current session.

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use study_assistant_core::{PublicUser, Role};
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::ApiError;
use crate::web::state::Workspace;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: String,
    pub joined_at: DateTime<Utc>,
    pub usage_count: u64,
}

impl From<PublicUser> for UserResponse {
    fn from(user: PublicUser) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            role: match user.role {
                Role::Admin => "admin".to_string(),
                Role::User => "user".to_string(),
            },
            joined_at: user.joined_at,
            usage_count: user.usage_count,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct SessionResponse {
    pub user: Option<UserResponse>,
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /auth/register - Create a new account and sign in
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User created successfully", body = UserResponse),
        (status = 400, description = "Missing name, email or password"),
        (status = 409, description = "Email already registered")
    )
)]
pub async fn register_handler(
    Extension(workspace): Extension<Arc<Workspace>>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = workspace
        .assistant
        .register(&req.name, &req.email, &req.password)
        .await?;
    info!(user_id = %user.id, workspace = %workspace.id, "User registered.");
    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

/// POST /auth/login - Login with existing account
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = UserResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login_handler(
    Extension(workspace): Extension<Arc<Workspace>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = workspace.assistant.login(&req.email, &req.password).await?;
    Ok(Json(user.into()))
}

/// POST /auth/logout - End the session and clear this browser's view state
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses((status = 204, description = "Logout successful"))
)]
pub async fn logout_handler(
    Extension(workspace): Extension<Arc<Workspace>>,
) -> Result<StatusCode, ApiError> {
    workspace.assistant.logout().await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /auth/session - The signed-in user, if any
#[utoipa::path(
    get,
    path = "/auth/session",
    responses((status = 200, description = "Current session", body = SessionResponse))
)]
pub async fn session_handler(
    Extension(workspace): Extension<Arc<Workspace>>,
) -> Json<SessionResponse> {
    let user = workspace.assistant.current_user().await.map(UserResponse::from);
    Json(SessionResponse { user })
}
