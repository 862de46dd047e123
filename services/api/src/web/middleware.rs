//! services/api/src/web/middleware.rs
//!
//! Binds every request to the workspace of the browser instance that sent it.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

use crate::error::ApiError;
use crate::web::state::AppState;

const COOKIE_MAX_AGE_SECS: i64 = 30 * 24 * 60 * 60;

/// The workspace id carried in the `session` cookie, if it is well formed.
pub fn session_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())?
        .split(';')
        .find_map(|c| c.trim().strip_prefix("session="))
        .and_then(|id| Uuid::parse_str(id).ok())
        .map(|id| id.to_string())
}

/// Middleware that resolves the session cookie to a workspace.
///
/// The workspace is inserted into request extensions for handlers to use. A request
/// without a valid cookie gets a fresh workspace; the cookie is only set when that
/// workspace ends the request with someone signed in.
pub async fn attach_workspace(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let (id, fresh) = match session_id(req.headers()) {
        Some(id) => (id, false),
        None => (Uuid::new_v4().to_string(), true),
    };

    let workspace = state.workspace(&id).await.map_err(|e| {
        error!(workspace = %id, "Failed to open workspace: {}", e);
        ApiError::from(e)
    })?;
    req.extensions_mut().insert(workspace.clone());

    let mut response = next.run(req).await;
    let kept = state.settle(&workspace).await;
    if fresh && kept {
        let cookie = format!(
            "session={}; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age={}",
            id, COOKIE_MAX_AGE_SECS
        );
        let value = HeaderValue::from_str(&cookie)
            .map_err(|e| ApiError::Internal(format!("invalid cookie header: {}", e)))?;
        response.headers_mut().append(header::SET_COOKIE, value);
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_session_among_other_cookies() {
        let id = Uuid::new_v4();
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_str(&format!("theme=dark; session={}; lang=bn", id)).unwrap(),
        );
        assert_eq!(session_id(&headers), Some(id.to_string()));
    }

    #[test]
    fn rejects_malformed_session_ids() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("session=../../etc"));
        assert_eq!(session_id(&headers), None);
        assert_eq!(session_id(&HeaderMap::new()), None);
    }
}
