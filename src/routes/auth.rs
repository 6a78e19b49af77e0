/**
 * Authentication Routes
 * Bearer validation against the BaaS auth service, and the /auth/me profile lookup
 */
use axum::{
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ApiError;
use crate::baas::{models::AuthUser, models::Usuario, BackendError};
use crate::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthIdentity {
    pub id_usuario: Uuid,
    pub email: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthMeResponse {
    pub ok: bool,
    pub auth: AuthIdentity,
    pub usuario: Option<Usuario>,
}

/// Extract the token from `Authorization: Bearer <token>`.
///
/// The scheme is matched case-insensitively and the header must have exactly
/// two space-separated parts.
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let mut parts = value.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(scheme), Some(token), None)
            if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() =>
        {
            Some(token)
        }
        _ => None,
    }
}

/// Resolve the caller from the bearer token, re-validated on every call.
pub async fn require_auth(state: &AppState, headers: &HeaderMap) -> Result<AuthUser, ApiError> {
    let token = extract_bearer_token(headers).ok_or(ApiError::Unauthorized("Missing Bearer token"))?;

    match state.backend.get_user(token).await {
        Ok(user) => Ok(user),
        Err(BackendError::Unauthorized) => Err(ApiError::Unauthorized("Invalid token")),
        Err(e) => {
            tracing::error!(error = %e, "auth service call failed");
            Err(ApiError::Server(format!("Auth middleware failed: {}", e)))
        }
    }
}

/// GET /auth/me
/// Auth identity plus the `usuario` row, which may be absent
pub async fn me(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<AuthMeResponse>, ApiError> {
    let user = require_auth(&state, &headers).await?;
    let usuario = state.backend.find_usuario(user.id).await?;

    Ok(Json(AuthMeResponse {
        ok: true,
        auth: AuthIdentity {
            id_usuario: user.id,
            email: user.email,
        },
        usuario,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baas::fake::{FailAt, FakeBackend};
    use crate::routes::ErrorResponse;
    use axum::body::Body;
    use axum::http::{HeaderValue, Request, StatusCode};
    use axum::routing::get;
    use axum::Router;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn auth_router(backend: Arc<FakeBackend>) -> Router {
        Router::new()
            .route("/auth/me", get(me))
            .with_state(AppState::new(backend))
    }

    async fn get_with_auth(
        app: Router,
        uri: &str,
        authorization: Option<&str>,
    ) -> (StatusCode, axum::body::Bytes) {
        let mut req = Request::get(uri);
        if let Some(value) = authorization {
            req = req.header("authorization", value);
        }
        let res = app.oneshot(req.body(Body::empty()).unwrap()).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, bytes)
    }

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_extract_bearer_token_accepts_any_scheme_case() {
        assert_eq!(extract_bearer_token(&headers_with("Bearer abc")), Some("abc"));
        assert_eq!(extract_bearer_token(&headers_with("bearer abc")), Some("abc"));
    }

    #[test]
    fn test_extract_bearer_token_rejects_malformed_headers() {
        assert_eq!(extract_bearer_token(&HeaderMap::new()), None);
        assert_eq!(extract_bearer_token(&headers_with("Basic abc")), None);
        assert_eq!(extract_bearer_token(&headers_with("Bearer")), None);
        assert_eq!(extract_bearer_token(&headers_with("Bearer a b")), None);
    }

    #[tokio::test]
    async fn test_me_without_token_is_unauthorized() {
        let app = auth_router(Arc::new(FakeBackend::new()));
        let (status, bytes) = get_with_auth(app, "/auth/me", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let body: ErrorResponse = serde_json::from_slice(&bytes).unwrap();
        assert!(!body.ok);
        assert_eq!(body.error, "Missing Bearer token");
    }

    #[tokio::test]
    async fn test_me_with_unknown_token_is_unauthorized() {
        let backend = Arc::new(FakeBackend::seeded("good", Uuid::new_v4()).await);
        let (status, bytes) = get_with_auth(auth_router(backend), "/auth/me", Some("Bearer bad")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let body: ErrorResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.error, "Invalid token");
    }

    #[tokio::test]
    async fn test_me_returns_identity_and_usuario() {
        let user_id = Uuid::new_v4();
        let backend = Arc::new(FakeBackend::seeded("good", user_id).await);
        let (status, bytes) =
            get_with_auth(auth_router(backend), "/auth/me", Some("Bearer good")).await;
        assert_eq!(status, StatusCode::OK);
        let body: AuthMeResponse = serde_json::from_slice(&bytes).unwrap();
        assert!(body.ok);
        assert_eq!(body.auth.id_usuario, user_id);
        assert_eq!(body.usuario.map(|u| u.id_empresa), Some(1));
    }

    #[tokio::test]
    async fn test_me_without_usuario_row_returns_null() {
        let user_id = Uuid::new_v4();
        let backend = Arc::new(FakeBackend::seeded("good", user_id).await);
        backend.state.lock().await.usuarios.clear();
        let (status, bytes) =
            get_with_auth(auth_router(backend), "/auth/me", Some("Bearer good")).await;
        assert_eq!(status, StatusCode::OK);
        let body: AuthMeResponse = serde_json::from_slice(&bytes).unwrap();
        assert!(body.usuario.is_none());
    }

    #[tokio::test]
    async fn test_auth_service_failure_is_server_error() {
        let backend = Arc::new(FakeBackend::seeded("good", Uuid::new_v4()).await);
        backend.fail_at(Some(FailAt::GetUser)).await;
        let (status, _) = get_with_auth(auth_router(backend), "/auth/me", Some("Bearer good")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
