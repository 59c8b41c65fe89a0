//! HTTP request handlers
//!
//! Every failure is returned as `{"error": {"kind": ..., "message": ...}}`.
//! A code that does not redeem is a normal `200` response with
//! `"valid": false`.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use pairlink_auth::{VerifyError, VerifyRequest, VerifyResponse};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::state::AppState;

/// Create the main application router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Pairing API
        .route("/api/pair/verify", post(pair_verify_handler))
        // Companion session
        .route("/api/session", get(session_handler))
        // Server info
        .route("/api/info", get(server_info_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ============================================================================
// Errors
// ============================================================================

/// A typed API failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub kind: &'static str,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: ErrorDetail<'a>,
}

#[derive(Serialize)]
struct ErrorDetail<'a> {
    kind: &'a str,
    message: &'a str,
}

impl ApiError {
    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            kind: "unauthenticated",
            message: message.into(),
        }
    }
}

impl From<VerifyError> for ApiError {
    fn from(err: VerifyError) -> Self {
        let status = match err {
            VerifyError::InvalidArgument => StatusCode::BAD_REQUEST,
            VerifyError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                kind: self.kind,
                message: &self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

// ============================================================================
// Pairing API Handlers
// ============================================================================

/// Redeem a pairing code for a companion token
async fn pair_verify_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<VerifyRequest>, JsonRejection>,
) -> Result<Json<VerifyResponse>, ApiError> {
    let Json(request) = body.map_err(|rejection| {
        debug!("Rejected verify body: {}", rejection);
        ApiError::from(VerifyError::InvalidArgument)
    })?;

    let outcome = state.verifier.verify(&request.code).await?;
    Ok(Json(VerifyResponse::from(outcome)))
}

// ============================================================================
// Session
// ============================================================================

/// Identity behind a valid companion token
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Check the bearer token of a paired companion
async fn session_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<SessionResponse>, ApiError> {
    let token = bearer_token(&headers)
        .ok_or_else(|| ApiError::unauthenticated("Missing bearer token"))?;

    let claims = state.tokens.validate(token).map_err(|e| {
        debug!("Rejected companion token: {}", e);
        ApiError::unauthenticated("Invalid or expired token")
    })?;

    Ok(Json(SessionResponse {
        user_id: claims.sub.clone(),
        expires_at: claims.expires_at(),
    }))
}

/// Extract the token from an `Authorization: Bearer <token>` header
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() {
        Some(token.trim())
    } else {
        None
    }
}

// ============================================================================
// Server Info
// ============================================================================

/// Server information response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    /// Server version
    pub version: String,
    /// Seconds a new pairing code stays valid
    pub code_ttl: u64,
    /// Seconds an issued token stays valid
    pub token_ttl: u64,
}

/// Get server information
async fn server_info_handler(State(state): State<Arc<AppState>>) -> Json<ServerInfo> {
    Json(ServerInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        code_ttl: state.config.code_ttl_secs,
        token_ttl: state.config.token_ttl_secs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use chrono::Duration;
    use pairlink_auth::{
        CodeRecord, CodeStorage, CodeStore, PairingCode, PairingVerifier, ProfileStorage,
        SignedTokenIssuer, UserId, UserProfile,
    };
    use pairlink_core::Config;
    use serde_json::Value;
    use tower::ServiceExt;

    struct TestApp {
        router: Router,
        codes: Arc<CodeStorage>,
        tokens: Arc<SignedTokenIssuer>,
    }

    async fn test_app() -> TestApp {
        let config = Config::new().with_token_secret("0123456789abcdef0123456789abcdef");
        let codes = Arc::new(CodeStorage::in_memory());
        let profiles = Arc::new(ProfileStorage::in_memory());
        profiles
            .save_profile(UserProfile::new(UserId::new("u1"), Some("Ada".to_string())))
            .await
            .unwrap();
        let tokens = Arc::new(
            SignedTokenIssuer::new(
                config.token_secret.as_bytes().to_vec(),
                config.token_issuer.clone(),
                config.token_audience.clone(),
                config.token_ttl(),
            )
            .unwrap(),
        );
        let verifier = Arc::new(PairingVerifier::new(
            codes.clone(),
            profiles,
            tokens.clone(),
        ));
        let state = Arc::new(AppState::new(config, verifier, tokens.clone()));
        TestApp {
            router: create_router(state),
            codes,
            tokens,
        }
    }

    async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn verify_request(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/pair/verify")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_verify_success_then_reuse() {
        let app = test_app().await;
        app.codes
            .insert(CodeRecord::new(
                PairingCode::parse("482913").unwrap(),
                UserId::new("u1"),
                Utc::now() + Duration::seconds(300),
            ))
            .await
            .unwrap();

        let (status, body) = send(&app.router, verify_request(r#"{"code":"482913"}"#)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["valid"], true);
        assert_eq!(body["userId"], "u1");
        assert_eq!(body["displayName"], "Ada");
        let token = body["token"].as_str().unwrap();
        assert!(app.tokens.validate(token).is_ok());

        let (status, body) = send(&app.router, verify_request(r#"{"code":"482913"}"#)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["valid"], false);
        assert_eq!(body["message"], "Invalid or expired code");
        assert!(body.get("token").is_none());
    }

    #[tokio::test]
    async fn test_verify_malformed_code() {
        let app = test_app().await;
        for body in [r#"{"code":"12a45"}"#, r#"{"code":"1234"}"#, r#"{"code":""}"#, "{}"] {
            let (status, json) = send(&app.router, verify_request(body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);
            assert_eq!(json["error"]["kind"], "invalid-argument");
        }
    }

    #[tokio::test]
    async fn test_verify_non_json_body() {
        let app = test_app().await;
        let request = Request::builder()
            .method("POST")
            .uri("/api/pair/verify")
            .body(Body::from("code=482913"))
            .unwrap();
        let (status, json) = send(&app.router, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["kind"], "invalid-argument");
    }

    #[tokio::test]
    async fn test_session_requires_valid_token() {
        let app = test_app().await;

        let missing = Request::builder()
            .uri("/api/session")
            .body(Body::empty())
            .unwrap();
        let (status, json) = send(&app.router, missing).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["error"]["kind"], "unauthenticated");

        let forged = Request::builder()
            .uri("/api/session")
            .header(header::AUTHORIZATION, "Bearer a.b.c")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&app.router, forged).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let issued = app.tokens.sign(&UserId::new("u1"), Utc::now()).unwrap();
        let valid = Request::builder()
            .uri("/api/session")
            .header(header::AUTHORIZATION, format!("Bearer {}", issued.token))
            .body(Body::empty())
            .unwrap();
        let (status, json) = send(&app.router, valid).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["userId"], "u1");
    }

    #[tokio::test]
    async fn test_server_info() {
        let app = test_app().await;
        let request = Request::builder()
            .uri("/api/info")
            .body(Body::empty())
            .unwrap();
        let (status, json) = send(&app.router, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["codeTtl"], 300);
        assert_eq!(json["tokenTtl"], 3600);
    }

    #[test]
    fn test_bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, "Bearer abc".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("abc"));

        headers.insert(header::AUTHORIZATION, "bearer abc".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("abc"));

        headers.insert(header::AUTHORIZATION, "Basic abc".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, "Bearer ".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn test_internal_error_hides_details() {
        let err = ApiError::from(VerifyError::Internal);
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.kind, "internal");
        assert!(err.message.contains("try again"));
    }
}
