//! Unary method handlers: request/response mapping and error-code
//! translation. Business failures are returned as 200s with a nonzero
//! code; the middleware owns transport-level rejections.

use std::sync::Arc;

use axum::extract::State;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use super::middleware::AuthUser;
use super::response::{map_service_error, CODE_SUCCESS};
use crate::service::{ServiceError, UserProfile};
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Deserialize, Serialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserProfile>,
}

/// Request body for every authenticated method. The token field is
/// accepted for gateway compatibility but ignored: the middleware has
/// already resolved the caller from the `authorization` header.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct TokenRequest {
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub code: i32,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProfileResponse {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserProfile>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct UpdateNicknameRequest {
    #[serde(default)]
    pub token: String,
    pub nickname: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct UpdateProfilePictureRequest {
    #[serde(default)]
    pub token: String,
    pub profile_picture: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub kv: bool,
    pub store: bool,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Json<LoginResponse> {
    match state.service.login(&req.username, &req.password).await {
        Ok((token, profile)) => Json(LoginResponse {
            code: CODE_SUCCESS,
            message: "ok".to_string(),
            token: Some(token),
            user: Some(profile),
        }),
        Err(e) => {
            let (code, message) = fail("login", &e);
            Json(LoginResponse {
                code,
                message,
                token: None,
                user: None,
            })
        }
    }
}

pub async fn logout(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Json(_req): Json<TokenRequest>,
) -> Json<StatusResponse> {
    match state.service.logout(&auth.token).await {
        Ok(()) => Json(StatusResponse {
            code: CODE_SUCCESS,
            message: "ok".to_string(),
        }),
        Err(e) => {
            let (code, message) = fail("logout", &e);
            Json(StatusResponse { code, message })
        }
    }
}

pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Json(_req): Json<TokenRequest>,
) -> Json<ProfileResponse> {
    profile_response("get_profile", state.service.get_profile(&auth.token).await)
}

pub async fn update_nickname(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<UpdateNicknameRequest>,
) -> Json<ProfileResponse> {
    profile_response(
        "update_nickname",
        state
            .service
            .update_nickname(auth.user_id, &req.nickname)
            .await,
    )
}

pub async fn update_profile_picture(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<UpdateProfilePictureRequest>,
) -> Json<ProfileResponse> {
    profile_response(
        "update_profile_picture",
        state
            .service
            .update_profile_picture(auth.user_id, &req.profile_picture)
            .await,
    )
}

/// Liveness of the server and its collaborators.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let kv = state.kv.ping().await.is_ok();
    let store = state.store.ping().await.is_ok();
    Json(HealthResponse {
        status: if kv && store { "ok" } else { "degraded" },
        kv,
        store,
    })
}

// ============================================================================
// Helpers
// ============================================================================

fn profile_response(
    method: &str,
    result: Result<UserProfile, ServiceError>,
) -> Json<ProfileResponse> {
    match result {
        Ok(profile) => Json(ProfileResponse {
            code: CODE_SUCCESS,
            message: "ok".to_string(),
            user: Some(profile),
        }),
        Err(e) => {
            let (code, message) = fail(method, &e);
            Json(ProfileResponse {
                code,
                message,
                user: None,
            })
        }
    }
}

fn fail(method: &str, error: &ServiceError) -> (i32, String) {
    let (code, message) = map_service_error(error);
    tracing::warn!(method, code, error = %error, "request failed with business error");
    (code, message)
}
