use axum::{
    Json, async_trait,
    extract::{FromRequestParts, Path, State},
    http::{StatusCode, header::AUTHORIZATION, request::Parts},
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::auth::{self, LoginOutcome};
use crate::data_models::User;
use crate::error::{AppError, AppResult};

use super::AppState;
use super::models::{
    DeleteProfileResponse, LoginRequest, LoginResponse, NoGravatarResponse, ProfileView,
};

/// The signed-in user, resolved from an `Authorization: Bearer` token.
pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, AppError> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::Unauthorized("No access token was provided".to_string()))?;

        let user_id = state
            .tokens
            .verify(token)
            .map_err(|e| AppError::Unauthorized(e.to_string()))?;

        // a database failure here means "not signed in", not a 500
        match state.users.find_by_id(&user_id).await {
            Ok(Some(user)) => Ok(CurrentUser(user)),
            Ok(None) => Err(AppError::Unauthorized("Unknown user".to_string())),
            Err(e) => {
                tracing::error!("load_user db error: {e:#}");
                Err(AppError::Unauthorized("Could not load user".to_string()))
            }
        }
    }
}

pub async fn login(
    State(state): State<AppState>,
    body: Option<Json<LoginRequest>>,
) -> AppResult<Response> {
    let email = body.map(|Json(b)| b.email).unwrap_or_default();
    let email = email.trim();
    if email.is_empty() {
        return Err(AppError::bad_request("email required"));
    }

    let outcome = auth::login(&state.gravatar, &state.users, &state.shelves, email).await?;
    let response = match outcome {
        LoginOutcome::NoGravatar => (
            StatusCode::NOT_FOUND,
            Json(NoGravatarResponse {
                error: "No Gravatar found for this email. Please create one to continue."
                    .to_string(),
                gravatar_signup_url: state.gravatar.signup_url(),
            }),
        )
            .into_response(),
        LoginOutcome::SignedIn { user, created } => {
            let token = state
                .tokens
                .issue(&user.id)
                .map_err(|e| AppError::Internal(e.into()))?;
            let message = if created {
                "New account created! Signing you in..."
            } else {
                "Welcome back! Signing you in..."
            };
            tracing::info!("user {} signed in (created: {created})", user.id);
            Json(LoginResponse {
                token,
                user: user.into(),
                created,
                message: message.to_string(),
            })
            .into_response()
        }
    };
    Ok(response)
}

pub async fn list_profiles(
    State(state): State<AppState>,
    CurrentUser(_): CurrentUser,
) -> AppResult<Json<Vec<ProfileView>>> {
    let profiles = state
        .users
        .list_all()
        .await?
        .into_iter()
        .map(ProfileView::from)
        .collect::<Vec<_>>();
    tracing::debug!("fetched {} profiles", profiles.len());
    Ok(Json(profiles))
}

pub async fn delete_profile(
    State(state): State<AppState>,
    CurrentUser(current): CurrentUser,
    Path(profile_id): Path<String>,
) -> Response {
    let self_deleted = profile_id == current.id;

    match state.users.delete(&profile_id).await {
        Ok(_) => Json(DeleteProfileResponse {
            success: true,
            self_deleted,
        })
        .into_response(),
        Err(e) => {
            tracing::error!("database error deleting profile {profile_id}: {e:#}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "message": "Database error" })),
            )
                .into_response()
        }
    }
}
