use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument};

use super::dto::ProfileResponse;
use super::repo::Profile;
use crate::auth::services::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

pub fn read_routes() -> Router<AppState> {
    Router::new().route("/profile", get(get_profile))
}

pub fn write_routes() -> Router<AppState> {
    Router::new().route("/profile/upgrade", post(upgrade))
}

#[instrument(skip(state))]
pub async fn get_profile(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<ProfileResponse>, ApiError> {
    let profile = Profile::find(&state.db, user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;
    Ok(Json(to_response(profile, state.config.trial_limit)))
}

#[instrument(skip(state))]
pub async fn upgrade(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<ProfileResponse>, ApiError> {
    let profile = Profile::upgrade(&state.db, user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;
    info!(user_id = %user_id, "profile upgraded to premium");
    Ok(Json(to_response(profile, state.config.trial_limit)))
}

fn to_response(profile: Profile, trial_limit: i32) -> ProfileResponse {
    let trials_remaining = if profile.is_premium {
        None
    } else {
        Some((trial_limit - profile.trial_count).max(0))
    };
    ProfileResponse {
        id: profile.id,
        email: profile.email,
        trial_count: profile.trial_count,
        trials_remaining,
        is_premium: profile.is_premium,
    }
}

#[cfg(test)]
mod response_tests {
    use super::*;
    use time::OffsetDateTime;
    use uuid::Uuid;

    fn profile(trial_count: i32, is_premium: bool) -> Profile {
        Profile {
            id: Uuid::new_v4(),
            email: "user@example.com".into(),
            trial_count,
            is_premium,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn remaining_clamped_at_zero() {
        let resp = to_response(profile(5, false), 2);
        assert_eq!(resp.trials_remaining, Some(0));
    }

    #[test]
    fn premium_reports_unmetered() {
        let resp = to_response(profile(5, true), 2);
        assert_eq!(resp.trials_remaining, None);
    }
}
