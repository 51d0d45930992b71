//! Registration, login and profile handlers

use axum::{extract::State, http::StatusCode, Json};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use validator::{Validate, ValidationError};

use crate::AppState;
use paperdesk_common::{
    auth::{hash_password, verify_password, AuthContext},
    domain::{NewUser, Profile, Role, User},
    errors::{AppError, Result},
    store::UserStore,
};

fn phone_pattern() -> Option<&'static Regex> {
    static PHONE: OnceLock<Option<Regex>> = OnceLock::new();
    PHONE
        .get_or_init(|| Regex::new(r"^\+?[0-9][0-9 \-]{6,19}$").ok())
        .as_ref()
}

fn validate_phone(phone: &str) -> std::result::Result<(), ValidationError> {
    match phone_pattern() {
        Some(re) if re.is_match(phone.trim()) => Ok(()),
        _ => Err(ValidationError::new("phone")),
    }
}

/// Participant self-registration
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email)]
    pub email: String,

    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,

    #[validate(must_match(other = "password", message = "Passwords do not match"))]
    pub confirm_password: String,

    #[validate(length(min = 1, max = 255))]
    pub full_name: String,

    #[validate(custom(function = "validate_phone"))]
    pub phone: String,

    #[validate(length(min = 1, max = 255))]
    pub organization: String,

    #[validate(length(min = 1))]
    pub address: String,

    #[validate(length(min = 1, max = 20))]
    pub postcode: String,

    #[validate(length(min = 1, max = 100))]
    pub country: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Issued bearer token together with the account it belongs to
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub user: User,
}

fn token_response(state: &AppState, user: User) -> Result<TokenResponse> {
    let access_token = state.jwt.generate_token(user.id, user.role)?;
    Ok(TokenResponse {
        access_token,
        token_type: "Bearer".to_string(),
        expires_in: state.jwt.expiration_secs(),
        user,
    })
}

/// Create a participant account and sign it in
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<TokenResponse>)> {
    request.validate()?;

    let user = state
        .store
        .insert_user(NewUser {
            email: request.email.trim().to_lowercase(),
            display_name: request.full_name.trim().to_string(),
            role: Role::Participant,
            password_hash: hash_password(&request.password)?,
            profile: Profile {
                phone: request.phone.trim().to_string(),
                organization: request.organization.trim().to_string(),
                address: request.address.trim().to_string(),
                postcode: request.postcode.trim().to_string(),
                country: request.country.trim().to_string(),
            },
        })
        .await?;

    tracing::info!(user_id = user.id, "Participant registered");

    Ok((StatusCode::CREATED, Json(token_response(&state, user)?)))
}

/// Exchange email and password for a bearer token
pub async fn login(State(state): State<AppState>, Json(request): Json<LoginRequest>) -> Result<Json<TokenResponse>> {
    let user = state
        .store
        .find_user_by_email(request.email.trim())
        .await?
        .filter(|u| verify_password(&request.password, &u.password_hash))
        .ok_or(AppError::InvalidCredentials)?;

    tracing::info!(user_id = user.id, role = %user.role, "User signed in");

    Ok(Json(token_response(&state, user)?))
}

/// Current account
pub async fn me(State(state): State<AppState>, auth: AuthContext) -> Result<Json<User>> {
    let user = state
        .store
        .find_user(auth.user_id)
        .await?
        .ok_or(AppError::UserNotFound { id: auth.user_id })?;

    Ok(Json(user))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> RegisterRequest {
        RegisterRequest {
            email: "ada@example.com".to_string(),
            password: "analytical".to_string(),
            confirm_password: "analytical".to_string(),
            full_name: "Ada Lovelace".to_string(),
            phone: "+60123456789".to_string(),
            organization: "University of Malaya".to_string(),
            address: "Jalan Universiti".to_string(),
            postcode: "50603".to_string(),
            country: "Malaysia".to_string(),
        }
    }

    #[test]
    fn test_register_validation() {
        assert!(request().validate().is_ok());

        let mismatch = RegisterRequest {
            confirm_password: "different".to_string(),
            ..request()
        };
        assert!(mismatch.validate().is_err());

        let bad_phone = RegisterRequest {
            phone: "call me".to_string(),
            ..request()
        };
        assert!(bad_phone.validate().is_err());

        let bad_email = RegisterRequest {
            email: "not-an-email".to_string(),
            ..request()
        };
        assert!(bad_email.validate().is_err());
    }
}
