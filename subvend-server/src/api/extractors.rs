//! Custom Axum extractors for request authentication.
//!
//! Provides:
//! - `ServiceAuth` - verifies the `Authorization: Bearer` secret the chat
//!   frontend presents (constant-time comparison).
//! - `AdminAuth` - verifies the `Subvend-Admin-Authorization` header against
//!   the argon2 hash loaded at startup.

use axum::{
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};

use crate::state::AppState;

const ADMIN_HEADER: &str = "Subvend-Admin-Authorization";

// ---------------------------------------------------------------------------
// ServiceAuth - chat-frontend authentication via shared bearer secret
// ---------------------------------------------------------------------------

pub struct ServiceAuth;

#[derive(Debug)]
pub enum ServiceAuthError {
    MissingHeader,
    InvalidHeader,
    WrongSecret,
}

impl IntoResponse for ServiceAuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ServiceAuthError::MissingHeader => {
                (StatusCode::UNAUTHORIZED, "missing Authorization header")
            }
            ServiceAuthError::InvalidHeader => {
                (StatusCode::BAD_REQUEST, "invalid Authorization header")
            }
            ServiceAuthError::WrongSecret => (StatusCode::UNAUTHORIZED, "invalid service secret"),
        };
        (status, message).into_response()
    }
}

impl FromRequestParts<AppState> for ServiceAuth {
    type Rejection = ServiceAuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .ok_or(ServiceAuthError::MissingHeader)?
            .to_str()
            .map_err(|_| ServiceAuthError::InvalidHeader)?;

        let presented = header
            .strip_prefix("Bearer ")
            .ok_or(ServiceAuthError::InvalidHeader)?;

        ring::constant_time::verify_slices_are_equal(
            presented.as_bytes(),
            state.auth.service_secret.as_bytes(),
        )
        .map_err(|_| ServiceAuthError::WrongSecret)?;

        Ok(ServiceAuth)
    }
}

// ---------------------------------------------------------------------------
// AdminAuth - admin secret verified against its argon2 hash
// ---------------------------------------------------------------------------

pub struct AdminAuth;

#[derive(Debug)]
pub enum AdminAuthError {
    MissingHeader,
    InvalidHeader,
    WrongSecret,
}

impl IntoResponse for AdminAuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AdminAuthError::MissingHeader => (
                StatusCode::UNAUTHORIZED,
                "missing Subvend-Admin-Authorization header",
            ),
            AdminAuthError::InvalidHeader => (
                StatusCode::BAD_REQUEST,
                "invalid Subvend-Admin-Authorization header",
            ),
            AdminAuthError::WrongSecret => (StatusCode::UNAUTHORIZED, "invalid admin secret"),
        };
        (status, message).into_response()
    }
}

impl FromRequestParts<AppState> for AdminAuth {
    type Rejection = AdminAuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        use argon2::{Argon2, PasswordHash, PasswordVerifier};

        let presented = parts
            .headers
            .get(ADMIN_HEADER)
            .ok_or(AdminAuthError::MissingHeader)?
            .to_str()
            .map_err(|_| AdminAuthError::InvalidHeader)?;

        let hash = PasswordHash::new(&state.auth.admin_hash)
            .map_err(|_| AdminAuthError::WrongSecret)?;
        Argon2::default()
            .verify_password(presented.as_bytes(), &hash)
            .map_err(|_| AdminAuthError::WrongSecret)?;

        Ok(AdminAuth)
    }
}
