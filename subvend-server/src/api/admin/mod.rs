//! Admin API handlers.
//!
//! The authorization-gated command interface: balance adjustment, price
//! updates, treasury address updates. Requires the
//! `Subvend-Admin-Authorization` header with the plaintext admin secret,
//! verified against its argon2 hash.
//!
//! # Endpoints
//!
//! - `POST /balance` – apply a signed delta to an account's balance
//! - `PUT  /prices`  – replace tier prices
//! - `PUT  /address` – replace the treasury deposit address

use axum::{
    Router,
    http::StatusCode,
    response::IntoResponse,
    routing::{post, put},
};

use subvend_core::store::StoreError;

use crate::config::ConfigError;
use crate::state::AppState;

mod adjust_balance;
mod update_address;
mod update_prices;

/// Build the Admin API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/balance", post(adjust_balance::adjust_balance))
        .route("/prices", put(update_prices::update_prices))
        .route("/address", put(update_address::update_address))
}

// ---------------------------------------------------------------------------
// Shared error type
// ---------------------------------------------------------------------------

/// Errors that can occur in Admin API handlers.
#[derive(Debug)]
pub(crate) enum AdminApiError {
    Store(StoreError),
    Validation(String),
    Config(ConfigError),
}

impl From<StoreError> for AdminApiError {
    fn from(e: StoreError) -> Self {
        AdminApiError::Store(e)
    }
}

impl IntoResponse for AdminApiError {
    fn into_response(self) -> axum::response::Response {
        match self {
            AdminApiError::Store(StoreError::InsufficientFunds {
                required,
                available,
            }) => (
                StatusCode::CONFLICT,
                format!("adjustment rejected: balance {available}, debit {required}"),
            )
                .into_response(),
            AdminApiError::Store(e) => {
                tracing::error!(error = %e, "Admin API storage error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
            }
            AdminApiError::Validation(message) => {
                (StatusCode::BAD_REQUEST, message).into_response()
            }
            AdminApiError::Config(e) => {
                tracing::error!(error = %e, "Admin API config error");
                (StatusCode::INTERNAL_SERVER_ERROR, "failed to persist configuration")
                    .into_response()
            }
        }
    }
}
