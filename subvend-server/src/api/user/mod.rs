//! User API handlers.
//!
//! Called by the chat-bot frontend on behalf of users; every request
//! carries the shared service secret as a bearer token.
//!
//! # Endpoints
//!
//! - `POST   /deposits`                 – create a deposit order
//! - `DELETE /deposits/{order_token}`   – cancel an open deposit order
//! - `POST   /purchases`                – enqueue a purchase intent
//! - `GET    /accounts/{id}/balance`    – point-in-time balance
//! - `GET    /accounts/{id}/history`    – purchase history, newest first

use axum::{
    Router,
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
};

use subvend_core::matcher::DepositError;
use subvend_core::queue::PurchaseError;
use subvend_core::store::StoreError;

use crate::state::AppState;

mod account;
mod cancel_deposit;
mod create_deposit;
mod create_purchase;

/// Build the User API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/deposits", post(create_deposit::create_deposit))
        .route(
            "/deposits/{order_token}",
            delete(cancel_deposit::cancel_deposit),
        )
        .route("/purchases", post(create_purchase::create_purchase))
        .route("/accounts/{account_id}/balance", get(account::get_balance))
        .route("/accounts/{account_id}/history", get(account::get_history))
}

// ---------------------------------------------------------------------------
// Error handling
// ---------------------------------------------------------------------------

/// Errors that can occur in User API handlers.
#[derive(Debug)]
pub(super) enum UserApiError {
    Deposit(DepositError),
    Purchase(PurchaseError),
    Store(StoreError),
    NotFound,
}

impl From<StoreError> for UserApiError {
    fn from(e: StoreError) -> Self {
        UserApiError::Store(e)
    }
}

impl IntoResponse for UserApiError {
    fn into_response(self) -> axum::response::Response {
        match self {
            UserApiError::Deposit(DepositError::InvalidAmount) => {
                (StatusCode::BAD_REQUEST, "deposit amount must be positive").into_response()
            }
            UserApiError::Deposit(DepositError::TooManyPendingOrders) => (
                StatusCode::CONFLICT,
                "too many pending deposit orders; complete or cancel one first",
            )
                .into_response(),
            UserApiError::Deposit(DepositError::AmountAllocation) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "could not allocate a unique deposit amount, try again",
            )
                .into_response(),
            UserApiError::Deposit(e) => {
                tracing::error!(error = %e, "User API deposit error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
            }
            UserApiError::Purchase(PurchaseError::InsufficientFunds {
                required,
                available,
            }) => (
                StatusCode::PAYMENT_REQUIRED,
                format!("insufficient funds: balance {available}, price {required}"),
            )
                .into_response(),
            UserApiError::Purchase(PurchaseError::InvalidSubject) => {
                (StatusCode::BAD_REQUEST, "recipient must not be empty").into_response()
            }
            UserApiError::Purchase(e) => {
                tracing::error!(error = %e, "User API purchase error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
            }
            UserApiError::Store(e) => {
                tracing::error!(error = %e, "User API storage error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
            }
            UserApiError::NotFound => {
                (StatusCode::NOT_FOUND, "resource not found").into_response()
            }
        }
    }
}
