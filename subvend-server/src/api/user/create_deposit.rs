use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};

use subvend_sdk::objects::CreateDepositRequest;

use super::UserApiError;
use crate::api::extractors::ServiceAuth;
use crate::state::AppState;

/// `POST /deposits` - create a deposit order.
///
/// Returns the payment instructions: treasury address, the disambiguated
/// unique amount the user must transfer exactly, and the expiry window.
pub(super) async fn create_deposit(
    state: State<AppState>,
    _auth: ServiceAuth,
    Json(body): Json<CreateDepositRequest>,
) -> Result<impl IntoResponse, UserApiError> {
    let instructions = state
        .matcher
        .create_order(body.account_id, &body.username, body.amount)
        .await
        .map_err(UserApiError::Deposit)?;

    Ok((StatusCode::CREATED, Json(instructions)))
}
