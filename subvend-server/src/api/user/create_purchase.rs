use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};

use subvend_sdk::objects::{CreatePurchaseRequest, EnqueuedTask};

use super::UserApiError;
use crate::api::extractors::ServiceAuth;
use crate::state::AppState;

/// `POST /purchases` - enqueue a purchase intent.
///
/// The nominal-price balance pre-check happens here, synchronously;
/// insufficient funds is reported immediately as 402. The queue resolves
/// the task asynchronously and the outcome reaches the user by
/// notification.
pub(super) async fn create_purchase(
    state: State<AppState>,
    _auth: ServiceAuth,
    Json(body): Json<CreatePurchaseRequest>,
) -> Result<impl IntoResponse, UserApiError> {
    let task_id = state
        .queue
        .enqueue(body.account_id, &body.username, &body.subject, body.tier)
        .await
        .map_err(UserApiError::Purchase)?;

    Ok((StatusCode::ACCEPTED, Json(EnqueuedTask { task_id })))
}
