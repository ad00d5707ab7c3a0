use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use super::UserApiError;
use crate::api::extractors::ServiceAuth;
use crate::state::AppState;

/// `DELETE /deposits/{order_token}` - cancel an open deposit order.
///
/// 404 when the order is not open anymore (already matched, canceled, or
/// swept).
pub(super) async fn cancel_deposit(
    state: State<AppState>,
    _auth: ServiceAuth,
    Path(order_token): Path<Uuid>,
) -> Result<impl IntoResponse, UserApiError> {
    let canceled = state
        .matcher
        .cancel_order(order_token)
        .await
        .map_err(UserApiError::Deposit)?;

    if !canceled {
        return Err(UserApiError::NotFound);
    }
    Ok(StatusCode::NO_CONTENT)
}
