use axum::{Json, extract::State, response::IntoResponse};

use subvend_core::store::Store;
use subvend_sdk::objects::{AdjustBalanceRequest, BalanceView};

use super::AdminApiError;
use crate::api::extractors::AdminAuth;
use crate::state::AppState;

/// `POST /balance` - apply a signed delta to an account's balance.
///
/// Goes through the same row-locked ledger path as every other mutation,
/// so an admin debit can no more push a balance negative than a purchase
/// can.
pub(super) async fn adjust_balance(
    state: State<AppState>,
    _auth: AdminAuth,
    Json(body): Json<AdjustBalanceRequest>,
) -> Result<impl IntoResponse, AdminApiError> {
    state
        .store
        .touch_account(body.account_id, &format!("User{}", body.account_id))
        .await?;
    let balance = state
        .store
        .adjust_balance(body.account_id, body.delta)
        .await?;

    tracing::info!(
        account = %body.account_id,
        delta = %body.delta,
        %balance,
        "Admin balance adjustment applied"
    );

    Ok(Json(BalanceView {
        account_id: body.account_id,
        balance,
    }))
}
