use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};

use subvend_sdk::config::is_valid_deposit_address;
use subvend_sdk::objects::UpdateAddressRequest;

use super::AdminApiError;
use crate::api::extractors::AdminAuth;
use crate::state::AppState;

/// `PUT /address` - replace the treasury deposit address.
///
/// Open deposit orders keep matching against the old address until they
/// expire; only newly-created orders show the new one.
pub(super) async fn update_address(
    state: State<AppState>,
    _auth: AdminAuth,
    Json(body): Json<UpdateAddressRequest>,
) -> Result<impl IntoResponse, AdminApiError> {
    if !is_valid_deposit_address(&body.payment_address) {
        return Err(AdminApiError::Validation(format!(
            "invalid deposit address: {}",
            body.payment_address
        )));
    }

    let mut shop = state.shop.read().await.clone();
    shop.payment_address = body.payment_address;

    state
        .config_loader
        .update_shop(&shop)
        .map_err(AdminApiError::Config)?;
    state.shop.update(shop).await;

    tracing::info!("Treasury deposit address updated");
    Ok(StatusCode::NO_CONTENT)
}
