use axum::{Json, extract::State, response::IntoResponse};

use subvend_sdk::objects::UpdatePricesRequest;

use super::AdminApiError;
use crate::api::extractors::AdminAuth;
use crate::state::AppState;

/// `PUT /prices` - replace the tier prices.
///
/// The new shop configuration is persisted to the config file first, then
/// swapped into the runtime store as a whole version; in-flight readers
/// keep the old version until their read guard drops.
pub(super) async fn update_prices(
    state: State<AppState>,
    _auth: AdminAuth,
    Json(body): Json<UpdatePricesRequest>,
) -> Result<impl IntoResponse, AdminApiError> {
    body.prices
        .validate()
        .map_err(|e| AdminApiError::Validation(e.to_string()))?;

    let mut shop = state.shop.read().await.clone();
    shop.prices = body.prices;

    state
        .config_loader
        .update_shop(&shop)
        .map_err(AdminApiError::Config)?;
    state.shop.update(shop.clone()).await;

    tracing::info!("Tier prices updated");
    Ok(Json(shop.prices))
}
