use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;

use subvend_core::entities::purchase_ledger::PurchaseLedgerEntry;
use subvend_core::store::Store;
use subvend_sdk::objects::{
    AccountId, BalanceView, HistoryPage, PurchaseHistoryEntry, Tier,
};

use super::UserApiError;
use crate::api::extractors::ServiceAuth;
use crate::state::AppState;

/// History page size, matching the chat frontend's page layout.
const HISTORY_PER_PAGE: u32 = 5;

/// `GET /accounts/{account_id}/balance` - point-in-time balance.
pub(super) async fn get_balance(
    state: State<AppState>,
    _auth: ServiceAuth,
    Path(account_id): Path<i64>,
) -> Result<impl IntoResponse, UserApiError> {
    let account_id = AccountId(account_id);
    let balance = state.store.balance(account_id).await?;
    Ok(Json(BalanceView {
        account_id,
        balance,
    }))
}

#[derive(Debug, Deserialize)]
pub(super) struct HistoryQuery {
    page: Option<u32>,
}

/// `GET /accounts/{account_id}/history?page=N` - purchase history,
/// paginated, newest first.
pub(super) async fn get_history(
    state: State<AppState>,
    _auth: ServiceAuth,
    Path(account_id): Path<i64>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, UserApiError> {
    let page = query.page.unwrap_or(1).max(1);
    let entries = state
        .store
        .purchase_history(AccountId(account_id), page, HISTORY_PER_PAGE)
        .await?;

    Ok(Json(HistoryPage {
        page,
        entries: entries.iter().filter_map(to_response).collect(),
    }))
}

/// Convert a ledger row (DB model) into a history entry (API model).
///
/// Rows with an unknown tier encoding are skipped rather than failing the
/// whole page.
fn to_response(entry: &PurchaseLedgerEntry) -> Option<PurchaseHistoryEntry> {
    let months = u8::try_from(entry.tier_months).ok()?;
    let tier = Tier::try_from(months).ok()?;
    Some(PurchaseHistoryEntry {
        entry_id: entry.entry_id.clone(),
        subject: entry.subject.clone(),
        tier,
        outcome: entry.outcome.into(),
        amount: entry.amount,
        created_at: entry.created_at,
    })
}
