//! Postgres-backed [`Store`].
//!
//! The balance column is the only pessimistically-locked resource
//! (`SELECT ... FOR UPDATE`); everything else relies on
//! insert-with-uniqueness or conditional updates with a status predicate.

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use subvend_sdk::objects::{AccountId, Tier};

use crate::entities::PurchaseOutcome;
use crate::entities::account::Account;
use crate::entities::deposit_order::DepositOrder;
use crate::entities::fulfillment_task::FulfillmentTask;
use crate::entities::purchase_ledger::{PurchaseLedgerEntry, new_entry_id};
use crate::entities::settlement_record::SettlementRecord;
use crate::fulfill::Settlement;
use crate::store::{
    ExpiredOrder, MatchedDeposit, NewDepositOrder, SettleOutcome, Store, StoreError,
};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Bootstrap the schema. Every statement is idempotent.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(include_str!("schema.sql"))
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn touch_account(&self, account: AccountId, username: &str) -> Result<(), StoreError> {
        Account::touch(&self.pool, account, username).await?;
        Ok(())
    }

    async fn balance(&self, account: AccountId) -> Result<Decimal, StoreError> {
        Ok(Account::balance(&self.pool, account).await?)
    }

    async fn adjust_balance(
        &self,
        account: AccountId,
        delta: Decimal,
    ) -> Result<Decimal, StoreError> {
        let mut tx = self.pool.begin().await?;
        let new_balance = Account::adjust_balance_tx(&mut tx, account, delta).await?;
        tx.commit().await?;
        Ok(new_balance)
    }

    async fn open_order_count(&self, account: AccountId) -> Result<u32, StoreError> {
        let count = DepositOrder::count_open(&self.pool, account.0).await?;
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn try_insert_deposit_order(&self, order: &NewDepositOrder) -> Result<(), StoreError> {
        DepositOrder::try_insert(&self.pool, order).await
    }

    async fn cancel_deposit_order(&self, order_token: Uuid) -> Result<bool, StoreError> {
        Ok(DepositOrder::cancel(&self.pool, order_token).await?)
    }

    async fn credit_matching_order(
        &self,
        amount: Decimal,
        now: time::OffsetDateTime,
    ) -> Result<Option<MatchedDeposit>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let Some(order) = DepositOrder::lock_open_by_amount_tx(&mut tx, amount).await? else {
            return Ok(None);
        };

        if !DepositOrder::mark_matched_tx(&mut tx, order.order_token, now).await? {
            // Lost the open-status race; the transfer was already credited.
            return Ok(None);
        }

        let new_balance =
            Account::adjust_balance_tx(&mut tx, AccountId(order.account_id), amount).await?;

        tx.commit().await?;

        Ok(Some(MatchedDeposit {
            order_token: order.order_token,
            account_id: AccountId(order.account_id),
            amount,
            new_balance,
        }))
    }

    async fn expired_open_orders(
        &self,
        now: time::OffsetDateTime,
    ) -> Result<Vec<ExpiredOrder>, StoreError> {
        let orders = DepositOrder::expired_open(&self.pool, now).await?;
        Ok(orders
            .into_iter()
            .map(|o| ExpiredOrder {
                order_token: o.order_token,
                account_id: AccountId(o.account_id),
                amount: o.amount,
            })
            .collect())
    }

    async fn delete_deposit_order(&self, order_token: Uuid) -> Result<(), StoreError> {
        DepositOrder::delete(&self.pool, order_token).await?;
        Ok(())
    }

    async fn purge_closed_orders_before(
        &self,
        cutoff: time::OffsetDateTime,
    ) -> Result<u64, StoreError> {
        Ok(DepositOrder::purge_closed_before(&self.pool, cutoff).await?)
    }

    async fn enqueue_task(
        &self,
        account: AccountId,
        subject: &str,
        tier: Tier,
    ) -> Result<i64, StoreError> {
        Ok(FulfillmentTask::enqueue(&self.pool, account, subject, tier).await?)
    }

    async fn claim_next_task(&self) -> Result<Option<FulfillmentTask>, StoreError> {
        Ok(FulfillmentTask::claim_next(&self.pool).await?)
    }

    async fn requeue_task(&self, task_id: i64, error: &str) -> Result<(), StoreError> {
        FulfillmentTask::requeue(&self.pool, task_id, error).await?;
        Ok(())
    }

    async fn fail_task(&self, task_id: i64, error: &str) -> Result<(), StoreError> {
        FulfillmentTask::fail(&self.pool, task_id, error).await?;
        Ok(())
    }

    async fn abort_task(&self, task_id: i64, error: &str) -> Result<(), StoreError> {
        FulfillmentTask::abort(&self.pool, task_id, error).await?;
        Ok(())
    }

    async fn complete_task(&self, task_id: i64) -> Result<(), StoreError> {
        FulfillmentTask::complete(&self.pool, task_id).await?;
        Ok(())
    }

    async fn task(&self, task_id: i64) -> Result<Option<FulfillmentTask>, StoreError> {
        Ok(FulfillmentTask::by_id(&self.pool, task_id).await?)
    }

    async fn is_settled(&self, settlement_id: &str) -> Result<bool, StoreError> {
        Ok(SettlementRecord::exists(&self.pool, settlement_id).await?)
    }

    async fn settle_task(
        &self,
        task: &FulfillmentTask,
        settlement: &Settlement,
    ) -> Result<SettleOutcome, StoreError> {
        let now = time::OffsetDateTime::now_utc();
        let mut tx = self.pool.begin().await?;

        let new_balance =
            Account::adjust_balance_tx(&mut tx, task.account(), -settlement.cost).await?;

        let record = SettlementRecord {
            settlement_id: settlement.settlement_id.clone(),
            account_id: task.account_id,
            subject: task.subject.clone(),
            tier_months: task.tier_months,
            cost: settlement.cost,
            chain_ref: settlement.chain_ref.clone(),
            created_at: now,
        };
        if !SettlementRecord::insert_tx(&mut tx, &record).await? {
            tx.rollback().await?;
            return Ok(SettleOutcome::DuplicateSettlement);
        }

        let entry = PurchaseLedgerEntry {
            entry_id: new_entry_id(),
            account_id: task.account_id,
            subject: task.subject.clone(),
            tier_months: task.tier_months,
            outcome: PurchaseOutcome::Succeeded,
            amount: settlement.cost,
            task_id: Some(task.id),
            created_at: now,
        };
        PurchaseLedgerEntry::insert_tx(&mut tx, &entry).await?;

        FulfillmentTask::complete_tx(&mut tx, task.id).await?;

        tx.commit().await?;

        Ok(SettleOutcome::Settled {
            entry_id: entry.entry_id,
            new_balance,
        })
    }

    async fn record_purchase_entry(
        &self,
        task: &FulfillmentTask,
        outcome: PurchaseOutcome,
        amount: Decimal,
    ) -> Result<String, StoreError> {
        let entry = PurchaseLedgerEntry {
            entry_id: new_entry_id(),
            account_id: task.account_id,
            subject: task.subject.clone(),
            tier_months: task.tier_months,
            outcome,
            amount,
            task_id: Some(task.id),
            created_at: time::OffsetDateTime::now_utc(),
        };
        PurchaseLedgerEntry::insert(&self.pool, &entry).await?;
        Ok(entry.entry_id)
    }

    async fn purchase_history(
        &self,
        account: AccountId,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<PurchaseLedgerEntry>, StoreError> {
        Ok(PurchaseLedgerEntry::page(&self.pool, account.0, page, per_page).await?)
    }
}
