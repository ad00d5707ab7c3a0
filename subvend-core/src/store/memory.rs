//! In-memory [`Store`] used by the test-suite and single-process demo runs.
//!
//! One mutex serializes every operation, which trivially gives the same
//! atomicity the Postgres backend gets from transactions; the conditional
//! logic (status predicates, uniqueness checks, negative-balance rejection)
//! mirrors the SQL exactly.

use std::collections::HashMap;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use uuid::Uuid;

use subvend_sdk::objects::{AccountId, Tier};

use crate::entities::deposit_order::DepositOrder;
use crate::entities::fulfillment_task::FulfillmentTask;
use crate::entities::purchase_ledger::{PurchaseLedgerEntry, new_entry_id};
use crate::entities::settlement_record::SettlementRecord;
use crate::entities::{DepositOrderStatus, PurchaseOutcome, TaskStatus};
use crate::fulfill::Settlement;
use crate::store::{
    ExpiredOrder, MatchedDeposit, NewDepositOrder, SettleOutcome, Store, StoreError,
};

#[derive(Debug, Default)]
struct Inner {
    accounts: HashMap<i64, (String, Decimal)>,
    orders: HashMap<Uuid, DepositOrder>,
    tasks: Vec<FulfillmentTask>,
    next_task_id: i64,
    settlements: HashMap<String, SettlementRecord>,
    ledger: Vec<PurchaseLedgerEntry>,
}

impl Inner {
    fn balance_of(&self, account: AccountId) -> Decimal {
        self.accounts
            .get(&account.0)
            .map(|(_, balance)| *balance)
            .unwrap_or(Decimal::ZERO)
    }

    fn adjust(&mut self, account: AccountId, delta: Decimal) -> Result<Decimal, StoreError> {
        let current = self.balance_of(account);
        let new_balance = current + delta;
        if new_balance < Decimal::ZERO {
            return Err(StoreError::InsufficientFunds {
                required: -delta,
                available: current,
            });
        }
        self.accounts
            .entry(account.0)
            .or_insert_with(|| (format!("User{}", account.0), Decimal::ZERO))
            .1 = new_balance;
        Ok(new_balance)
    }

    fn task_mut(&mut self, task_id: i64) -> Option<&mut FulfillmentTask> {
        self.tasks.iter_mut().find(|t| t.id == task_id)
    }

    fn push_entry(
        &mut self,
        task: &FulfillmentTask,
        outcome: PurchaseOutcome,
        amount: Decimal,
    ) -> String {
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
        let entry_id = entry.entry_id.clone();
        self.ledger.push(entry);
        entry_id
    }
}

#[derive(Default)]
pub struct MemStore {
    inner: Mutex<Inner>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemStore {
    async fn touch_account(&self, account: AccountId, username: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner
            .accounts
            .entry(account.0)
            .and_modify(|(name, _)| *name = username.to_string())
            .or_insert_with(|| (username.to_string(), Decimal::ZERO));
        Ok(())
    }

    async fn balance(&self, account: AccountId) -> Result<Decimal, StoreError> {
        Ok(self.inner.lock().await.balance_of(account))
    }

    async fn adjust_balance(
        &self,
        account: AccountId,
        delta: Decimal,
    ) -> Result<Decimal, StoreError> {
        self.inner.lock().await.adjust(account, delta)
    }

    async fn open_order_count(&self, account: AccountId) -> Result<u32, StoreError> {
        let inner = self.inner.lock().await;
        let count = inner
            .orders
            .values()
            .filter(|o| o.account_id == account.0 && o.status == DepositOrderStatus::Open)
            .count();
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn try_insert_deposit_order(&self, order: &NewDepositOrder) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let collision = inner
            .orders
            .values()
            .any(|o| o.status == DepositOrderStatus::Open && o.amount == order.amount);
        if collision {
            return Err(StoreError::AmountInUse(order.amount));
        }
        inner.orders.insert(
            order.order_token,
            DepositOrder {
                order_token: order.order_token,
                account_id: order.account_id.0,
                requested_amount: order.requested_amount,
                amount: order.amount,
                status: DepositOrderStatus::Open,
                created_at: order.created_at,
                expires_at: order.expires_at,
                matched_at: None,
            },
        );
        Ok(())
    }

    async fn cancel_deposit_order(&self, order_token: Uuid) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        match inner.orders.get_mut(&order_token) {
            Some(order) if order.status == DepositOrderStatus::Open => {
                order.status = DepositOrderStatus::Canceled;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn credit_matching_order(
        &self,
        amount: Decimal,
        now: time::OffsetDateTime,
    ) -> Result<Option<MatchedDeposit>, StoreError> {
        let mut inner = self.inner.lock().await;

        let token = inner
            .orders
            .values()
            .filter(|o| o.status == DepositOrderStatus::Open && o.amount == amount)
            .min_by_key(|o| o.created_at)
            .map(|o| o.order_token);
        let Some(token) = token else {
            return Ok(None);
        };

        let account_id = {
            let Some(order) = inner.orders.get_mut(&token) else {
                return Ok(None);
            };
            order.status = DepositOrderStatus::Matched;
            order.matched_at = Some(now);
            order.account_id
        };

        let new_balance = inner.adjust(AccountId(account_id), amount)?;

        Ok(Some(MatchedDeposit {
            order_token: token,
            account_id: AccountId(account_id),
            amount,
            new_balance,
        }))
    }

    async fn expired_open_orders(
        &self,
        now: time::OffsetDateTime,
    ) -> Result<Vec<ExpiredOrder>, StoreError> {
        let inner = self.inner.lock().await;
        let mut expired: Vec<_> = inner
            .orders
            .values()
            .filter(|o| o.status == DepositOrderStatus::Open && o.expires_at < now)
            .collect();
        expired.sort_by_key(|o| o.expires_at);
        Ok(expired
            .into_iter()
            .map(|o| ExpiredOrder {
                order_token: o.order_token,
                account_id: AccountId(o.account_id),
                amount: o.amount,
            })
            .collect())
    }

    async fn delete_deposit_order(&self, order_token: Uuid) -> Result<(), StoreError> {
        self.inner.lock().await.orders.remove(&order_token);
        Ok(())
    }

    async fn purge_closed_orders_before(
        &self,
        cutoff: time::OffsetDateTime,
    ) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().await;
        let before = inner.orders.len();
        inner.orders.retain(|_, o| {
            let closed = matches!(
                o.status,
                DepositOrderStatus::Matched | DepositOrderStatus::Canceled
            );
            !(closed && o.matched_at.unwrap_or(o.created_at) < cutoff)
        });
        Ok((before - inner.orders.len()) as u64)
    }

    async fn enqueue_task(
        &self,
        account: AccountId,
        subject: &str,
        tier: Tier,
    ) -> Result<i64, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.next_task_id += 1;
        let id = inner.next_task_id;
        let now = time::OffsetDateTime::now_utc();
        inner.tasks.push(FulfillmentTask {
            id,
            account_id: account.0,
            subject: subject.to_string(),
            tier_months: i16::from(tier.months()),
            status: TaskStatus::Pending,
            retry_count: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
        });
        Ok(id)
    }

    async fn claim_next_task(&self) -> Result<Option<FulfillmentTask>, StoreError> {
        let mut inner = self.inner.lock().await;
        let next = inner
            .tasks
            .iter_mut()
            .filter(|t| t.status == TaskStatus::Pending)
            .min_by_key(|t| (t.created_at, t.id));
        Ok(next.map(|task| {
            task.status = TaskStatus::Processing;
            task.updated_at = time::OffsetDateTime::now_utc();
            task.clone()
        }))
    }

    async fn requeue_task(&self, task_id: i64, error: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if let Some(task) = inner.task_mut(task_id) {
            task.status = TaskStatus::Pending;
            task.retry_count += 1;
            task.last_error = Some(error.to_string());
            task.updated_at = time::OffsetDateTime::now_utc();
        }
        Ok(())
    }

    async fn fail_task(&self, task_id: i64, error: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if let Some(task) = inner.task_mut(task_id) {
            task.status = TaskStatus::Failed;
            task.retry_count += 1;
            task.last_error = Some(error.to_string());
            task.updated_at = time::OffsetDateTime::now_utc();
        }
        Ok(())
    }

    async fn abort_task(&self, task_id: i64, error: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if let Some(task) = inner.task_mut(task_id) {
            task.status = TaskStatus::Failed;
            task.last_error = Some(error.to_string());
            task.updated_at = time::OffsetDateTime::now_utc();
        }
        Ok(())
    }

    async fn complete_task(&self, task_id: i64) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if let Some(task) = inner.task_mut(task_id) {
            task.status = TaskStatus::Completed;
            task.updated_at = time::OffsetDateTime::now_utc();
        }
        Ok(())
    }

    async fn task(&self, task_id: i64) -> Result<Option<FulfillmentTask>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.tasks.iter().find(|t| t.id == task_id).cloned())
    }

    async fn is_settled(&self, settlement_id: &str) -> Result<bool, StoreError> {
        Ok(self
            .inner
            .lock()
            .await
            .settlements
            .contains_key(settlement_id))
    }

    async fn settle_task(
        &self,
        task: &FulfillmentTask,
        settlement: &Settlement,
    ) -> Result<SettleOutcome, StoreError> {
        let mut inner = self.inner.lock().await;

        if inner.settlements.contains_key(&settlement.settlement_id) {
            return Ok(SettleOutcome::DuplicateSettlement);
        }

        // Debit first so an insufficient balance leaves every table untouched.
        let new_balance = inner.adjust(task.account(), -settlement.cost)?;

        inner.settlements.insert(
            settlement.settlement_id.clone(),
            SettlementRecord {
                settlement_id: settlement.settlement_id.clone(),
                account_id: task.account_id,
                subject: task.subject.clone(),
                tier_months: task.tier_months,
                cost: settlement.cost,
                chain_ref: settlement.chain_ref.clone(),
                created_at: time::OffsetDateTime::now_utc(),
            },
        );

        let entry_id = inner.push_entry(task, PurchaseOutcome::Succeeded, settlement.cost);

        if let Some(stored) = inner.task_mut(task.id) {
            stored.status = TaskStatus::Completed;
            stored.updated_at = time::OffsetDateTime::now_utc();
        }

        Ok(SettleOutcome::Settled {
            entry_id,
            new_balance,
        })
    }

    async fn record_purchase_entry(
        &self,
        task: &FulfillmentTask,
        outcome: PurchaseOutcome,
        amount: Decimal,
    ) -> Result<String, StoreError> {
        Ok(self.inner.lock().await.push_entry(task, outcome, amount))
    }

    async fn purchase_history(
        &self,
        account: AccountId,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<PurchaseLedgerEntry>, StoreError> {
        let inner = self.inner.lock().await;
        let mut entries: Vec<_> = inner
            .ledger
            .iter()
            .filter(|e| e.account_id == account.0)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let offset = (page.saturating_sub(1) as usize) * per_page as usize;
        Ok(entries
            .into_iter()
            .skip(offset)
            .take(per_page as usize)
            .collect())
    }
}
