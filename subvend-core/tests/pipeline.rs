//! End-to-end tests of the payment & fulfillment pipeline.
//!
//! These run the real matcher and queue against the in-memory store with
//! scripted collaborators, and exercise the full lifecycle: deposit order ->
//! transfer matching -> balance credit -> purchase -> drain -> settlement.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use uuid::Uuid;

use subvend_core::clients::indexer::{ChainIndexer, IndexerError, TransferEvent};
use subvend_core::config::ConfigStore;
use subvend_core::entities::{PurchaseOutcome, TaskStatus};
use subvend_core::fulfill::{FulfillError, Fulfiller, Settlement};
use subvend_core::matcher::{DepositError, DepositMatcher, MatcherSettings};
use subvend_core::notify::{Delivery, Notifications, Notifier, NotifyError};
use subvend_core::queue::{DEFAULT_MAX_RETRIES, FulfillmentQueue, PurchaseError};
use subvend_core::store::{MemStore, NewDepositOrder, Store, StoreError};
use subvend_sdk::config::ShopConfig;
use subvend_sdk::objects::{AccountId, Tier, TierPrices};

const ALICE: AccountId = AccountId(1001);
const ADMIN: AccountId = AccountId(9000);

fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

fn shop_config() -> ShopConfig {
    ShopConfig {
        prices: TierPrices {
            three_months: dec("12.50"),
            six_months: dec("19.00"),
            twelve_months: dec("30.00"),
        },
        payment_address: "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t".to_string(),
        support_contact: "@support".to_string(),
        admins: vec![ADMIN],
    }
}

// -- scripted collaborators -------------------------------------------------

#[derive(Default)]
struct StaticIndexer {
    events: Mutex<Vec<TransferEvent>>,
}

impl StaticIndexer {
    async fn set_events(&self, amounts: &[Decimal]) {
        let now = time::OffsetDateTime::now_utc();
        *self.events.lock().await = amounts
            .iter()
            .map(|amount| TransferEvent {
                amount: *amount,
                counterparty: "TSenderAddress".to_string(),
                observed_at: now,
            })
            .collect();
    }
}

#[async_trait]
impl ChainIndexer for StaticIndexer {
    async fn incoming_transfers(
        &self,
        _address: &str,
        _since: time::OffsetDateTime,
    ) -> Result<Vec<TransferEvent>, IndexerError> {
        Ok(self.events.lock().await.clone())
    }
}

#[derive(Default)]
struct RecordingNotifier {
    sent: std::sync::Mutex<Vec<(AccountId, String)>>,
}

impl RecordingNotifier {
    fn texts_for(&self, account: AccountId) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(a, _)| *a == account)
            .map(|(_, text)| text.clone())
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, account: AccountId, text: &str) -> Result<Delivery, NotifyError> {
        self.sent
            .lock()
            .unwrap()
            .push((account, text.to_string()));
        Ok(Delivery::Delivered)
    }
}

struct ScriptedFulfiller {
    script: Mutex<VecDeque<Result<Settlement, FulfillError>>>,
    calls: AtomicU32,
}

impl ScriptedFulfiller {
    fn new(script: Vec<Result<Settlement, FulfillError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: AtomicU32::new(0),
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fulfiller for ScriptedFulfiller {
    async fn fulfill(&self, _subject: &str, _tier: Tier) -> Result<Settlement, FulfillError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Err(FulfillError::Provider("script exhausted".to_string())))
    }
}

fn settled(id: &str, cost: &str) -> Result<Settlement, FulfillError> {
    Ok(Settlement {
        settlement_id: id.to_string(),
        cost: dec(cost),
        chain_ref: format!("tx-{id}"),
    })
}

fn provider_err() -> Result<Settlement, FulfillError> {
    Err(FulfillError::Provider("upstream 502".to_string()))
}

// -- harness ----------------------------------------------------------------

struct Pipeline {
    store: Arc<MemStore>,
    notifier: Arc<RecordingNotifier>,
    fulfiller: Arc<ScriptedFulfiller>,
    indexer: Arc<StaticIndexer>,
    matcher: DepositMatcher,
    queue: FulfillmentQueue,
}

fn pipeline(settings: MatcherSettings, script: Vec<Result<Settlement, FulfillError>>) -> Pipeline {
    let store = Arc::new(MemStore::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let fulfiller = Arc::new(ScriptedFulfiller::new(script));
    let indexer = Arc::new(StaticIndexer::default());
    let shop = ConfigStore::new(shop_config());
    let notifications = Notifications::new(notifier.clone() as Arc<dyn Notifier>);

    let matcher = DepositMatcher::new(
        store.clone() as Arc<dyn Store>,
        indexer.clone() as Arc<dyn ChainIndexer>,
        notifications.clone(),
        shop.clone(),
        settings,
    );
    let queue = FulfillmentQueue::new(
        store.clone() as Arc<dyn Store>,
        fulfiller.clone() as Arc<dyn Fulfiller>,
        notifications,
        shop,
        DEFAULT_MAX_RETRIES,
    );

    Pipeline {
        store,
        notifier,
        fulfiller,
        indexer,
        matcher,
        queue,
    }
}

// -- ledger properties ------------------------------------------------------

#[tokio::test]
async fn balance_replay_equals_sum_of_applied_deltas() {
    let p = pipeline(MatcherSettings::default(), vec![]);
    let deltas = ["50.000", "-20.000", "5.500", "-35.500"];

    let mut applied = Decimal::ZERO;
    for delta in deltas {
        let delta = dec(delta);
        let new_balance = p.store.adjust_balance(ALICE, delta).await.unwrap();
        applied += delta;
        assert_eq!(new_balance, applied);
        assert!(new_balance >= Decimal::ZERO);
    }

    // A debit past zero is rejected and leaves the balance unchanged.
    let err = p.store.adjust_balance(ALICE, dec("-10")).await.unwrap_err();
    assert!(matches!(err, StoreError::InsufficientFunds { .. }));
    assert_eq!(p.store.balance(ALICE).await.unwrap(), applied);
}

// -- deposit order properties -----------------------------------------------

#[tokio::test]
async fn open_orders_never_share_unique_amounts() {
    let p = pipeline(MatcherSettings::default(), vec![]);
    let base = dec("10.00");

    let first = p.matcher.create_order(ALICE, "alice", base).await.unwrap();
    let second = p.matcher.create_order(ALICE, "alice", base).await.unwrap();

    assert_ne!(first.amount, base);
    assert_ne!(second.amount, base);
    assert_ne!(first.amount, second.amount);
    for instructions in [&first, &second] {
        let offset = instructions.amount - base;
        assert!(offset >= dec("0.001") && offset <= dec("0.01"));
    }
}

#[tokio::test]
async fn concurrent_deposit_requests_get_distinct_amounts() {
    let p = pipeline(MatcherSettings::default(), vec![]);
    let base = dec("10.00");

    let (first, second) = tokio::join!(
        p.matcher.create_order(ALICE, "alice", base),
        p.matcher.create_order(ALICE, "alice", base),
    );
    let (first, second) = (first.unwrap(), second.unwrap());

    assert_ne!(first.amount, base);
    assert_ne!(second.amount, base);
    assert_ne!(first.amount, second.amount);
}

#[tokio::test]
async fn fourth_open_order_is_rejected() {
    let p = pipeline(MatcherSettings::default(), vec![]);
    for _ in 0..3 {
        p.matcher
            .create_order(ALICE, "alice", dec("10.00"))
            .await
            .unwrap();
    }
    let err = p
        .matcher
        .create_order(ALICE, "alice", dec("10.00"))
        .await
        .unwrap_err();
    assert!(matches!(err, DepositError::TooManyPendingOrders));
}

#[tokio::test]
async fn nonpositive_deposit_amount_is_rejected() {
    let p = pipeline(MatcherSettings::default(), vec![]);
    for raw in ["0", "-3.5"] {
        let err = p
            .matcher
            .create_order(ALICE, "alice", dec(raw))
            .await
            .unwrap_err();
        assert!(matches!(err, DepositError::InvalidAmount));
    }
}

#[tokio::test]
async fn duplicate_poll_credits_exactly_once() {
    let p = pipeline(MatcherSettings::default(), vec![]);
    let instructions = p
        .matcher
        .create_order(ALICE, "alice", dec("25.00"))
        .await
        .unwrap();

    // The same transfer shows up twice in the window, plus an unrelated one.
    p.indexer
        .set_events(&[instructions.amount, instructions.amount, dec("99.99")])
        .await;

    let credited = p.matcher.poll_and_match().await.unwrap();
    assert_eq!(credited, 1);
    assert_eq!(p.store.balance(ALICE).await.unwrap(), instructions.amount);

    // Re-polling the same window is a no-op: no open order carries the
    // amount anymore.
    let credited = p.matcher.poll_and_match().await.unwrap();
    assert_eq!(credited, 0);
    assert_eq!(p.store.balance(ALICE).await.unwrap(), instructions.amount);

    let user_messages = p.notifier.texts_for(ALICE);
    assert_eq!(user_messages.len(), 1);
    assert!(user_messages[0].contains("Deposit received"));
    assert_eq!(p.notifier.texts_for(ADMIN).len(), 1);
}

#[tokio::test]
async fn canceled_order_cannot_match() {
    let p = pipeline(MatcherSettings::default(), vec![]);
    let instructions = p
        .matcher
        .create_order(ALICE, "alice", dec("25.00"))
        .await
        .unwrap();

    assert!(p.matcher.cancel_order(instructions.order_token).await.unwrap());
    // Second cancel is a no-op.
    assert!(!p.matcher.cancel_order(instructions.order_token).await.unwrap());

    p.indexer.set_events(&[instructions.amount]).await;
    assert_eq!(p.matcher.poll_and_match().await.unwrap(), 0);
    assert_eq!(p.store.balance(ALICE).await.unwrap(), Decimal::ZERO);
}

#[tokio::test]
async fn expired_order_swept_notified_and_amount_freed() {
    let settings = MatcherSettings {
        expiry: time::Duration::ZERO,
        ..MatcherSettings::default()
    };
    let p = pipeline(settings, vec![]);
    let instructions = p
        .matcher
        .create_order(ALICE, "alice", dec("10.00"))
        .await
        .unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let swept = p.matcher.sweep_expired().await.unwrap();
    assert_eq!(swept, 1);
    assert_eq!(p.store.open_order_count(ALICE).await.unwrap(), 0);

    let messages = p.notifier.texts_for(ALICE);
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("expired"));

    // The freed unique amount can be reassigned to a later order.
    let now = time::OffsetDateTime::now_utc();
    let reassigned = NewDepositOrder {
        order_token: Uuid::new_v4(),
        account_id: ALICE,
        requested_amount: dec("10.00"),
        amount: instructions.amount,
        created_at: now,
        expires_at: now + time::Duration::minutes(20),
    };
    p.store.try_insert_deposit_order(&reassigned).await.unwrap();
}

// -- queue / settlement properties ------------------------------------------

#[tokio::test]
async fn purchase_settles_realized_cost_exactly_once() {
    let p = pipeline(MatcherSettings::default(), vec![settled("R1", "29.80")]);
    p.store.adjust_balance(ALICE, dec("50.000")).await.unwrap();

    let task_id = p
        .queue
        .enqueue(ALICE, "alice", "@friend", Tier::Months12)
        .await
        .unwrap();

    assert_eq!(p.queue.drain(5).await, 1);

    assert_eq!(p.store.balance(ALICE).await.unwrap(), dec("20.200"));
    let task = p.store.task(task_id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert!(p.store.is_settled("R1").await.unwrap());

    let history = p.store.purchase_history(ALICE, 1, 5).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].outcome, PurchaseOutcome::Succeeded);
    assert_eq!(history[0].amount, dec("29.80"));

    let messages = p.notifier.texts_for(ALICE);
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("New balance: 20.200"));
}

#[tokio::test]
async fn enqueue_rejects_insufficient_nominal_balance() {
    let p = pipeline(MatcherSettings::default(), vec![]);
    p.store.adjust_balance(ALICE, dec("10.000")).await.unwrap();

    let err = p
        .queue
        .enqueue(ALICE, "alice", "friend", Tier::Months3)
        .await
        .unwrap_err();
    assert!(matches!(err, PurchaseError::InsufficientFunds { .. }));
    assert_eq!(p.fulfiller.calls(), 0);
}

#[tokio::test]
async fn blank_subject_is_rejected() {
    let p = pipeline(MatcherSettings::default(), vec![]);
    p.store.adjust_balance(ALICE, dec("50.000")).await.unwrap();
    let err = p
        .queue
        .enqueue(ALICE, "alice", "  @ ", Tier::Months3)
        .await
        .unwrap_err();
    assert!(matches!(err, PurchaseError::InvalidSubject));
}

#[tokio::test]
async fn task_fails_terminally_after_retry_cap() {
    let p = pipeline(
        MatcherSettings::default(),
        vec![provider_err(), provider_err(), provider_err()],
    );
    p.store.adjust_balance(ALICE, dec("50.000")).await.unwrap();

    let task_id = p
        .queue
        .enqueue(ALICE, "alice", "friend", Tier::Months3)
        .await
        .unwrap();

    // One drain pass walks the task through all three attempts: two
    // requeues, then a terminal failure at the cap.
    assert_eq!(p.queue.drain(10).await, 3);
    assert_eq!(p.fulfiller.calls(), 3);

    let task = p.store.task(task_id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.retry_count, 3);

    // A capped task never re-invokes the provider.
    assert_eq!(p.queue.drain(10).await, 0);
    assert_eq!(p.fulfiller.calls(), 3);

    // Balance untouched, failure audited, owner told once.
    assert_eq!(p.store.balance(ALICE).await.unwrap(), dec("50.000"));
    let history = p.store.purchase_history(ALICE, 1, 5).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].outcome, PurchaseOutcome::Failed);
    assert_eq!(history[0].amount, Decimal::ZERO);
    assert_eq!(p.notifier.texts_for(ALICE).len(), 1);
}

#[tokio::test]
async fn provider_failure_recovers_on_third_attempt() {
    let p = pipeline(
        MatcherSettings::default(),
        vec![provider_err(), provider_err(), settled("R9", "12.00")],
    );
    p.store.adjust_balance(ALICE, dec("50.000")).await.unwrap();

    let task_id = p
        .queue
        .enqueue(ALICE, "alice", "friend", Tier::Months3)
        .await
        .unwrap();

    assert_eq!(p.queue.drain(10).await, 3);

    let task = p.store.task(task_id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.retry_count, 2);
    assert_eq!(p.store.balance(ALICE).await.unwrap(), dec("38.000"));
    assert!(p.store.is_settled("R9").await.unwrap());
}

#[tokio::test]
async fn registered_settlement_never_debits_twice() {
    // The provider hands back the same settlement id for both tasks.
    let p = pipeline(
        MatcherSettings::default(),
        vec![settled("R5", "12.00"), settled("R5", "12.00")],
    );
    p.store.adjust_balance(ALICE, dec("50.000")).await.unwrap();

    p.queue
        .enqueue(ALICE, "alice", "friend", Tier::Months3)
        .await
        .unwrap();
    let second_id = p
        .queue
        .enqueue(ALICE, "alice", "friend", Tier::Months3)
        .await
        .unwrap();

    assert_eq!(p.queue.drain(5).await, 2);

    // One debit only.
    assert_eq!(p.store.balance(ALICE).await.unwrap(), dec("38.000"));

    let second = p.store.task(second_id).await.unwrap().unwrap();
    assert_eq!(second.status, TaskStatus::Completed);

    let history = p.store.purchase_history(ALICE, 1, 5).await.unwrap();
    assert_eq!(history.len(), 2);
    let outcomes: Vec<_> = history.iter().map(|e| e.outcome).collect();
    assert!(outcomes.contains(&PurchaseOutcome::Succeeded));
    assert!(outcomes.contains(&PurchaseOutcome::Duplicate));
    let duplicate = history
        .iter()
        .find(|e| e.outcome == PurchaseOutcome::Duplicate)
        .unwrap();
    assert_eq!(duplicate.amount, Decimal::ZERO);

    assert!(
        p.notifier
            .texts_for(ALICE)
            .iter()
            .any(|m| m.contains("already has"))
    );
}

#[tokio::test]
async fn insufficient_funds_at_drain_aborts_without_retry() {
    let p = pipeline(MatcherSettings::default(), vec![settled("R2", "12.00")]);
    p.store.adjust_balance(ALICE, dec("30.000")).await.unwrap();

    let task_id = p
        .queue
        .enqueue(ALICE, "alice", "friend", Tier::Months3)
        .await
        .unwrap();

    // Balance drops between enqueue and drain.
    p.store.adjust_balance(ALICE, dec("-25.000")).await.unwrap();

    assert_eq!(p.queue.drain(5).await, 1);

    let task = p.store.task(task_id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.retry_count, 0);
    assert_eq!(p.fulfiller.calls(), 0);

    let history = p.store.purchase_history(ALICE, 1, 5).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].outcome, PurchaseOutcome::Failed);
    assert!(
        p.notifier
            .texts_for(ALICE)
            .iter()
            .any(|m| m.contains("was not charged"))
    );
}

#[tokio::test]
async fn realized_cost_above_balance_rolls_back_settlement() {
    // Nominal price passes the pre-check but the realized cost does not.
    let p = pipeline(MatcherSettings::default(), vec![settled("R7", "20.00")]);
    p.store.adjust_balance(ALICE, dec("13.000")).await.unwrap();

    let task_id = p
        .queue
        .enqueue(ALICE, "alice", "friend", Tier::Months3)
        .await
        .unwrap();
    assert_eq!(p.queue.drain(5).await, 1);

    assert_eq!(p.store.balance(ALICE).await.unwrap(), dec("13.000"));
    assert!(!p.store.is_settled("R7").await.unwrap());
    let task = p.store.task(task_id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.retry_count, 0);
}

#[tokio::test]
async fn unknown_recipient_fails_without_burning_retries() {
    let p = pipeline(
        MatcherSettings::default(),
        vec![Err(FulfillError::SubjectNotFound("ghost".to_string()))],
    );
    p.store.adjust_balance(ALICE, dec("50.000")).await.unwrap();

    let task_id = p
        .queue
        .enqueue(ALICE, "alice", "ghost", Tier::Months3)
        .await
        .unwrap();
    assert_eq!(p.queue.drain(5).await, 1);

    assert_eq!(p.fulfiller.calls(), 1);
    let task = p.store.task(task_id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(p.store.balance(ALICE).await.unwrap(), dec("50.000"));
}

#[tokio::test]
async fn tasks_are_claimed_oldest_first() {
    let p = pipeline(MatcherSettings::default(), vec![]);
    let a = p.store.enqueue_task(ALICE, "first", Tier::Months3).await.unwrap();
    let b = p.store.enqueue_task(ALICE, "second", Tier::Months3).await.unwrap();

    let claimed = p.store.claim_next_task().await.unwrap().unwrap();
    assert_eq!(claimed.id, a);
    assert_eq!(claimed.status, TaskStatus::Processing);

    let claimed = p.store.claim_next_task().await.unwrap().unwrap();
    assert_eq!(claimed.id, b);

    assert!(p.store.claim_next_task().await.unwrap().is_none());
}

#[tokio::test]
async fn deposit_then_purchase_full_lifecycle() {
    let p = pipeline(MatcherSettings::default(), vec![settled("R42", "29.80")]);

    // Fund the account through the deposit pipeline rather than directly.
    let instructions = p
        .matcher
        .create_order(ALICE, "alice", dec("50.00"))
        .await
        .unwrap();
    p.indexer.set_events(&[instructions.amount]).await;
    assert_eq!(p.matcher.poll_and_match().await.unwrap(), 1);
    assert_eq!(p.store.balance(ALICE).await.unwrap(), instructions.amount);

    let task_id = p
        .queue
        .enqueue(ALICE, "alice", "friend", Tier::Months12)
        .await
        .unwrap();
    assert_eq!(p.queue.drain(5).await, 1);

    let task = p.store.task(task_id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(
        p.store.balance(ALICE).await.unwrap(),
        instructions.amount - dec("29.80")
    );
}
