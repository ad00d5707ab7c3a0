use rust_decimal::Decimal;
use uuid::Uuid;

use crate::entities::DepositOrderStatus;
use crate::store::{NewDepositOrder, StoreError};

/// Name of the partial unique index guarding open-order amounts.
const OPEN_AMOUNT_INDEX: &str = "deposit_orders_open_amount_idx";

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct DepositOrder {
    pub order_token: Uuid,
    pub account_id: i64,
    pub requested_amount: Decimal,
    pub amount: Decimal,
    pub status: DepositOrderStatus,
    pub created_at: time::OffsetDateTime,
    pub expires_at: time::OffsetDateTime,
    pub matched_at: Option<time::OffsetDateTime>,
}

impl DepositOrder {
    /// Count the account's currently-open orders.
    pub async fn count_open(
        pool: &sqlx::PgPool,
        account_id: i64,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM deposit_orders WHERE account_id = $1 AND status = 'open'",
        )
        .bind(account_id)
        .fetch_one(pool)
        .await
    }

    /// Insert a new open order.
    ///
    /// The unique amount is reserved at allocation time by the partial unique
    /// index over open orders; a collision surfaces as
    /// [`StoreError::AmountInUse`] so the caller can re-roll the offset.
    pub async fn try_insert(
        pool: &sqlx::PgPool,
        order: &NewDepositOrder,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO deposit_orders
                (order_token, account_id, requested_amount, amount, status, created_at, expires_at)
            VALUES ($1, $2, $3, $4, 'open', $5, $6)
            "#,
        )
        .bind(order.order_token)
        .bind(order.account_id.0)
        .bind(order.requested_amount)
        .bind(order.amount)
        .bind(order.created_at)
        .bind(order.expires_at)
        .execute(pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.constraint() == Some(OPEN_AMOUNT_INDEX) => {
                Err(StoreError::AmountInUse(order.amount))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Cancel an order if it is still open. Returns whether a row changed.
    pub async fn cancel(pool: &sqlx::PgPool, order_token: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE deposit_orders SET status = 'canceled' WHERE order_token = $1 AND status = 'open'",
        )
        .bind(order_token)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Lock the oldest open order carrying this exact amount, if any.
    ///
    /// Amount is the sole correlation key for unreferenced transfers; ties
    /// between equal amounts cannot exist among open orders, and the
    /// oldest-first ordering is the tie-break for historical rows.
    pub async fn lock_open_by_amount_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        amount: Decimal,
    ) -> Result<Option<DepositOrder>, sqlx::Error> {
        sqlx::query_as::<_, DepositOrder>(
            r#"
            SELECT order_token, account_id, requested_amount, amount, status,
                   created_at, expires_at, matched_at
            FROM deposit_orders
            WHERE amount = $1 AND status = 'open'
            ORDER BY created_at ASC
            LIMIT 1
            FOR UPDATE
            "#,
        )
        .bind(amount)
        .fetch_optional(&mut **tx)
        .await
    }

    /// Flip an open order to matched within a transaction.
    ///
    /// The status predicate makes a second observation of the same transfer a
    /// no-op even without the row lock.
    pub async fn mark_matched_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        order_token: Uuid,
        matched_at: time::OffsetDateTime,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE deposit_orders
            SET status = 'matched', matched_at = $2
            WHERE order_token = $1 AND status = 'open'
            "#,
        )
        .bind(order_token)
        .bind(matched_at)
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// All open orders whose expiry has passed.
    pub async fn expired_open(
        pool: &sqlx::PgPool,
        now: time::OffsetDateTime,
    ) -> Result<Vec<DepositOrder>, sqlx::Error> {
        sqlx::query_as::<_, DepositOrder>(
            r#"
            SELECT order_token, account_id, requested_amount, amount, status,
                   created_at, expires_at, matched_at
            FROM deposit_orders
            WHERE status = 'open' AND expires_at < $1
            ORDER BY expires_at ASC
            "#,
        )
        .bind(now)
        .fetch_all(pool)
        .await
    }

    /// Delete one order, freeing its unique amount for reuse.
    pub async fn delete(pool: &sqlx::PgPool, order_token: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM deposit_orders WHERE order_token = $1")
            .bind(order_token)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Storage hygiene: drop matched and canceled audit rows older than the
    /// retention horizon.
    pub async fn purge_closed_before(
        pool: &sqlx::PgPool,
        cutoff: time::OffsetDateTime,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            DELETE FROM deposit_orders
            WHERE status IN ('matched', 'canceled')
              AND COALESCE(matched_at, created_at) < $1
            "#,
        )
        .bind(cutoff)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
