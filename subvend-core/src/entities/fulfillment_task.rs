use subvend_sdk::objects::tier::InvalidTier;
use subvend_sdk::objects::{AccountId, Tier};

use crate::entities::TaskStatus;

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct FulfillmentTask {
    pub id: i64,
    pub account_id: i64,
    pub subject: String,
    pub tier_months: i16,
    pub status: TaskStatus,
    pub retry_count: i32,
    pub last_error: Option<String>,
    pub created_at: time::OffsetDateTime,
    pub updated_at: time::OffsetDateTime,
}

impl FulfillmentTask {
    pub fn account(&self) -> AccountId {
        AccountId(self.account_id)
    }

    pub fn tier(&self) -> Result<Tier, InvalidTier> {
        Tier::try_from(u8::try_from(self.tier_months).map_err(|_| InvalidTier(0))?)
    }

    /// Append a new pending task.
    pub async fn enqueue(
        pool: &sqlx::PgPool,
        account: AccountId,
        subject: &str,
        tier: Tier,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO fulfillment_tasks (account_id, subject, tier_months, status)
            VALUES ($1, $2, $3, 'pending')
            RETURNING id
            "#,
        )
        .bind(account.0)
        .bind(subject)
        .bind(i16::from(tier.months()))
        .fetch_one(pool)
        .await
    }

    /// Atomically claim the oldest pending task, flipping it to processing.
    ///
    /// `FOR UPDATE SKIP LOCKED` keeps two concurrent drain invocations from
    /// claiming the same task.
    pub async fn claim_next(pool: &sqlx::PgPool) -> Result<Option<FulfillmentTask>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let task = sqlx::query_as::<_, FulfillmentTask>(
            r#"
            SELECT id, account_id, subject, tier_months, status, retry_count,
                   last_error, created_at, updated_at
            FROM fulfillment_tasks
            WHERE status = 'pending'
            ORDER BY created_at ASC, id ASC
            LIMIT 1
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .fetch_optional(&mut *tx)
        .await?;

        let Some(mut task) = task else {
            return Ok(None);
        };

        sqlx::query(
            "UPDATE fulfillment_tasks SET status = 'processing', updated_at = now() WHERE id = $1",
        )
        .bind(task.id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        task.status = TaskStatus::Processing;
        Ok(Some(task))
    }

    /// Send a task back to pending after a failed attempt.
    pub async fn requeue(
        pool: &sqlx::PgPool,
        task_id: i64,
        error: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE fulfillment_tasks
            SET status = 'pending', retry_count = retry_count + 1,
                last_error = $2, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(task_id)
        .bind(error)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Terminal failure after an attempt; the attempt still counts.
    pub async fn fail(pool: &sqlx::PgPool, task_id: i64, error: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE fulfillment_tasks
            SET status = 'failed', retry_count = retry_count + 1,
                last_error = $2, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(task_id)
        .bind(error)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Terminal failure without an attempt (retry cap hit, insufficient
    /// funds); `retry_count` is left as-is.
    pub async fn abort(pool: &sqlx::PgPool, task_id: i64, error: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE fulfillment_tasks
            SET status = 'failed', last_error = $2, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(task_id)
        .bind(error)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Mark a task completed.
    pub async fn complete(pool: &sqlx::PgPool, task_id: i64) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE fulfillment_tasks SET status = 'completed', updated_at = now() WHERE id = $1",
        )
        .bind(task_id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Mark a task completed within a transaction.
    pub async fn complete_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        task_id: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE fulfillment_tasks SET status = 'completed', updated_at = now() WHERE id = $1",
        )
        .bind(task_id)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    pub async fn by_id(
        pool: &sqlx::PgPool,
        task_id: i64,
    ) -> Result<Option<FulfillmentTask>, sqlx::Error> {
        sqlx::query_as::<_, FulfillmentTask>(
            r#"
            SELECT id, account_id, subject, tier_months, status, retry_count,
                   last_error, created_at, updated_at
            FROM fulfillment_tasks
            WHERE id = $1
            "#,
        )
        .bind(task_id)
        .fetch_optional(pool)
        .await
    }
}
