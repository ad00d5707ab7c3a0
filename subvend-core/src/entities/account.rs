use rust_decimal::Decimal;
use subvend_sdk::objects::AccountId;

use crate::store::StoreError;

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Account {
    pub account_id: i64,
    pub username: String,
    pub balance: Decimal,
    pub updated_at: time::OffsetDateTime,
}

impl Account {
    /// Create the account on first contact, or refresh its display name.
    pub async fn touch(
        pool: &sqlx::PgPool,
        account: AccountId,
        username: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO accounts (account_id, username, balance)
            VALUES ($1, $2, 0)
            ON CONFLICT (account_id)
            DO UPDATE SET username = EXCLUDED.username, updated_at = now()
            "#,
        )
        .bind(account.0)
        .bind(username)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Point-in-time balance read for display; no lock taken.
    pub async fn balance(pool: &sqlx::PgPool, account: AccountId) -> Result<Decimal, sqlx::Error> {
        let balance = sqlx::query_scalar::<_, Decimal>(
            "SELECT balance FROM accounts WHERE account_id = $1",
        )
        .bind(account.0)
        .fetch_optional(pool)
        .await?;
        Ok(balance.unwrap_or(Decimal::ZERO))
    }

    /// Apply a signed delta to the balance inside an existing transaction.
    ///
    /// Takes an exclusive row lock so the balance check and the write cannot
    /// interleave with a concurrent mutation of the same account. The caller
    /// owns commit/rollback, so companion writes stay atomic with the debit
    /// or credit.
    pub async fn adjust_balance_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        account: AccountId,
        delta: Decimal,
    ) -> Result<Decimal, StoreError> {
        let current = sqlx::query_scalar::<_, Decimal>(
            "SELECT balance FROM accounts WHERE account_id = $1 FOR UPDATE",
        )
        .bind(account.0)
        .fetch_optional(&mut **tx)
        .await?
        .unwrap_or(Decimal::ZERO);

        let new_balance = current + delta;
        if new_balance < Decimal::ZERO {
            return Err(StoreError::InsufficientFunds {
                required: -delta,
                available: current,
            });
        }

        sqlx::query(
            r#"
            INSERT INTO accounts (account_id, username, balance)
            VALUES ($1, $2, $3)
            ON CONFLICT (account_id)
            DO UPDATE SET balance = EXCLUDED.balance, updated_at = now()
            "#,
        )
        .bind(account.0)
        .bind(format!("User{}", account.0))
        .bind(new_balance)
        .execute(&mut **tx)
        .await?;

        Ok(new_balance)
    }
}
