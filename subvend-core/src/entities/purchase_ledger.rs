use rust_decimal::Decimal;
use uuid::Uuid;

use crate::entities::PurchaseOutcome;

/// Append-only audit row, one per fulfillment attempt. Never mutated.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct PurchaseLedgerEntry {
    pub entry_id: String,
    pub account_id: i64,
    pub subject: String,
    pub tier_months: i16,
    pub outcome: PurchaseOutcome,
    pub amount: Decimal,
    pub task_id: Option<i64>,
    pub created_at: time::OffsetDateTime,
}

/// Short user-facing entry token, quoted back in notifications.
pub fn new_entry_id() -> String {
    let mut buf = Uuid::encode_buffer();
    let simple = Uuid::new_v4().simple().encode_lower(&mut buf);
    simple[..8].to_string()
}

impl PurchaseLedgerEntry {
    pub async fn insert(pool: &sqlx::PgPool, entry: &PurchaseLedgerEntry) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO purchase_ledger
                (entry_id, account_id, subject, tier_months, outcome, amount, task_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&entry.entry_id)
        .bind(entry.account_id)
        .bind(&entry.subject)
        .bind(entry.tier_months)
        .bind(entry.outcome)
        .bind(entry.amount)
        .bind(entry.task_id)
        .bind(entry.created_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn insert_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        entry: &PurchaseLedgerEntry,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO purchase_ledger
                (entry_id, account_id, subject, tier_months, outcome, amount, task_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&entry.entry_id)
        .bind(entry.account_id)
        .bind(&entry.subject)
        .bind(entry.tier_months)
        .bind(entry.outcome)
        .bind(entry.amount)
        .bind(entry.task_id)
        .bind(entry.created_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// One history page, newest first.
    pub async fn page(
        pool: &sqlx::PgPool,
        account_id: i64,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<PurchaseLedgerEntry>, sqlx::Error> {
        let offset = i64::from(page.saturating_sub(1)) * i64::from(per_page);
        sqlx::query_as::<_, PurchaseLedgerEntry>(
            r#"
            SELECT entry_id, account_id, subject, tier_months, outcome, amount, task_id, created_at
            FROM purchase_ledger
            WHERE account_id = $1
            ORDER BY created_at DESC, entry_id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(account_id)
        .bind(i64::from(per_page))
        .bind(offset)
        .fetch_all(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_ids_are_short_and_distinct() {
        let a = new_entry_id();
        let b = new_entry_id();
        assert_eq!(a.len(), 8);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
