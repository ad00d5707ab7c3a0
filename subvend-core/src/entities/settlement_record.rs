use rust_decimal::Decimal;

/// Durable form of the idempotency registry: one row per external
/// settlement id, inserted at most once.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct SettlementRecord {
    pub settlement_id: String,
    pub account_id: i64,
    pub subject: String,
    pub tier_months: i16,
    pub cost: Decimal,
    pub chain_ref: String,
    pub created_at: time::OffsetDateTime,
}

impl SettlementRecord {
    pub async fn exists(pool: &sqlx::PgPool, settlement_id: &str) -> Result<bool, sqlx::Error> {
        let found = sqlx::query_scalar::<_, i32>(
            "SELECT 1 FROM settlement_records WHERE settlement_id = $1",
        )
        .bind(settlement_id)
        .fetch_optional(pool)
        .await?;
        Ok(found.is_some())
    }

    /// Insert within a transaction. Returns `false` when the settlement id
    /// already exists (a concurrent duplicate lost the race), letting the
    /// caller take the duplicate branch instead of failing.
    pub async fn insert_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        record: &SettlementRecord,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO settlement_records
                (settlement_id, account_id, subject, tier_months, cost, chain_ref, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (settlement_id) DO NOTHING
            "#,
        )
        .bind(&record.settlement_id)
        .bind(record.account_id)
        .bind(&record.subject)
        .bind(record.tier_months)
        .bind(record.cost)
        .bind(&record.chain_ref)
        .bind(record.created_at)
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
