//! PostgreSQL implementation of SubscriptionLedger.
//!
//! Writes go through a single `INSERT ... ON CONFLICT ... DO UPDATE` so that
//! concurrent deliveries of the same event serialize on the unique key.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::billing::{
    LedgerStatus, SubscriptionCancellation, SubscriptionLedgerRow, SubscriptionUpsert,
    UpsertOutcome,
};
use crate::domain::foundation::{CreatorId, DomainError, FanId, SubscriptionKey, Timestamp};
use crate::ports::SubscriptionLedger;

/// PostgreSQL implementation of the SubscriptionLedger port.
pub struct PostgresSubscriptionLedger {
    pool: PgPool,
}

impl PostgresSubscriptionLedger {
    /// Creates a new ledger over the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Database row representation of `fan_subscriptions`.
#[derive(Debug, sqlx::FromRow)]
struct FanSubscriptionRow {
    fan_id: String,
    creator_id: String,
    status: String,
    is_active: bool,
    current_period_end: Option<DateTime<Utc>>,
    cancel_at_period_end: bool,
    stripe_customer_id: Option<String>,
    stripe_subscription_id: Option<String>,
    plan_id: Option<String>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<FanSubscriptionRow> for SubscriptionLedgerRow {
    type Error = DomainError;

    fn try_from(row: FanSubscriptionRow) -> Result<Self, Self::Error> {
        let fan_id = FanId::new(row.fan_id)
            .map_err(|e| DomainError::database(format!("Invalid fan_id: {}", e)))?;
        let creator_id = CreatorId::new(row.creator_id)
            .map_err(|e| DomainError::database(format!("Invalid creator_id: {}", e)))?;
        let status = LedgerStatus::parse(&row.status)
            .map_err(|e| DomainError::database(format!("Invalid status value: {}", e)))?;

        Ok(SubscriptionLedgerRow {
            key: SubscriptionKey::new(fan_id, creator_id),
            status,
            is_active: row.is_active,
            current_period_end: row.current_period_end.map(Timestamp::from_datetime),
            cancel_at_period_end: row.cancel_at_period_end,
            stripe_customer_id: row.stripe_customer_id,
            stripe_subscription_id: row.stripe_subscription_id,
            plan_id: row.plan_id,
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

/// Maps the `RETURNING (xmax = 0)` result of the upsert to an outcome.
///
/// No row back means the conflict guard rejected the update.
fn outcome_from_returning(inserted: Option<bool>) -> UpsertOutcome {
    match inserted {
        Some(true) => UpsertOutcome::Inserted,
        Some(false) => UpsertOutcome::Updated,
        None => UpsertOutcome::Superseded,
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT fan_id, creator_id, status, is_active, current_period_end,
           cancel_at_period_end, stripe_customer_id, stripe_subscription_id,
           plan_id, updated_at
    FROM fan_subscriptions
"#;

#[async_trait]
impl SubscriptionLedger for PostgresSubscriptionLedger {
    async fn upsert_subscription(
        &self,
        upsert: &SubscriptionUpsert,
    ) -> Result<UpsertOutcome, DomainError> {
        let inserted: Option<bool> = sqlx::query_scalar(
            r#"
            INSERT INTO fan_subscriptions (
                fan_id, creator_id, status, is_active, current_period_end,
                cancel_at_period_end, stripe_customer_id, stripe_subscription_id,
                plan_id, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (fan_id, creator_id) DO UPDATE SET
                status = EXCLUDED.status,
                is_active = EXCLUDED.is_active,
                current_period_end = EXCLUDED.current_period_end,
                cancel_at_period_end = EXCLUDED.cancel_at_period_end,
                stripe_customer_id = COALESCE(EXCLUDED.stripe_customer_id, fan_subscriptions.stripe_customer_id),
                stripe_subscription_id = EXCLUDED.stripe_subscription_id,
                plan_id = COALESCE(EXCLUDED.plan_id, fan_subscriptions.plan_id),
                updated_at = EXCLUDED.updated_at
            WHERE fan_subscriptions.stripe_subscription_id IS NULL
               OR fan_subscriptions.stripe_subscription_id = EXCLUDED.stripe_subscription_id
               OR EXCLUDED.is_active
               OR NOT fan_subscriptions.is_active
            RETURNING (xmax = 0) AS inserted
            "#,
        )
        .bind(upsert.key.fan_id.as_str())
        .bind(upsert.key.creator_id.as_str())
        .bind(upsert.status.as_str())
        .bind(upsert.is_active)
        .bind(upsert.current_period_end.map(|t| *t.as_datetime()))
        .bind(upsert.cancel_at_period_end)
        .bind(&upsert.stripe_customer_id)
        .bind(&upsert.stripe_subscription_id)
        .bind(&upsert.plan_id)
        .bind(upsert.observed_at.as_datetime())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to upsert subscription: {}", e)))?;

        Ok(outcome_from_returning(inserted))
    }

    async fn cancel_subscription(
        &self,
        cancellation: &SubscriptionCancellation,
    ) -> Result<u64, DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE fan_subscriptions SET
                status = $2,
                is_active = FALSE,
                cancel_at_period_end = FALSE,
                updated_at = $3
            WHERE stripe_subscription_id = $1
            "#,
        )
        .bind(&cancellation.stripe_subscription_id)
        .bind(LedgerStatus::Canceled.as_str())
        .bind(cancellation.canceled_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to cancel subscription: {}", e)))?;

        Ok(result.rows_affected())
    }

    async fn find_by_key(
        &self,
        key: &SubscriptionKey,
    ) -> Result<Option<SubscriptionLedgerRow>, DomainError> {
        let row: Option<FanSubscriptionRow> =
            sqlx::query_as(&format!("{} WHERE fan_id = $1 AND creator_id = $2", SELECT_COLUMNS))
                .bind(key.fan_id.as_str())
                .bind(key.creator_id.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| DomainError::database(format!("Failed to fetch subscription: {}", e)))?;

        row.map(SubscriptionLedgerRow::try_from).transpose()
    }

    async fn find_by_subscription_id(
        &self,
        subscription_id: &str,
    ) -> Result<Vec<SubscriptionLedgerRow>, DomainError> {
        let rows: Vec<FanSubscriptionRow> = sqlx::query_as(&format!(
            "{} WHERE stripe_subscription_id = $1 ORDER BY fan_id, creator_id",
            SELECT_COLUMNS
        ))
        .bind(subscription_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to fetch subscriptions: {}", e)))?;

        rows.into_iter().map(SubscriptionLedgerRow::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db_row(status: &str) -> FanSubscriptionRow {
        FanSubscriptionRow {
            fan_id: "F1".to_string(),
            creator_id: "C1".to_string(),
            status: status.to_string(),
            is_active: true,
            current_period_end: DateTime::from_timestamp(1_706_745_600, 0),
            cancel_at_period_end: false,
            stripe_customer_id: Some("cus_1".to_string()),
            stripe_subscription_id: Some("sub_1".to_string()),
            plan_id: None,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn row_converts_to_ledger_row() {
        let row = SubscriptionLedgerRow::try_from(db_row("past_due")).unwrap();

        assert_eq!(row.key.fan_id.as_str(), "F1");
        assert_eq!(row.status, LedgerStatus::PastDue);
        assert_eq!(row.current_period_end.map(|t| t.as_unix_secs()), Some(1_706_745_600));
    }

    #[test]
    fn unknown_status_is_database_error() {
        let err = SubscriptionLedgerRow::try_from(db_row("trialing")).unwrap_err();
        assert!(err.message().contains("Invalid status"));
    }

    #[test]
    fn blank_fan_id_is_rejected() {
        let mut row = db_row("active");
        row.fan_id = "  ".to_string();
        assert!(SubscriptionLedgerRow::try_from(row).is_err());
    }

    #[test]
    fn returning_maps_to_outcome() {
        assert_eq!(outcome_from_returning(Some(true)), UpsertOutcome::Inserted);
        assert_eq!(outcome_from_returning(Some(false)), UpsertOutcome::Updated);
        assert_eq!(outcome_from_returning(None), UpsertOutcome::Superseded);
    }
}
