//! PostgreSQL implementation of CreatorAccountLedger.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::billing::{
    AccountTransition, AccountUpdate, CreatorAccountRow, OnboardingStatus, PayoutGrant,
};
use crate::domain::foundation::{CreatorId, DomainError};
use crate::ports::CreatorAccountLedger;

/// Creator billing columns and payout grants in PostgreSQL.
pub struct PostgresCreatorAccountLedger {
    pool: PgPool,
}

impl PostgresCreatorAccountLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TransitionRow {
    creator_id: String,
    previous_status: String,
    onboarding_status: String,
}

#[derive(Debug, sqlx::FromRow)]
struct CreatorProfileRow {
    creator_id: String,
    stripe_account_id: Option<String>,
    charges_enabled: bool,
    payouts_enabled: bool,
    onboarding_status: String,
}

fn creator_id(raw: String) -> Result<CreatorId, DomainError> {
    CreatorId::new(raw).map_err(|e| DomainError::database(format!("Invalid creator_id: {}", e)))
}

fn onboarding_status(raw: &str) -> Result<OnboardingStatus, DomainError> {
    OnboardingStatus::parse(raw)
        .map_err(|e| DomainError::database(format!("Invalid onboarding_status: {}", e)))
}

impl TryFrom<TransitionRow> for AccountTransition {
    type Error = DomainError;

    fn try_from(row: TransitionRow) -> Result<Self, Self::Error> {
        Ok(AccountTransition {
            creator_id: creator_id(row.creator_id)?,
            previous: onboarding_status(&row.previous_status)?,
            current: onboarding_status(&row.onboarding_status)?,
        })
    }
}

impl TryFrom<CreatorProfileRow> for CreatorAccountRow {
    type Error = DomainError;

    fn try_from(row: CreatorProfileRow) -> Result<Self, Self::Error> {
        Ok(CreatorAccountRow {
            creator_id: creator_id(row.creator_id)?,
            stripe_account_id: row.stripe_account_id,
            charges_enabled: row.charges_enabled,
            payouts_enabled: row.payouts_enabled,
            onboarding_status: onboarding_status(&row.onboarding_status)?,
        })
    }
}

#[async_trait]
impl CreatorAccountLedger for PostgresCreatorAccountLedger {
    async fn apply_account_update(
        &self,
        update: &AccountUpdate,
    ) -> Result<Option<AccountTransition>, DomainError> {
        // The CTE locks the profile so the previous status is read and replaced atomically.
        let row: Option<TransitionRow> = sqlx::query_as(
            r#"
            WITH previous AS (
                SELECT creator_id, onboarding_status
                FROM creator_profiles
                WHERE stripe_account_id = $1
                FOR UPDATE
            )
            UPDATE creator_profiles AS p SET
                charges_enabled = $2,
                payouts_enabled = $3,
                onboarding_status = $4,
                billing_updated_at = NOW()
            FROM previous
            WHERE p.creator_id = previous.creator_id
            RETURNING p.creator_id,
                      previous.onboarding_status AS previous_status,
                      p.onboarding_status
            "#,
        )
        .bind(&update.stripe_account_id)
        .bind(update.charges_enabled)
        .bind(update.payouts_enabled)
        .bind(update.onboarding_status.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to update creator account: {}", e)))?;

        row.map(AccountTransition::try_from).transpose()
    }

    async fn record_payout_grant(&self, grant: &PayoutGrant) -> Result<bool, DomainError> {
        let result = sqlx::query(
            r#"
            INSERT INTO payout_grants (creator_id, stripe_account_id, granted_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (creator_id) DO NOTHING
            "#,
        )
        .bind(grant.creator_id.as_str())
        .bind(&grant.stripe_account_id)
        .bind(grant.granted_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to record payout grant: {}", e)))?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_by_creator(
        &self,
        creator_id: &CreatorId,
    ) -> Result<Option<CreatorAccountRow>, DomainError> {
        let row: Option<CreatorProfileRow> = sqlx::query_as(
            r#"
            SELECT creator_id, stripe_account_id, charges_enabled, payouts_enabled, onboarding_status
            FROM creator_profiles
            WHERE creator_id = $1
            "#,
        )
        .bind(creator_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to fetch creator profile: {}", e)))?;

        row.map(CreatorAccountRow::try_from).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_row_converts() {
        let transition = AccountTransition::try_from(TransitionRow {
            creator_id: "C2".to_string(),
            previous_status: "pending".to_string(),
            onboarding_status: "complete".to_string(),
        })
        .unwrap();

        assert!(transition.became_complete());
    }

    #[test]
    fn invalid_onboarding_status_is_rejected() {
        let result = CreatorAccountRow::try_from(CreatorProfileRow {
            creator_id: "C2".to_string(),
            stripe_account_id: None,
            charges_enabled: false,
            payouts_enabled: false,
            onboarding_status: "restricted".to_string(),
        });

        assert!(result.is_err());
    }
}
