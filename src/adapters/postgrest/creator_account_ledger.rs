//! PostgREST implementation of CreatorAccountLedger.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};

use super::client::{eq, PostgrestClient};
use crate::domain::billing::{
    AccountTransition, AccountUpdate, CreatorAccountRow, OnboardingStatus, PayoutGrant,
};
use crate::domain::foundation::{CreatorId, DomainError};
use crate::ports::CreatorAccountLedger;

const PROFILES: &str = "creator_profiles";
const GRANTS: &str = "payout_grants";
const PROFILE_COLUMNS: &str =
    "creator_id,stripe_account_id,charges_enabled,payouts_enabled,onboarding_status";

pub struct PostgrestCreatorAccountLedger {
    client: PostgrestClient,
}

impl PostgrestCreatorAccountLedger {
    pub fn new(client: PostgrestClient) -> Self {
        Self { client }
    }

    async fn find_by_account(&self, account_id: &str) -> Result<Option<CreatorAccountRow>, DomainError> {
        let records: Vec<CreatorProfileRecord> = self
            .client
            .rows(self.client.request(Method::GET, PROFILES).query(&[
                ("select", PROFILE_COLUMNS.to_string()),
                ("stripe_account_id", eq(account_id)),
            ]))
            .await?;

        records.into_iter().next().map(CreatorAccountRow::try_from).transpose()
    }
}

#[derive(Debug, Deserialize)]
struct CreatorProfileRecord {
    creator_id: String,
    stripe_account_id: Option<String>,
    charges_enabled: bool,
    payouts_enabled: bool,
    onboarding_status: String,
}

impl TryFrom<CreatorProfileRecord> for CreatorAccountRow {
    type Error = DomainError;

    fn try_from(record: CreatorProfileRecord) -> Result<Self, Self::Error> {
        Ok(CreatorAccountRow {
            creator_id: CreatorId::new(record.creator_id)
                .map_err(|e| DomainError::database(format!("Invalid creator_id: {}", e)))?,
            stripe_account_id: record.stripe_account_id,
            charges_enabled: record.charges_enabled,
            payouts_enabled: record.payouts_enabled,
            onboarding_status: OnboardingStatus::parse(&record.onboarding_status)
                .map_err(|e| DomainError::database(format!("Invalid onboarding_status: {}", e)))?,
        })
    }
}

#[derive(Debug, Serialize)]
struct AccountPatch {
    charges_enabled: bool,
    payouts_enabled: bool,
    onboarding_status: &'static str,
    billing_updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct GrantBody<'a> {
    creator_id: &'a str,
    stripe_account_id: &'a str,
    granted_at: DateTime<Utc>,
}

#[async_trait]
impl CreatorAccountLedger for PostgrestCreatorAccountLedger {
    async fn apply_account_update(
        &self,
        update: &AccountUpdate,
    ) -> Result<Option<AccountTransition>, DomainError> {
        // The REST store cannot return the pre-update value, so the previous
        // status is read first. A racing reader can at worst attempt a second
        // grant, which the grant insert ignores.
        let mut profile = match self.find_by_account(&update.stripe_account_id).await? {
            Some(profile) => profile,
            None => return Ok(None),
        };

        let body = AccountPatch {
            charges_enabled: update.charges_enabled,
            payouts_enabled: update.payouts_enabled,
            onboarding_status: update.onboarding_status.as_str(),
            billing_updated_at: Utc::now(),
        };

        let updated: Vec<serde_json::Value> = self
            .client
            .rows(
                self.client
                    .request(Method::PATCH, PROFILES)
                    .query(&[("creator_id", eq(profile.creator_id.as_str()))])
                    .header("Prefer", "return=representation")
                    .json(&body),
            )
            .await?;

        if updated.is_empty() {
            return Ok(None);
        }

        Ok(Some(profile.apply(update)))
    }

    async fn record_payout_grant(&self, grant: &PayoutGrant) -> Result<bool, DomainError> {
        let body = GrantBody {
            creator_id: grant.creator_id.as_str(),
            stripe_account_id: &grant.stripe_account_id,
            granted_at: *grant.granted_at.as_datetime(),
        };

        let inserted: Vec<serde_json::Value> = self
            .client
            .rows(
                self.client
                    .request(Method::POST, GRANTS)
                    .query(&[("on_conflict", "creator_id")])
                    .header("Prefer", "resolution=ignore-duplicates,return=representation")
                    .json(&[body]),
            )
            .await?;

        Ok(!inserted.is_empty())
    }

    async fn find_by_creator(
        &self,
        creator_id: &CreatorId,
    ) -> Result<Option<CreatorAccountRow>, DomainError> {
        let records: Vec<CreatorProfileRecord> = self
            .client
            .rows(self.client.request(Method::GET, PROFILES).query(&[
                ("select", PROFILE_COLUMNS.to_string()),
                ("creator_id", eq(creator_id.as_str())),
            ]))
            .await?;

        records.into_iter().next().map(CreatorAccountRow::try_from).transpose()
    }
}
