//! In-memory implementation of CreatorAccountLedger.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::billing::{AccountTransition, AccountUpdate, CreatorAccountRow, PayoutGrant};
use crate::domain::foundation::{CreatorId, DomainError};
use crate::ports::CreatorAccountLedger;

/// Creator profiles and payout grants held in memory.
#[derive(Default)]
pub struct InMemoryCreatorAccountLedger {
    profiles: RwLock<BTreeMap<CreatorId, CreatorAccountRow>>,
    grants: RwLock<BTreeMap<CreatorId, PayoutGrant>>,
}

impl InMemoryCreatorAccountLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a creator profile, as the onboarding flow would.
    pub async fn insert_profile(&self, row: CreatorAccountRow) {
        self.profiles.write().await.insert(row.creator_id.clone(), row);
    }

    /// Every recorded payout grant.
    pub async fn grants(&self) -> Vec<PayoutGrant> {
        self.grants.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl CreatorAccountLedger for InMemoryCreatorAccountLedger {
    async fn apply_account_update(
        &self,
        update: &AccountUpdate,
    ) -> Result<Option<AccountTransition>, DomainError> {
        let mut profiles = self.profiles.write().await;

        let row = profiles
            .values_mut()
            .find(|row| row.stripe_account_id.as_deref() == Some(update.stripe_account_id.as_str()));

        Ok(row.map(|row| row.apply(update)))
    }

    async fn record_payout_grant(&self, grant: &PayoutGrant) -> Result<bool, DomainError> {
        let mut grants = self.grants.write().await;
        if grants.contains_key(&grant.creator_id) {
            return Ok(false);
        }
        grants.insert(grant.creator_id.clone(), grant.clone());
        Ok(true)
    }

    async fn find_by_creator(
        &self,
        creator_id: &CreatorId,
    ) -> Result<Option<CreatorAccountRow>, DomainError> {
        Ok(self.profiles.read().await.get(creator_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::OnboardingStatus;
    use crate::domain::foundation::Timestamp;

    fn profile() -> CreatorAccountRow {
        CreatorAccountRow {
            creator_id: CreatorId::new("C2").unwrap(),
            stripe_account_id: Some("acct_1".to_string()),
            charges_enabled: false,
            payouts_enabled: false,
            onboarding_status: OnboardingStatus::NotStarted,
        }
    }

    fn update(account: &str, charges: bool, payouts: bool) -> AccountUpdate {
        AccountUpdate {
            stripe_account_id: account.to_string(),
            charges_enabled: charges,
            payouts_enabled: payouts,
            onboarding_status: OnboardingStatus::from_capabilities(charges, payouts),
        }
    }

    #[tokio::test]
    async fn unknown_account_returns_none() {
        let ledger = InMemoryCreatorAccountLedger::new();
        ledger.insert_profile(profile()).await;

        assert!(ledger.apply_account_update(&update("acct_other", true, true)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_reports_transition() {
        let ledger = InMemoryCreatorAccountLedger::new();
        ledger.insert_profile(profile()).await;

        let transition = ledger
            .apply_account_update(&update("acct_1", true, false))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(transition.previous, OnboardingStatus::NotStarted);
        assert_eq!(transition.current, OnboardingStatus::Pending);
    }

    #[tokio::test]
    async fn duplicate_grant_is_ignored() {
        let ledger = InMemoryCreatorAccountLedger::new();
        let grant = PayoutGrant {
            creator_id: CreatorId::new("C2").unwrap(),
            stripe_account_id: "acct_1".to_string(),
            granted_at: Timestamp::now(),
        };

        assert!(ledger.record_payout_grant(&grant).await.unwrap());
        assert!(!ledger.record_payout_grant(&grant).await.unwrap());
        assert_eq!(ledger.grants().await.len(), 1);
    }
}
