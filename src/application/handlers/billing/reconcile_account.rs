//! ReconcileAccountHandler - Applies connected-account updates to creator profiles.

use std::sync::Arc;

use crate::domain::billing::{AccountSnapshot, AccountUpdate, OnboardingStatus, PayoutGrant, WebhookError};
use crate::domain::foundation::{CreatorId, Timestamp};
use crate::ports::CreatorAccountLedger;

/// Result of reconciling one account snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountReconciliation {
    Applied {
        creator_id: CreatorId,
        onboarding_status: OnboardingStatus,
        payout_granted: bool,
    },
    /// No creator profile holds the account id.
    UnknownAccount,
}

/// Handler for the account ledger path.
pub struct ReconcileAccountHandler {
    ledger: Arc<dyn CreatorAccountLedger>,
}

impl ReconcileAccountHandler {
    pub fn new(ledger: Arc<dyn CreatorAccountLedger>) -> Self {
        Self { ledger }
    }

    /// Updates the owning profile and grants payouts on first completion.
    ///
    /// A failed grant is logged and does not fail the reconciliation.
    pub async fn reconcile(
        &self,
        account: &AccountSnapshot,
        observed_at: Timestamp,
    ) -> Result<AccountReconciliation, WebhookError> {
        let update = AccountUpdate::from(account);

        let transition = match self
            .ledger
            .apply_account_update(&update)
            .await
            .map_err(|e| WebhookError::Ledger(e.to_string()))?
        {
            Some(transition) => transition,
            None => {
                tracing::warn!(account_id = %account.id, "No creator profile for connected account");
                return Ok(AccountReconciliation::UnknownAccount);
            }
        };

        let mut payout_granted = false;
        if transition.became_complete() {
            let grant = PayoutGrant {
                creator_id: transition.creator_id.clone(),
                stripe_account_id: account.id.clone(),
                granted_at: observed_at,
            };
            match self.ledger.record_payout_grant(&grant).await {
                Ok(written) => payout_granted = written,
                Err(e) => tracing::warn!(
                    account_id = %account.id,
                    creator_id = %transition.creator_id,
                    error = %e,
                    "Failed to record payout grant"
                ),
            }
        }

        tracing::info!(
            account_id = %account.id,
            creator_id = %transition.creator_id,
            previous = %transition.previous,
            onboarding_status = %transition.current,
            payout_granted,
            "Connected account reconciled"
        );

        Ok(AccountReconciliation::Applied {
            creator_id: transition.creator_id,
            onboarding_status: transition.current,
            payout_granted,
        })
    }
}
