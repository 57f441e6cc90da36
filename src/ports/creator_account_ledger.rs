//! Creator account ledger port.
//!
//! Connected-account columns live on the creator profile, which is created
//! elsewhere. This port only locates a profile by its connected-account id
//! and updates the billing columns, plus the payout grant side table.

use crate::domain::billing::{AccountTransition, AccountUpdate, CreatorAccountRow, PayoutGrant};
use crate::domain::foundation::{CreatorId, DomainError};
use async_trait::async_trait;

/// Repository port for creator billing columns and payout grants.
#[async_trait]
pub trait CreatorAccountLedger: Send + Sync {
    /// Atomically update the profile owning `update.stripe_account_id`.
    ///
    /// Returns the onboarding status before and after the update, or `None`
    /// when no profile holds the account id.
    async fn apply_account_update(
        &self,
        update: &AccountUpdate,
    ) -> Result<Option<AccountTransition>, DomainError>;

    /// Record a payout grant. A second grant for the same creator is ignored.
    ///
    /// Returns true when a new grant was written.
    async fn record_payout_grant(&self, grant: &PayoutGrant) -> Result<bool, DomainError>;

    /// Read the billing columns of a creator profile.
    async fn find_by_creator(
        &self,
        creator_id: &CreatorId,
    ) -> Result<Option<CreatorAccountRow>, DomainError>;
}
