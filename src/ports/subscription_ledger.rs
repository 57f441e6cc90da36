//! Subscription ledger port.
//!
//! Defines the contract for the `fan_subscriptions` store. Writes must be
//! atomic per call: implementations resolve duplicate and concurrent
//! deliveries with the store's own conflict handling rather than a read
//! followed by a write.

use crate::domain::billing::{
    SubscriptionCancellation, SubscriptionLedgerRow, SubscriptionUpsert, UpsertOutcome,
};
use crate::domain::foundation::{DomainError, SubscriptionKey};
use async_trait::async_trait;

/// Repository port for subscription ledger rows.
#[async_trait]
pub trait SubscriptionLedger: Send + Sync {
    /// Insert or merge the row keyed by `(fan_id, creator_id)`.
    ///
    /// A customer or plan id missing from `upsert` keeps the stored value.
    /// Returns `Superseded` without writing when the stored row belongs to a
    /// different subscription and the write would only revoke access.
    ///
    /// # Errors
    ///
    /// - `DatabaseError` on persistence failure
    async fn upsert_subscription(
        &self,
        upsert: &SubscriptionUpsert,
    ) -> Result<UpsertOutcome, DomainError>;

    /// Mark every row holding the subscription as cancelled.
    ///
    /// Returns the number of rows changed; zero is not an error.
    async fn cancel_subscription(
        &self,
        cancellation: &SubscriptionCancellation,
    ) -> Result<u64, DomainError>;

    /// Find the row for a fan/creator pair.
    async fn find_by_key(
        &self,
        key: &SubscriptionKey,
    ) -> Result<Option<SubscriptionLedgerRow>, DomainError>;

    /// Find rows holding a provider subscription id.
    async fn find_by_subscription_id(
        &self,
        subscription_id: &str,
    ) -> Result<Vec<SubscriptionLedgerRow>, DomainError>;
}
