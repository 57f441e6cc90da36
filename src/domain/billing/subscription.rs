//! Subscription ledger rows and the upsert that maintains them.

use serde::{Deserialize, Serialize};

use super::provider_event::{CorrelationIds, SubscriptionSnapshot};
use super::status::{derive_entitlement, LedgerStatus};
use crate::domain::foundation::{SubscriptionKey, Timestamp};

/// One row per (fan, creator) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionLedgerRow {
    pub key: SubscriptionKey,
    pub status: LedgerStatus,
    pub is_active: bool,
    pub current_period_end: Option<Timestamp>,
    pub cancel_at_period_end: bool,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub plan_id: Option<String>,
    pub updated_at: Timestamp,
}

/// Values merged into the ledger row keyed by `key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionUpsert {
    pub key: SubscriptionKey,
    pub status: LedgerStatus,
    pub is_active: bool,
    pub current_period_end: Option<Timestamp>,
    pub cancel_at_period_end: bool,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: String,
    pub plan_id: Option<String>,
    /// Instant the snapshot describes; also stored as `updated_at`.
    pub observed_at: Timestamp,
}

impl SubscriptionUpsert {
    /// Builds the upsert for a snapshot observed at `observed_at`.
    pub fn from_snapshot(
        snapshot: &SubscriptionSnapshot,
        ids: CorrelationIds,
        observed_at: Timestamp,
    ) -> Self {
        let entitlement = derive_entitlement(
            &snapshot.status,
            snapshot.cancel_at_period_end,
            snapshot.current_period_end,
            observed_at,
        );

        Self {
            key: SubscriptionKey::new(ids.fan_id, ids.creator_id),
            status: entitlement.status,
            is_active: entitlement.is_active,
            current_period_end: snapshot.current_period_end,
            cancel_at_period_end: snapshot.cancel_at_period_end,
            stripe_customer_id: snapshot.customer_id.clone(),
            stripe_subscription_id: snapshot.id.clone(),
            plan_id: ids.plan_id,
            observed_at,
        }
    }

    /// Whether this upsert may overwrite `existing`.
    ///
    /// A row tied to one subscription only moves to another subscription when
    /// the incoming one grants access or the stored one no longer does. This
    /// keeps a late event for a replaced subscription from revoking access.
    pub fn may_replace(&self, existing: &SubscriptionLedgerRow) -> bool {
        match &existing.stripe_subscription_id {
            None => true,
            Some(current) if *current == self.stripe_subscription_id => true,
            Some(_) => self.is_active || !existing.is_active,
        }
    }

    /// The row after merging into `existing` (or inserting, when `None`).
    pub fn merge_into(&self, existing: Option<&SubscriptionLedgerRow>) -> SubscriptionLedgerRow {
        let stripe_customer_id = self
            .stripe_customer_id
            .clone()
            .or_else(|| existing.and_then(|row| row.stripe_customer_id.clone()));
        let plan_id = self
            .plan_id
            .clone()
            .or_else(|| existing.and_then(|row| row.plan_id.clone()));

        SubscriptionLedgerRow {
            key: self.key.clone(),
            status: self.status,
            is_active: self.is_active,
            current_period_end: self.current_period_end,
            cancel_at_period_end: self.cancel_at_period_end,
            stripe_customer_id,
            stripe_subscription_id: Some(self.stripe_subscription_id.clone()),
            plan_id,
            updated_at: self.observed_at,
        }
    }
}

/// Result of an upsert against the subscription ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    /// Skipped: the row belongs to a newer subscription that still grants access.
    Superseded,
}

impl UpsertOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpsertOutcome::Inserted => "inserted",
            UpsertOutcome::Updated => "updated",
            UpsertOutcome::Superseded => "superseded",
        }
    }
}

/// Values applied to every row holding a cancelled subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionCancellation {
    pub stripe_subscription_id: String,
    pub canceled_at: Timestamp,
}

impl SubscriptionCancellation {
    /// Applies the cancellation to a row.
    pub fn apply(&self, row: &mut SubscriptionLedgerRow) {
        row.status = LedgerStatus::Canceled;
        row.is_active = false;
        row.cancel_at_period_end = false;
        row.updated_at = self.canceled_at;
    }
}
