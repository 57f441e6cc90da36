//! ReconcileSubscriptionHandler - Applies subscription snapshots to the ledger.

use std::sync::Arc;

use crate::domain::billing::{
    CorrelationIds, SubscriptionCancellation, SubscriptionSnapshot, SubscriptionUpsert,
    UpsertOutcome, WebhookError,
};
use crate::domain::foundation::Timestamp;
use crate::ports::SubscriptionLedger;

/// Result of reconciling one subscription snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionReconciliation {
    /// Row written (or skipped by the re-subscription guard).
    Applied {
        ids: CorrelationIds,
        outcome: UpsertOutcome,
    },
    /// Snapshot carried no usable fan/creator ids.
    MissingMetadata,
}

/// Handler for the subscription and cancellation ledger paths.
pub struct ReconcileSubscriptionHandler {
    ledger: Arc<dyn SubscriptionLedger>,
}

impl ReconcileSubscriptionHandler {
    pub fn new(ledger: Arc<dyn SubscriptionLedger>) -> Self {
        Self { ledger }
    }

    /// Upserts the row keyed by the snapshot's correlation ids.
    ///
    /// `ids` overrides the snapshot's own metadata when the caller resolved
    /// them elsewhere (e.g. from a checkout session).
    pub async fn reconcile(
        &self,
        snapshot: &SubscriptionSnapshot,
        ids: Option<CorrelationIds>,
        observed_at: Timestamp,
    ) -> Result<SubscriptionReconciliation, WebhookError> {
        let ids = match ids.or_else(|| CorrelationIds::from_metadata(&snapshot.metadata)) {
            Some(ids) => ids,
            None => {
                tracing::warn!(
                    subscription_id = %snapshot.id,
                    "Subscription has no fan_id/creator_id metadata, skipping"
                );
                return Ok(SubscriptionReconciliation::MissingMetadata);
            }
        };

        let upsert = SubscriptionUpsert::from_snapshot(snapshot, ids.clone(), observed_at);
        let outcome = self
            .ledger
            .upsert_subscription(&upsert)
            .await
            .map_err(|e| WebhookError::Ledger(e.to_string()))?;

        if outcome == UpsertOutcome::Superseded {
            tracing::warn!(
                subscription_id = %snapshot.id,
                fan_id = %ids.fan_id,
                creator_id = %ids.creator_id,
                "Ledger row belongs to a newer subscription, snapshot skipped"
            );
        } else {
            tracing::info!(
                subscription_id = %snapshot.id,
                fan_id = %ids.fan_id,
                creator_id = %ids.creator_id,
                status = %upsert.status,
                is_active = upsert.is_active,
                outcome = outcome.as_str(),
                "Subscription reconciled"
            );
        }

        Ok(SubscriptionReconciliation::Applied { ids, outcome })
    }

    /// Cancels every row holding the subscription. Returns rows changed.
    pub async fn cancel(
        &self,
        subscription_id: &str,
        canceled_at: Timestamp,
    ) -> Result<u64, WebhookError> {
        let cancellation = SubscriptionCancellation {
            stripe_subscription_id: subscription_id.to_string(),
            canceled_at,
        };

        let rows = self
            .ledger
            .cancel_subscription(&cancellation)
            .await
            .map_err(|e| WebhookError::Ledger(e.to_string()))?;

        if rows == 0 {
            tracing::warn!(subscription_id = %subscription_id, "No ledger row holds cancelled subscription");
        } else {
            tracing::info!(subscription_id = %subscription_id, rows, "Subscription cancelled");
        }

        Ok(rows)
    }
}
