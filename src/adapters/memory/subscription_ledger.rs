//! In-memory implementation of SubscriptionLedger.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::billing::{
    SubscriptionCancellation, SubscriptionLedgerRow, SubscriptionUpsert, UpsertOutcome,
};
use crate::domain::foundation::{DomainError, SubscriptionKey};
use crate::ports::SubscriptionLedger;

/// Subscription ledger backed by a map keyed by (fan, creator).
#[derive(Default)]
pub struct InMemorySubscriptionLedger {
    rows: RwLock<BTreeMap<SubscriptionKey, SubscriptionLedgerRow>>,
}

impl InMemorySubscriptionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a row as-is, e.g. an `incomplete` placeholder written at checkout.
    pub async fn seed(&self, row: SubscriptionLedgerRow) {
        self.rows.write().await.insert(row.key.clone(), row);
    }

    /// Snapshot of every row.
    pub async fn rows(&self) -> Vec<SubscriptionLedgerRow> {
        self.rows.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl SubscriptionLedger for InMemorySubscriptionLedger {
    async fn upsert_subscription(
        &self,
        upsert: &SubscriptionUpsert,
    ) -> Result<UpsertOutcome, DomainError> {
        let mut rows = self.rows.write().await;

        let outcome = match rows.get(&upsert.key) {
            None => UpsertOutcome::Inserted,
            Some(existing) if upsert.may_replace(existing) => UpsertOutcome::Updated,
            Some(_) => return Ok(UpsertOutcome::Superseded),
        };

        let merged = upsert.merge_into(rows.get(&upsert.key));
        rows.insert(upsert.key.clone(), merged);
        Ok(outcome)
    }

    async fn cancel_subscription(
        &self,
        cancellation: &SubscriptionCancellation,
    ) -> Result<u64, DomainError> {
        let mut rows = self.rows.write().await;
        let mut changed = 0;

        for row in rows.values_mut() {
            if row.stripe_subscription_id.as_deref() == Some(cancellation.stripe_subscription_id.as_str()) {
                cancellation.apply(row);
                changed += 1;
            }
        }

        Ok(changed)
    }

    async fn find_by_key(
        &self,
        key: &SubscriptionKey,
    ) -> Result<Option<SubscriptionLedgerRow>, DomainError> {
        Ok(self.rows.read().await.get(key).cloned())
    }

    async fn find_by_subscription_id(
        &self,
        subscription_id: &str,
    ) -> Result<Vec<SubscriptionLedgerRow>, DomainError> {
        Ok(self
            .rows
            .read()
            .await
            .values()
            .filter(|row| row.stripe_subscription_id.as_deref() == Some(subscription_id))
            .cloned()
            .collect())
    }
}
