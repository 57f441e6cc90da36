//! PostgREST implementation of SubscriptionLedger.
//!
//! An upsert is two single-statement requests against `fan_subscriptions`:
//! an insert that ignores duplicates on `(fan_id, creator_id)`, then a PATCH
//! whose filter carries the re-subscription guard. Neither request reads
//! before it writes, so concurrent deliveries serialize in Postgres.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};

use super::client::{eq, PostgrestClient};
use crate::domain::billing::{
    LedgerStatus, SubscriptionCancellation, SubscriptionLedgerRow, SubscriptionUpsert,
    UpsertOutcome,
};
use crate::domain::foundation::{CreatorId, DomainError, FanId, SubscriptionKey, Timestamp};
use crate::ports::SubscriptionLedger;

const TABLE: &str = "fan_subscriptions";
const CONFLICT_TARGET: &str = "fan_id,creator_id";

pub struct PostgrestSubscriptionLedger {
    client: PostgrestClient,
}

impl PostgrestSubscriptionLedger {
    pub fn new(client: PostgrestClient) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
struct FanSubscriptionRecord {
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

impl TryFrom<FanSubscriptionRecord> for SubscriptionLedgerRow {
    type Error = DomainError;

    fn try_from(record: FanSubscriptionRecord) -> Result<Self, Self::Error> {
        let fan_id = FanId::new(record.fan_id)
            .map_err(|e| DomainError::database(format!("Invalid fan_id: {}", e)))?;
        let creator_id = CreatorId::new(record.creator_id)
            .map_err(|e| DomainError::database(format!("Invalid creator_id: {}", e)))?;
        let status = LedgerStatus::parse(&record.status)
            .map_err(|e| DomainError::database(format!("Invalid status value: {}", e)))?;

        Ok(SubscriptionLedgerRow {
            key: SubscriptionKey::new(fan_id, creator_id),
            status,
            is_active: record.is_active,
            current_period_end: record.current_period_end.map(Timestamp::from_datetime),
            cancel_at_period_end: record.cancel_at_period_end,
            stripe_customer_id: record.stripe_customer_id,
            stripe_subscription_id: record.stripe_subscription_id,
            plan_id: record.plan_id,
            updated_at: Timestamp::from_datetime(record.updated_at),
        })
    }
}

/// Billing fields written on every upsert. Absent optional ids are omitted,
/// which leaves the stored value in place on PATCH.
#[derive(Debug, Serialize)]
struct BillingFields<'a> {
    status: &'static str,
    is_active: bool,
    current_period_end: Option<DateTime<Utc>>,
    cancel_at_period_end: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stripe_customer_id: Option<&'a str>,
    stripe_subscription_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    plan_id: Option<&'a str>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct InsertBody<'a> {
    fan_id: &'a str,
    creator_id: &'a str,
    #[serde(flatten)]
    fields: BillingFields<'a>,
}

impl<'a> From<&'a SubscriptionUpsert> for BillingFields<'a> {
    fn from(upsert: &'a SubscriptionUpsert) -> Self {
        Self {
            status: upsert.status.as_str(),
            is_active: upsert.is_active,
            current_period_end: upsert.current_period_end.map(|t| *t.as_datetime()),
            cancel_at_period_end: upsert.cancel_at_period_end,
            stripe_customer_id: upsert.stripe_customer_id.as_deref(),
            stripe_subscription_id: &upsert.stripe_subscription_id,
            plan_id: upsert.plan_id.as_deref(),
            updated_at: *upsert.observed_at.as_datetime(),
        }
    }
}

/// PostgREST `or=` filter for the re-subscription guard, or `None` when the
/// incoming snapshot grants access and may always replace the row.
fn guard_filter(upsert: &SubscriptionUpsert) -> Option<String> {
    if upsert.is_active {
        return None;
    }
    Some(format!(
        "(stripe_subscription_id.is.null,stripe_subscription_id.eq.\"{}\",is_active.is.false)",
        upsert.stripe_subscription_id
    ))
}

#[derive(Debug, Serialize)]
struct CancelBody {
    status: &'static str,
    is_active: bool,
    cancel_at_period_end: bool,
    updated_at: DateTime<Utc>,
}

#[async_trait]
impl SubscriptionLedger for PostgrestSubscriptionLedger {
    async fn upsert_subscription(
        &self,
        upsert: &SubscriptionUpsert,
    ) -> Result<UpsertOutcome, DomainError> {
        let body = InsertBody {
            fan_id: upsert.key.fan_id.as_str(),
            creator_id: upsert.key.creator_id.as_str(),
            fields: BillingFields::from(upsert),
        };

        let inserted: Vec<serde_json::Value> = self
            .client
            .rows(
                self.client
                    .request(Method::POST, TABLE)
                    .query(&[("on_conflict", CONFLICT_TARGET)])
                    .header("Prefer", "resolution=ignore-duplicates,return=representation")
                    .json(&[&body]),
            )
            .await?;

        if !inserted.is_empty() {
            return Ok(UpsertOutcome::Inserted);
        }

        let mut query = vec![
            ("fan_id", eq(upsert.key.fan_id.as_str())),
            ("creator_id", eq(upsert.key.creator_id.as_str())),
        ];
        if let Some(guard) = guard_filter(upsert) {
            query.push(("or", guard));
        }

        let updated: Vec<serde_json::Value> = self
            .client
            .rows(
                self.client
                    .request(Method::PATCH, TABLE)
                    .query(&query)
                    .header("Prefer", "return=representation")
                    .json(&body.fields),
            )
            .await?;

        Ok(if updated.is_empty() {
            UpsertOutcome::Superseded
        } else {
            UpsertOutcome::Updated
        })
    }

    async fn cancel_subscription(
        &self,
        cancellation: &SubscriptionCancellation,
    ) -> Result<u64, DomainError> {
        let body = CancelBody {
            status: LedgerStatus::Canceled.as_str(),
            is_active: false,
            cancel_at_period_end: false,
            updated_at: *cancellation.canceled_at.as_datetime(),
        };

        let rows: Vec<serde_json::Value> = self
            .client
            .rows(
                self.client
                    .request(Method::PATCH, TABLE)
                    .query(&[("stripe_subscription_id", eq(&cancellation.stripe_subscription_id))])
                    .header("Prefer", "return=representation")
                    .json(&body),
            )
            .await?;

        Ok(rows.len() as u64)
    }

    async fn find_by_key(
        &self,
        key: &SubscriptionKey,
    ) -> Result<Option<SubscriptionLedgerRow>, DomainError> {
        let records: Vec<FanSubscriptionRecord> = self
            .client
            .rows(self.client.request(Method::GET, TABLE).query(&[
                ("fan_id", eq(key.fan_id.as_str())),
                ("creator_id", eq(key.creator_id.as_str())),
            ]))
            .await?;

        records
            .into_iter()
            .next()
            .map(SubscriptionLedgerRow::try_from)
            .transpose()
    }

    async fn find_by_subscription_id(
        &self,
        subscription_id: &str,
    ) -> Result<Vec<SubscriptionLedgerRow>, DomainError> {
        let records: Vec<FanSubscriptionRecord> = self
            .client
            .rows(self.client.request(Method::GET, TABLE).query(&[
                ("stripe_subscription_id", eq(subscription_id)),
                ("order", "fan_id,creator_id".to_string()),
            ]))
            .await?;

        records.into_iter().map(SubscriptionLedgerRow::try_from).collect()
    }
}
