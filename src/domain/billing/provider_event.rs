//! Payment provider event envelope and its normalization.
//!
//! Only fields relevant to reconciliation are captured. Parsing tolerates the
//! provider's API-version drift:
//! - `customer` / `subscription` references may be an id or an expanded object
//! - subscription `current_period_end` may live on the first subscription item
//! - invoice subscription id may live under `parent.subscription_details`
//! - `api_version` and `livemode` may be absent

use serde::Deserialize;
use std::collections::BTreeMap;

use super::webhook_errors::WebhookError;
use crate::domain::foundation::{CreatorId, FanId, Timestamp};

/// Arbitrary string pairs attached to provider objects.
pub type Metadata = BTreeMap<String, String>;

/// Metadata key carrying the fan identifier.
pub const FAN_ID_KEY: &str = "fan_id";
/// Metadata key carrying the creator identifier.
pub const CREATOR_ID_KEY: &str = "creator_id";
/// Metadata key carrying the optional plan identifier.
pub const PLAN_ID_KEY: &str = "plan_id";

// ════════════════════════════════════════════════════════════════════════════════
// Envelope
// ════════════════════════════════════════════════════════════════════════════════

/// Provider webhook event as received.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderEvent {
    /// Unique identifier for the event (evt_xxx format).
    pub id: String,

    /// Type of event (e.g., "checkout.session.completed").
    #[serde(rename = "type")]
    pub event_type: String,

    /// Time at which the event was created (Unix timestamp).
    pub created: i64,

    /// Object containing event-specific data.
    pub data: ProviderEventData,

    #[serde(default)]
    pub livemode: bool,

    #[serde(default)]
    pub api_version: Option<String>,
}

/// Container for event-specific data.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderEventData {
    /// The object that triggered the event (shape depends on the event type).
    pub object: serde_json::Value,
}

/// Event types the reconciler acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    CheckoutSessionCompleted,
    SubscriptionCreated,
    SubscriptionUpdated,
    SubscriptionDeleted,
    InvoicePaid,
    AccountUpdated,
    Other,
}

impl EventKind {
    /// Parse event type from string.
    pub fn from_type(s: &str) -> Self {
        match s {
            "checkout.session.completed" => Self::CheckoutSessionCompleted,
            "customer.subscription.created" => Self::SubscriptionCreated,
            "customer.subscription.updated" => Self::SubscriptionUpdated,
            "customer.subscription.deleted" => Self::SubscriptionDeleted,
            "invoice.paid" | "invoice.payment_succeeded" => Self::InvoicePaid,
            "account.updated" => Self::AccountUpdated,
            _ => Self::Other,
        }
    }
}

/// A verified event reduced to what the reconciler needs.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedEvent {
    pub id: String,
    pub event_type: String,
    pub created: Timestamp,
    pub livemode: bool,
    pub api_version: Option<String>,
    pub event: BillingEvent,
}

/// Closed set of events the dispatcher routes on.
#[derive(Debug, Clone, PartialEq)]
pub enum BillingEvent {
    CheckoutCompleted(CheckoutSession),
    SubscriptionCreated(SubscriptionSnapshot),
    SubscriptionUpdated(SubscriptionSnapshot),
    SubscriptionDeleted(SubscriptionSnapshot),
    InvoicePaid(InvoiceRef),
    AccountUpdated(AccountSnapshot),
    Ignored { event_type: String },
}

impl NormalizedEvent {
    /// Parses and normalizes a raw event body.
    ///
    /// # Errors
    ///
    /// `ParseError` if the body is not a valid envelope, or if the subject of
    /// a known event type cannot be read. Unknown event types are not errors.
    pub fn from_slice(payload: &[u8]) -> Result<Self, WebhookError> {
        let event: ProviderEvent = serde_json::from_slice(payload)
            .map_err(|e| WebhookError::ParseError(e.to_string()))?;
        event.normalize()
    }
}

impl ProviderEvent {
    /// Converts the envelope into a `NormalizedEvent`.
    pub fn normalize(self) -> Result<NormalizedEvent, WebhookError> {
        let created = Timestamp::from_unix_secs(self.created).ok_or_else(|| {
            WebhookError::ParseError(format!("created out of range: {}", self.created))
        })?;

        let object = self.data.object;
        let event = match EventKind::from_type(&self.event_type) {
            EventKind::CheckoutSessionCompleted => BillingEvent::CheckoutCompleted(subject(object)?),
            EventKind::SubscriptionCreated => BillingEvent::SubscriptionCreated(subject(object)?),
            EventKind::SubscriptionUpdated => BillingEvent::SubscriptionUpdated(subject(object)?),
            EventKind::SubscriptionDeleted => BillingEvent::SubscriptionDeleted(subject(object)?),
            EventKind::InvoicePaid => BillingEvent::InvoicePaid(subject(object)?),
            EventKind::AccountUpdated => BillingEvent::AccountUpdated(subject(object)?),
            EventKind::Other => BillingEvent::Ignored {
                event_type: self.event_type.clone(),
            },
        };

        Ok(NormalizedEvent {
            id: self.id,
            event_type: self.event_type,
            created,
            livemode: self.livemode,
            api_version: self.api_version,
            event,
        })
    }
}

fn subject<T: serde::de::DeserializeOwned>(object: serde_json::Value) -> Result<T, WebhookError> {
    serde_json::from_value(object).map_err(|e| WebhookError::ParseError(e.to_string()))
}

// ════════════════════════════════════════════════════════════════════════════════
// Correlation
// ════════════════════════════════════════════════════════════════════════════════

/// Identifiers keying a subscription ledger row, carried in metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationIds {
    pub fan_id: FanId,
    pub creator_id: CreatorId,
    pub plan_id: Option<String>,
}

impl CorrelationIds {
    /// Reads correlation ids from a single metadata map.
    pub fn from_metadata(metadata: &Metadata) -> Option<Self> {
        Self::resolve(metadata, &Metadata::new())
    }

    /// Reads each key from `primary`, falling back to `fallback`.
    ///
    /// Returns `None` unless both fan and creator ids are found.
    pub fn resolve(primary: &Metadata, fallback: &Metadata) -> Option<Self> {
        let lookup = |key: &str| {
            primary
                .get(key)
                .filter(|v| !v.trim().is_empty())
                .or_else(|| fallback.get(key).filter(|v| !v.trim().is_empty()))
                .cloned()
        };

        Some(Self {
            fan_id: FanId::new(lookup(FAN_ID_KEY)?).ok()?,
            creator_id: CreatorId::new(lookup(CREATOR_ID_KEY)?).ok()?,
            plan_id: lookup(PLAN_ID_KEY),
        })
    }

    /// Entries of these ids that `existing` lacks.
    pub fn missing_from(&self, existing: &Metadata) -> Metadata {
        let mut wanted = vec![
            (FAN_ID_KEY, self.fan_id.as_str().to_string()),
            (CREATOR_ID_KEY, self.creator_id.as_str().to_string()),
        ];
        if let Some(plan_id) = &self.plan_id {
            wanted.push((PLAN_ID_KEY, plan_id.clone()));
        }

        wanted
            .into_iter()
            .filter(|(key, _)| existing.get(*key).map_or(true, |v| v.trim().is_empty()))
            .map(|(key, value)| (key.to_string(), value))
            .collect()
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Subjects
// ════════════════════════════════════════════════════════════════════════════════

/// Provider subscription as observed in an event or a re-fetch.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawSubscription")]
pub struct SubscriptionSnapshot {
    pub id: String,
    pub customer_id: Option<String>,
    /// Provider-side status string, unmapped.
    pub status: String,
    pub current_period_end: Option<Timestamp>,
    pub cancel_at_period_end: bool,
    pub metadata: Metadata,
}

/// Completed checkout session.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "RawCheckoutSession")]
pub struct CheckoutSession {
    pub id: String,
    pub mode: Option<String>,
    pub subscription_id: Option<String>,
    pub customer_id: Option<String>,
    pub metadata: Metadata,
}

impl CheckoutSession {
    /// Only subscription checkouts feed the ledger.
    pub fn is_subscription_mode(&self) -> bool {
        self.mode.as_deref() == Some("subscription")
    }
}

/// Paid invoice, reduced to the subscription it belongs to.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "RawInvoice")]
pub struct InvoiceRef {
    pub id: String,
    pub subscription_id: Option<String>,
}

/// Connected account capabilities.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "RawAccount")]
pub struct AccountSnapshot {
    pub id: String,
    pub charges_enabled: bool,
    pub payouts_enabled: bool,
}

// ════════════════════════════════════════════════════════════════════════════════
// Wire Shapes
// ════════════════════════════════════════════════════════════════════════════════

/// Reference that may arrive as a bare id or as an expanded object.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Expandable {
    Id(String),
    Object { id: String },
}

impl Expandable {
    fn into_id(self) -> String {
        match self {
            Expandable::Id(id) | Expandable::Object { id } => id,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawSubscription {
    id: String,
    status: String,
    #[serde(default)]
    customer: Option<Expandable>,
    #[serde(default)]
    current_period_end: Option<i64>,
    #[serde(default)]
    cancel_at_period_end: Option<bool>,
    #[serde(default)]
    metadata: Option<Metadata>,
    #[serde(default)]
    items: Option<RawList<RawSubscriptionItem>>,
}

#[derive(Debug, Deserialize)]
struct RawList<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct RawSubscriptionItem {
    #[serde(default)]
    current_period_end: Option<i64>,
}

impl TryFrom<RawSubscription> for SubscriptionSnapshot {
    type Error = String;

    fn try_from(raw: RawSubscription) -> Result<Self, Self::Error> {
        let period_end_secs = raw.current_period_end.or_else(|| {
            raw.items
                .as_ref()
                .and_then(|items| items.data.first())
                .and_then(|item| item.current_period_end)
        });
        let current_period_end = match period_end_secs {
            Some(secs) => Some(
                Timestamp::from_unix_secs(secs)
                    .ok_or_else(|| format!("current_period_end out of range: {}", secs))?,
            ),
            None => None,
        };

        Ok(Self {
            id: raw.id,
            customer_id: raw.customer.map(Expandable::into_id),
            status: raw.status,
            current_period_end,
            cancel_at_period_end: raw.cancel_at_period_end.unwrap_or(false),
            metadata: raw.metadata.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct RawCheckoutSession {
    id: String,
    #[serde(default)]
    mode: Option<String>,
    #[serde(default)]
    subscription: Option<Expandable>,
    #[serde(default)]
    customer: Option<Expandable>,
    #[serde(default)]
    metadata: Option<Metadata>,
}

impl From<RawCheckoutSession> for CheckoutSession {
    fn from(raw: RawCheckoutSession) -> Self {
        Self {
            id: raw.id,
            mode: raw.mode,
            subscription_id: raw.subscription.map(Expandable::into_id),
            customer_id: raw.customer.map(Expandable::into_id),
            metadata: raw.metadata.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawInvoice {
    id: String,
    #[serde(default)]
    subscription: Option<Expandable>,
    #[serde(default)]
    parent: Option<RawInvoiceParent>,
}

#[derive(Debug, Deserialize)]
struct RawInvoiceParent {
    #[serde(default)]
    subscription_details: Option<RawSubscriptionDetails>,
}

#[derive(Debug, Deserialize)]
struct RawSubscriptionDetails {
    #[serde(default)]
    subscription: Option<Expandable>,
}

impl From<RawInvoice> for InvoiceRef {
    fn from(raw: RawInvoice) -> Self {
        let subscription = raw.subscription.or_else(|| {
            raw.parent
                .and_then(|p| p.subscription_details)
                .and_then(|d| d.subscription)
        });

        Self {
            id: raw.id,
            subscription_id: subscription.map(Expandable::into_id),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawAccount {
    id: String,
    #[serde(default)]
    charges_enabled: Option<bool>,
    #[serde(default)]
    payouts_enabled: Option<bool>,
}

impl From<RawAccount> for AccountSnapshot {
    fn from(raw: RawAccount) -> Self {
        Self {
            id: raw.id,
            charges_enabled: raw.charges_enabled.unwrap_or(false),
            payouts_enabled: raw.payouts_enabled.unwrap_or(false),
        }
    }
}

/// Builder for creating test event bodies.
#[cfg(test)]
pub struct ProviderEventBuilder {
    id: String,
    event_type: String,
    created: i64,
    object: serde_json::Value,
    livemode: bool,
}

#[cfg(test)]
impl ProviderEventBuilder {
    pub fn new(event_type: impl Into<String>, object: serde_json::Value) -> Self {
        Self {
            id: "evt_test_123".to_string(),
            event_type: event_type.into(),
            created: 1_704_067_200,
            object,
            livemode: false,
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn created(mut self, created: i64) -> Self {
        self.created = created;
        self
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "id": self.id,
            "type": self.event_type,
            "created": self.created,
            "data": { "object": self.object },
            "livemode": self.livemode,
        }))
        .unwrap()
    }

    pub fn build(self) -> NormalizedEvent {
        NormalizedEvent::from_slice(&self.to_bytes()).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(pairs: &[(&str, &str)]) -> Metadata {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    // ══════════════════════════════════════════════════════════════
    // Event Kind Mapping
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn invoice_aliases_map_to_invoice_paid() {
        assert_eq!(EventKind::from_type("invoice.paid"), EventKind::InvoicePaid);
        assert_eq!(EventKind::from_type("invoice.payment_succeeded"), EventKind::InvoicePaid);
    }

    #[test]
    fn unknown_event_type_is_ignored_not_an_error() {
        let event = ProviderEventBuilder::new("customer.created", json!({"whatever": 1})).build();

        assert_eq!(
            event.event,
            BillingEvent::Ignored {
                event_type: "customer.created".to_string()
            }
        );
    }

    #[test]
    fn envelope_without_api_version_or_livemode_parses() {
        let body = br#"{"id":"evt_1","type":"ping","created":1704067200,"data":{"object":{}}}"#;

        let event = NormalizedEvent::from_slice(body).unwrap();

        assert!(!event.livemode);
        assert!(event.api_version.is_none());
    }

    #[test]
    fn non_json_body_is_parse_error() {
        assert!(matches!(
            NormalizedEvent::from_slice(b"<xml/>"),
            Err(WebhookError::ParseError(_))
        ));
    }

    #[test]
    fn known_kind_without_subject_id_is_parse_error() {
        let body = ProviderEventBuilder::new("customer.subscription.updated", json!({"status": "active"}))
            .to_bytes();

        assert!(matches!(
            NormalizedEvent::from_slice(&body),
            Err(WebhookError::ParseError(_))
        ));
    }

    // ══════════════════════════════════════════════════════════════
    // Subscription Drift Tolerance
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn subscription_reads_top_level_period_end() {
        let snapshot: SubscriptionSnapshot = serde_json::from_value(json!({
            "id": "sub_1",
            "status": "active",
            "customer": "cus_1",
            "current_period_end": 1706745600,
            "metadata": {"fan_id": "F1", "creator_id": "C1"}
        }))
        .unwrap();

        assert_eq!(snapshot.customer_id.as_deref(), Some("cus_1"));
        assert_eq!(snapshot.current_period_end.unwrap().as_unix_secs(), 1706745600);
        assert!(!snapshot.cancel_at_period_end);
    }

    #[test]
    fn subscription_falls_back_to_first_item_period_end() {
        let snapshot: SubscriptionSnapshot = serde_json::from_value(json!({
            "id": "sub_1",
            "status": "active",
            "items": {"object": "list", "data": [
                {"id": "si_1", "current_period_end": 1706745600},
                {"id": "si_2", "current_period_end": 1}
            ]}
        }))
        .unwrap();

        assert_eq!(snapshot.current_period_end.unwrap().as_unix_secs(), 1706745600);
    }

    #[test]
    fn subscription_accepts_expanded_customer() {
        let snapshot: SubscriptionSnapshot = serde_json::from_value(json!({
            "id": "sub_1",
            "status": "active",
            "customer": {"id": "cus_9", "object": "customer", "email": "a@b.c"},
            "metadata": null
        }))
        .unwrap();

        assert_eq!(snapshot.customer_id.as_deref(), Some("cus_9"));
        assert!(snapshot.metadata.is_empty());
    }

    #[test]
    fn checkout_session_accepts_expanded_subscription() {
        let session: CheckoutSession = serde_json::from_value(json!({
            "id": "cs_1",
            "mode": "subscription",
            "subscription": {"id": "sub_1", "object": "subscription"},
            "metadata": {"fan_id": "F1"}
        }))
        .unwrap();

        assert!(session.is_subscription_mode());
        assert_eq!(session.subscription_id.as_deref(), Some("sub_1"));
    }

    #[test]
    fn invoice_reads_subscription_from_parent_details() {
        let invoice: InvoiceRef = serde_json::from_value(json!({
            "id": "in_1",
            "parent": {"subscription_details": {"subscription": "sub_7"}}
        }))
        .unwrap();

        assert_eq!(invoice.subscription_id.as_deref(), Some("sub_7"));
    }

    #[test]
    fn invoice_prefers_top_level_subscription() {
        let invoice: InvoiceRef = serde_json::from_value(json!({
            "id": "in_1",
            "subscription": "sub_top",
            "parent": {"subscription_details": {"subscription": "sub_nested"}}
        }))
        .unwrap();

        assert_eq!(invoice.subscription_id.as_deref(), Some("sub_top"));
    }

    #[test]
    fn account_defaults_missing_capabilities_to_false() {
        let account: AccountSnapshot =
            serde_json::from_value(json!({"id": "acct_1", "charges_enabled": true})).unwrap();

        assert!(account.charges_enabled);
        assert!(!account.payouts_enabled);
    }

    // ══════════════════════════════════════════════════════════════
    // Correlation
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn correlation_requires_fan_and_creator() {
        assert!(CorrelationIds::from_metadata(&meta(&[("fan_id", "F1")])).is_none());
        assert!(CorrelationIds::from_metadata(&meta(&[("fan_id", "F1"), ("creator_id", "")])).is_none());

        let ids = CorrelationIds::from_metadata(&meta(&[("fan_id", "F1"), ("creator_id", "C1")])).unwrap();
        assert_eq!(ids.fan_id.as_str(), "F1");
        assert!(ids.plan_id.is_none());
    }

    #[test]
    fn correlation_prefers_primary_and_fills_from_fallback() {
        let primary = meta(&[("fan_id", "F1")]);
        let fallback = meta(&[("fan_id", "F_other"), ("creator_id", "C1"), ("plan_id", "gold")]);

        let ids = CorrelationIds::resolve(&primary, &fallback).unwrap();

        assert_eq!(ids.fan_id.as_str(), "F1");
        assert_eq!(ids.creator_id.as_str(), "C1");
        assert_eq!(ids.plan_id.as_deref(), Some("gold"));
    }

    #[test]
    fn missing_from_lists_only_absent_keys() {
        let ids = CorrelationIds::resolve(
            &meta(&[("fan_id", "F1")]),
            &meta(&[("creator_id", "C1")]),
        )
        .unwrap();

        let missing = ids.missing_from(&meta(&[("fan_id", "F1")]));

        assert_eq!(missing, meta(&[("creator_id", "C1")]));
    }
}
