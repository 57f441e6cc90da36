//! Billing domain module.
//!
//! Reconciles payment provider events into the fan subscription ledger and
//! the creator connected-account fields.
//!
//! # Module Structure
//!
//! - `webhook_verifier` - Signature and replay checks on raw deliveries
//! - `provider_event` - Envelope normalization into `BillingEvent`
//! - `status` - Provider status mapping and the grace-period rule
//! - `subscription` - Ledger rows, upserts and the re-subscription guard
//! - `connected_account` - Onboarding status and payout grants

mod connected_account;
mod provider_event;
mod status;
mod subscription;
mod webhook_errors;
mod webhook_verifier;

pub use connected_account::{
    AccountTransition, AccountUpdate, CreatorAccountRow, OnboardingStatus, PayoutGrant,
};
pub use provider_event::{
    AccountSnapshot, BillingEvent, CheckoutSession, CorrelationIds, EventKind, InvoiceRef,
    Metadata, NormalizedEvent, ProviderEvent, SubscriptionSnapshot, CREATOR_ID_KEY, FAN_ID_KEY,
    PLAN_ID_KEY,
};
pub use status::{derive_entitlement, map_provider_status, Entitlement, LedgerStatus};
pub use subscription::{
    SubscriptionCancellation, SubscriptionLedgerRow, SubscriptionUpsert, UpsertOutcome,
};
pub use webhook_errors::WebhookError;
pub use webhook_verifier::{sign_payload, SignatureHeader, WebhookVerifier, DEFAULT_TOLERANCE_SECS};

#[cfg(test)]
pub(crate) use provider_event::ProviderEventBuilder;
