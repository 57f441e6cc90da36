//! Billing handlers.
//!
//! ## Commands
//! - Handle a payment provider webhook (verify, normalize, dispatch)
//! - Reconcile a subscription snapshot or cancellation into the ledger
//! - Reconcile a connected-account update into the creator profile

mod handle_billing_webhook;
mod reconcile_account;
mod reconcile_subscription;

pub use handle_billing_webhook::{
    HandleBillingWebhookCommand, HandleBillingWebhookHandler, SkipReason, WebhookOutcome,
};
pub use reconcile_account::{AccountReconciliation, ReconcileAccountHandler};
pub use reconcile_subscription::{ReconcileSubscriptionHandler, SubscriptionReconciliation};
