//! HandleBillingWebhookHandler - Command handler for payment provider webhooks.
//!
//! Verifies the delivery, normalizes it, and routes each event kind to its
//! reconciliation path. Every outcome that a redelivery could not change is
//! returned as `Ok`, so the HTTP layer acknowledges it with a 200.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::billing::{
    AccountSnapshot, BillingEvent, CheckoutSession, CorrelationIds, InvoiceRef, NormalizedEvent,
    OnboardingStatus, SubscriptionSnapshot, UpsertOutcome, WebhookError, WebhookVerifier,
};
use crate::domain::foundation::{CreatorId, FanId, Timestamp};
use crate::ports::{PaymentError, PaymentProvider};

use super::reconcile_account::{AccountReconciliation, ReconcileAccountHandler};
use super::reconcile_subscription::{ReconcileSubscriptionHandler, SubscriptionReconciliation};

/// Command to handle a billing webhook.
#[derive(Debug, Clone)]
pub struct HandleBillingWebhookCommand {
    /// Raw webhook payload, exactly as received.
    pub payload: Vec<u8>,
    /// `Stripe-Signature` header value.
    pub signature: String,
}

/// Why an event was acknowledged without touching the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    MissingMetadata,
    NotSubscriptionCheckout,
    NoSubscriptionId,
    SubscriptionNotFound,
    AccountNotFound,
    UnknownAccount,
}

/// Result of webhook processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    SubscriptionReconciled {
        subscription_id: String,
        fan_id: FanId,
        creator_id: CreatorId,
        outcome: UpsertOutcome,
    },
    SubscriptionCanceled {
        subscription_id: String,
        rows: u64,
    },
    AccountReconciled {
        account_id: String,
        creator_id: CreatorId,
        onboarding_status: OnboardingStatus,
        payout_granted: bool,
    },
    Skipped(SkipReason),
    /// Event type the reconciler does not act on.
    Ignored {
        event_type: String,
    },
}

/// Handler for processing payment provider webhooks.
pub struct HandleBillingWebhookHandler {
    verifier: Arc<WebhookVerifier>,
    payment_provider: Arc<dyn PaymentProvider>,
    subscriptions: ReconcileSubscriptionHandler,
    accounts: ReconcileAccountHandler,
    provider_timeout: Duration,
}

impl HandleBillingWebhookHandler {
    pub fn new(
        verifier: Arc<WebhookVerifier>,
        payment_provider: Arc<dyn PaymentProvider>,
        subscriptions: ReconcileSubscriptionHandler,
        accounts: ReconcileAccountHandler,
        provider_timeout: Duration,
    ) -> Self {
        Self {
            verifier,
            payment_provider,
            subscriptions,
            accounts,
            provider_timeout,
        }
    }

    pub async fn handle(
        &self,
        cmd: HandleBillingWebhookCommand,
    ) -> Result<WebhookOutcome, WebhookError> {
        // 1. Verify signature and normalize
        let event = self.verifier.verify_and_parse(&cmd.payload, &cmd.signature)?;

        tracing::debug!(
            event_id = %event.id,
            event_type = %event.event_type,
            livemode = event.livemode,
            "Webhook verified"
        );

        // 2. Route by event kind
        self.dispatch(event).await
    }

    /// Routes an already verified event.
    pub async fn dispatch(&self, event: NormalizedEvent) -> Result<WebhookOutcome, WebhookError> {
        let NormalizedEvent {
            id,
            event_type,
            created,
            event,
            ..
        } = event;

        let result = match event {
            BillingEvent::CheckoutCompleted(session) => self.handle_checkout_completed(&session).await,
            BillingEvent::SubscriptionCreated(snapshot) | BillingEvent::SubscriptionUpdated(snapshot) => {
                self.apply_snapshot(&snapshot, None, created).await
            }
            BillingEvent::SubscriptionDeleted(snapshot) => self
                .subscriptions
                .cancel(&snapshot.id, created)
                .await
                .map(|rows| WebhookOutcome::SubscriptionCanceled {
                    subscription_id: snapshot.id.clone(),
                    rows,
                }),
            BillingEvent::InvoicePaid(invoice) => self.handle_invoice_paid(&invoice).await,
            BillingEvent::AccountUpdated(account) => self.handle_account_updated(&account.id).await,
            BillingEvent::Ignored { event_type } => Ok(WebhookOutcome::Ignored { event_type }),
        };

        match &result {
            Ok(outcome) => tracing::info!(event_id = %id, event_type = %event_type, outcome = ?outcome, "Webhook handled"),
            Err(e) => tracing::error!(event_id = %id, event_type = %event_type, error = %e, "Webhook failed"),
        }

        result
    }

    async fn handle_checkout_completed(
        &self,
        session: &CheckoutSession,
    ) -> Result<WebhookOutcome, WebhookError> {
        if !session.is_subscription_mode() {
            return Ok(WebhookOutcome::Skipped(SkipReason::NotSubscriptionCheckout));
        }
        let subscription_id = match &session.subscription_id {
            Some(id) => id,
            None => {
                tracing::warn!(session_id = %session.id, "Subscription checkout without subscription id");
                return Ok(WebhookOutcome::Skipped(SkipReason::NoSubscriptionId));
            }
        };

        let mut snapshot = match self.fetch_subscription(subscription_id).await? {
            Some(snapshot) => snapshot,
            None => return Ok(WebhookOutcome::Skipped(SkipReason::SubscriptionNotFound)),
        };
        let fetched_at = Timestamp::now();

        let ids = match CorrelationIds::resolve(&snapshot.metadata, &session.metadata) {
            Some(ids) => ids,
            None => {
                tracing::warn!(
                    session_id = %session.id,
                    subscription_id = %subscription_id,
                    "Checkout has no fan_id/creator_id metadata, skipping"
                );
                return Ok(WebhookOutcome::Skipped(SkipReason::MissingMetadata));
            }
        };

        self.backfill_metadata(&snapshot, &ids).await;

        if snapshot.customer_id.is_none() {
            snapshot.customer_id = session.customer_id.clone();
        }

        self.apply_snapshot(&snapshot, Some(ids), fetched_at).await
    }

    async fn handle_invoice_paid(&self, invoice: &InvoiceRef) -> Result<WebhookOutcome, WebhookError> {
        let subscription_id = match &invoice.subscription_id {
            Some(id) => id,
            None => return Ok(WebhookOutcome::Skipped(SkipReason::NoSubscriptionId)),
        };

        match self.fetch_subscription(subscription_id).await? {
            Some(snapshot) => self.apply_snapshot(&snapshot, None, Timestamp::now()).await,
            None => Ok(WebhookOutcome::Skipped(SkipReason::SubscriptionNotFound)),
        }
    }

    /// Applies the provider's current copy of the account; the event subject is
    /// only used for its id.
    async fn handle_account_updated(&self, account_id: &str) -> Result<WebhookOutcome, WebhookError> {
        let account: AccountSnapshot = match self
            .with_timeout(self.payment_provider.get_account(account_id))
            .await?
        {
            Some(account) => account,
            None => {
                tracing::warn!(account_id = %account_id, "Connected account not found at provider");
                return Ok(WebhookOutcome::Skipped(SkipReason::AccountNotFound));
            }
        };

        match self.accounts.reconcile(&account, Timestamp::now()).await? {
            AccountReconciliation::Applied {
                creator_id,
                onboarding_status,
                payout_granted,
            } => Ok(WebhookOutcome::AccountReconciled {
                account_id: account.id.clone(),
                creator_id,
                onboarding_status,
                payout_granted,
            }),
            AccountReconciliation::UnknownAccount => Ok(WebhookOutcome::Skipped(SkipReason::UnknownAccount)),
        }
    }

    async fn apply_snapshot(
        &self,
        snapshot: &SubscriptionSnapshot,
        ids: Option<CorrelationIds>,
        observed_at: Timestamp,
    ) -> Result<WebhookOutcome, WebhookError> {
        match self.subscriptions.reconcile(snapshot, ids, observed_at).await? {
            SubscriptionReconciliation::Applied { ids, outcome } => Ok(WebhookOutcome::SubscriptionReconciled {
                subscription_id: snapshot.id.clone(),
                fan_id: ids.fan_id,
                creator_id: ids.creator_id,
                outcome,
            }),
            SubscriptionReconciliation::MissingMetadata => Ok(WebhookOutcome::Skipped(SkipReason::MissingMetadata)),
        }
    }

    async fn fetch_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Option<SubscriptionSnapshot>, WebhookError> {
        let fetched = self
            .with_timeout(self.payment_provider.get_subscription(subscription_id))
            .await?;

        if fetched.is_none() {
            tracing::warn!(subscription_id = %subscription_id, "Subscription not found at provider");
        }
        Ok(fetched)
    }

    /// Writes correlation ids the subscription lacks. Failures are only logged.
    async fn backfill_metadata(&self, snapshot: &SubscriptionSnapshot, ids: &CorrelationIds) {
        let missing = ids.missing_from(&snapshot.metadata);
        if missing.is_empty() {
            return;
        }

        let result = self
            .with_timeout(
                self.payment_provider
                    .update_subscription_metadata(&snapshot.id, &missing),
            )
            .await;

        match result {
            Ok(()) => tracing::info!(
                subscription_id = %snapshot.id,
                keys = missing.len(),
                "Back-filled subscription metadata"
            ),
            Err(e) => tracing::warn!(
                subscription_id = %snapshot.id,
                error = %e,
                "Failed to back-fill subscription metadata"
            ),
        }
    }

    async fn with_timeout<T>(
        &self,
        call: impl Future<Output = Result<T, PaymentError>>,
    ) -> Result<T, WebhookError> {
        match tokio::time::timeout(self.provider_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(WebhookError::Provider(e.to_string())),
            Err(_) => Err(WebhookError::ProviderTimeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{InMemoryCreatorAccountLedger, InMemorySubscriptionLedger};
    use crate::adapters::stripe::MockPaymentProvider;
    use crate::domain::billing::{
        sign_payload, CreatorAccountRow, LedgerStatus, Metadata, ProviderEventBuilder,
    };
    use crate::domain::foundation::SubscriptionKey;
    use crate::ports::{CreatorAccountLedger, SubscriptionLedger};
    use secrecy::SecretString;
    use serde_json::json;

    const SECRET: &str = "whsec_dispatch_test";

    // ════════════════════════════════════════════════════════════════════════════
    // Test Fixtures
    // ════════════════════════════════════════════════════════════════════════════

    struct Harness {
        handler: HandleBillingWebhookHandler,
        provider: MockPaymentProvider,
        subscriptions: Arc<InMemorySubscriptionLedger>,
        accounts: Arc<InMemoryCreatorAccountLedger>,
    }

    fn harness() -> Harness {
        let provider = MockPaymentProvider::new();
        let subscriptions = Arc::new(InMemorySubscriptionLedger::new());
        let accounts = Arc::new(InMemoryCreatorAccountLedger::new());
        let handler = HandleBillingWebhookHandler::new(
            Arc::new(WebhookVerifier::new(SecretString::new(SECRET.to_string()))),
            Arc::new(provider.clone()),
            ReconcileSubscriptionHandler::new(subscriptions.clone()),
            ReconcileAccountHandler::new(accounts.clone()),
            Duration::from_millis(200),
        );
        Harness {
            handler,
            provider,
            subscriptions,
            accounts,
        }
    }

    fn metadata(pairs: &[(&str, &str)]) -> Metadata {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn provider_subscription(meta: &[(&str, &str)]) -> SubscriptionSnapshot {
        SubscriptionSnapshot {
            id: "sub_1".to_string(),
            customer_id: None,
            status: "active".to_string(),
            current_period_end: Timestamp::from_unix_secs(4_102_444_800),
            cancel_at_period_end: false,
            metadata: metadata(meta),
        }
    }

    fn checkout_event(session_meta: serde_json::Value) -> NormalizedEvent {
        ProviderEventBuilder::new(
            "checkout.session.completed",
            json!({
                "id": "cs_1",
                "mode": "subscription",
                "subscription": "sub_1",
                "customer": "cus_1",
                "metadata": session_meta
            }),
        )
        .build()
    }

    fn key() -> SubscriptionKey {
        SubscriptionKey::new(FanId::new("F1").unwrap(), CreatorId::new("C1").unwrap())
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Verification
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn bad_signature_is_rejected_before_dispatch() {
        let h = harness();
        let cmd = HandleBillingWebhookCommand {
            payload: br#"{"id":"evt_1"}"#.to_vec(),
            signature: format!("t={},v1={}", chrono::Utc::now().timestamp(), "00".repeat(32)),
        };

        let err = h.handler.handle(cmd).await.unwrap_err();

        assert!(matches!(err, WebhookError::InvalidSignature));
        assert!(h.provider.calls().is_empty());
    }

    #[tokio::test]
    async fn signed_unknown_event_is_ignored() {
        let h = harness();
        let payload = ProviderEventBuilder::new("charge.refunded", json!({"id": "ch_1"})).to_bytes();
        let now = chrono::Utc::now().timestamp();
        let cmd = HandleBillingWebhookCommand {
            signature: format!("t={},v1={}", now, sign_payload(SECRET, now, &payload)),
            payload,
        };

        let outcome = h.handler.handle(cmd).await.unwrap();

        assert_eq!(
            outcome,
            WebhookOutcome::Ignored {
                event_type: "charge.refunded".to_string()
            }
        );
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Checkout Completed
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn checkout_uses_session_metadata_and_backfills() {
        let h = harness();
        h.provider.add_subscription(provider_subscription(&[]));

        let outcome = h
            .handler
            .dispatch(checkout_event(json!({"fan_id": "F1", "creator_id": "C1"})))
            .await
            .unwrap();

        assert!(matches!(
            outcome,
            WebhookOutcome::SubscriptionReconciled { outcome: UpsertOutcome::Inserted, .. }
        ));
        let row = h.subscriptions.find_by_key(&key()).await.unwrap().unwrap();
        assert_eq!(row.stripe_customer_id.as_deref(), Some("cus_1"));
        assert!(row.is_active);

        let stored = h.provider.subscription("sub_1").unwrap();
        assert_eq!(stored.metadata.get("creator_id").map(String::as_str), Some("C1"));
    }

    #[tokio::test]
    async fn checkout_skips_backfill_when_subscription_has_metadata() {
        let h = harness();
        h.provider
            .add_subscription(provider_subscription(&[("fan_id", "F1"), ("creator_id", "C1")]));

        h.handler.dispatch(checkout_event(json!({}))).await.unwrap();

        assert_eq!(h.provider.call_count("update_subscription_metadata"), 0);
    }

    #[tokio::test]
    async fn backfill_failure_is_not_fatal() {
        let h = harness();
        h.provider.add_subscription(provider_subscription(&[]));
        h.provider
            .set_method_error("update_subscription_metadata", PaymentError::network("down"));

        let outcome = h
            .handler
            .dispatch(checkout_event(json!({"fan_id": "F1", "creator_id": "C1"})))
            .await;

        assert!(outcome.is_ok());
        assert!(h.subscriptions.find_by_key(&key()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn checkout_without_metadata_is_skipped() {
        let h = harness();
        h.provider.add_subscription(provider_subscription(&[]));

        let outcome = h.handler.dispatch(checkout_event(json!({}))).await.unwrap();

        assert_eq!(outcome, WebhookOutcome::Skipped(SkipReason::MissingMetadata));
        assert!(h.subscriptions.rows().await.is_empty());
    }

    #[tokio::test]
    async fn payment_mode_checkout_is_skipped() {
        let h = harness();
        let event = ProviderEventBuilder::new(
            "checkout.session.completed",
            json!({"id": "cs_1", "mode": "payment"}),
        )
        .build();

        let outcome = h.handler.dispatch(event).await.unwrap();

        assert_eq!(outcome, WebhookOutcome::Skipped(SkipReason::NotSubscriptionCheckout));
        assert!(h.provider.calls().is_empty());
    }

    #[tokio::test]
    async fn checkout_fetch_failure_is_retryable() {
        let h = harness();
        h.provider
            .set_method_error("get_subscription", PaymentError::network("reset"));

        let err = h
            .handler
            .dispatch(checkout_event(json!({"fan_id": "F1", "creator_id": "C1"})))
            .await
            .unwrap_err();

        assert!(matches!(err, WebhookError::Provider(_)));
    }

    #[tokio::test]
    async fn slow_provider_times_out() {
        let h = harness();
        h.provider.add_subscription(provider_subscription(&[("fan_id", "F1"), ("creator_id", "C1")]));
        h.provider.set_delay(Duration::from_secs(5));

        let err = h.handler.dispatch(checkout_event(json!({}))).await.unwrap_err();

        assert!(matches!(err, WebhookError::ProviderTimeout));
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Subscription Events
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn grace_period_update_keeps_access() {
        let h = harness();
        let event = ProviderEventBuilder::new(
            "customer.subscription.updated",
            json!({
                "id": "sub_1",
                "status": "active",
                "cancel_at_period_end": true,
                "current_period_end": 4102444800_i64,
                "metadata": {"fan_id": "F1", "creator_id": "C1"}
            }),
        )
        .build();

        h.handler.dispatch(event).await.unwrap();

        let row = h.subscriptions.find_by_key(&key()).await.unwrap().unwrap();
        assert_eq!(row.status, LedgerStatus::Canceled);
        assert!(row.is_active);
        assert!(row.cancel_at_period_end);
    }

    #[tokio::test]
    async fn repeated_update_event_is_idempotent() {
        let h = harness();
        let event = ProviderEventBuilder::new(
            "customer.subscription.updated",
            json!({
                "id": "sub_1",
                "status": "past_due",
                "customer": "cus_1",
                "metadata": {"fan_id": "F1", "creator_id": "C1"}
            }),
        )
        .build();

        h.handler.dispatch(event.clone()).await.unwrap();
        let once = h.subscriptions.rows().await;
        h.handler.dispatch(event.clone()).await.unwrap();
        h.handler.dispatch(event).await.unwrap();

        assert_eq!(h.subscriptions.rows().await, once);
    }

    #[tokio::test]
    async fn deleted_subscription_cancels_row() {
        let h = harness();
        h.provider
            .add_subscription(provider_subscription(&[("fan_id", "F1"), ("creator_id", "C1")]));
        h.handler.dispatch(checkout_event(json!({}))).await.unwrap();

        let deleted = ProviderEventBuilder::new(
            "customer.subscription.deleted",
            json!({"id": "sub_1", "status": "canceled"}),
        )
        .build();
        let outcome = h.handler.dispatch(deleted).await.unwrap();

        assert_eq!(
            outcome,
            WebhookOutcome::SubscriptionCanceled {
                subscription_id: "sub_1".to_string(),
                rows: 1
            }
        );
        let row = h.subscriptions.find_by_key(&key()).await.unwrap().unwrap();
        assert_eq!(row.status, LedgerStatus::Canceled);
        assert!(!row.is_active);
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Invoice Paid
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn invoice_paid_refetches_subscription() {
        let h = harness();
        h.provider
            .add_subscription(provider_subscription(&[("fan_id", "F1"), ("creator_id", "C1")]));
        let event = ProviderEventBuilder::new(
            "invoice.paid",
            json!({"id": "in_1", "parent": {"subscription_details": {"subscription": "sub_1"}}}),
        )
        .build();

        h.handler.dispatch(event).await.unwrap();

        assert_eq!(h.provider.call_count("get_subscription"), 1);
        assert!(h.subscriptions.find_by_key(&key()).await.unwrap().unwrap().is_active);
    }

    #[tokio::test]
    async fn invoice_for_unknown_subscription_is_skipped() {
        let h = harness();
        let event = ProviderEventBuilder::new("invoice.payment_succeeded", json!({"id": "in_1", "subscription": "sub_x"}))
            .build();

        let outcome = h.handler.dispatch(event).await.unwrap();

        assert_eq!(outcome, WebhookOutcome::Skipped(SkipReason::SubscriptionNotFound));
    }

    #[tokio::test]
    async fn invoice_without_subscription_is_skipped() {
        let h = harness();
        let event = ProviderEventBuilder::new("invoice.paid", json!({"id": "in_1"})).build();

        let outcome = h.handler.dispatch(event).await.unwrap();

        assert_eq!(outcome, WebhookOutcome::Skipped(SkipReason::NoSubscriptionId));
        assert!(h.provider.calls().is_empty());
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Account Updated
    // ════════════════════════════════════════════════════════════════════════════

    fn account_event(charges: bool, payouts: bool) -> NormalizedEvent {
        ProviderEventBuilder::new(
            "account.updated",
            json!({"id": "acct_1", "charges_enabled": charges, "payouts_enabled": payouts}),
        )
        .build()
    }

    async fn seed_profile(h: &Harness) {
        h.accounts
            .insert_profile(CreatorAccountRow {
                creator_id: CreatorId::new("C2").unwrap(),
                stripe_account_id: Some("acct_1".to_string()),
                charges_enabled: false,
                payouts_enabled: false,
                onboarding_status: OnboardingStatus::Pending,
            })
            .await;
    }

    #[tokio::test]
    async fn account_update_applies_refetched_capabilities() {
        let h = harness();
        seed_profile(&h).await;
        h.provider.add_account(AccountSnapshot {
            id: "acct_1".to_string(),
            charges_enabled: true,
            payouts_enabled: true,
        });

        // The delivered subject is stale; the provider's copy wins
        let outcome = h.handler.dispatch(account_event(true, false)).await.unwrap();

        assert_eq!(h.provider.call_count("get_account"), 1);
        assert!(matches!(
            outcome,
            WebhookOutcome::AccountReconciled {
                onboarding_status: OnboardingStatus::Complete,
                payout_granted: true,
                ..
            }
        ));
        assert_eq!(h.accounts.grants().await.len(), 1);
    }

    #[tokio::test]
    async fn account_missing_at_provider_is_skipped() {
        let h = harness();
        seed_profile(&h).await;

        let outcome = h.handler.dispatch(account_event(true, true)).await.unwrap();

        assert_eq!(outcome, WebhookOutcome::Skipped(SkipReason::AccountNotFound));
        assert!(h.accounts.grants().await.is_empty());
    }

    #[tokio::test]
    async fn account_fetch_failure_is_retryable() {
        let h = harness();
        seed_profile(&h).await;
        h.provider
            .set_method_error("get_account", PaymentError::network("connection reset"));

        let err = h.handler.dispatch(account_event(true, true)).await.unwrap_err();

        assert!(err.is_retryable());
        let profile = h
            .accounts
            .find_by_creator(&CreatorId::new("C2").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(profile.onboarding_status, OnboardingStatus::Pending);
    }
}
