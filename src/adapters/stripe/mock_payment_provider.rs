//! Mock payment provider for testing.
//!
//! Provides a configurable in-process implementation of `PaymentProvider`
//! for unit and integration tests. Supports:
//! - Pre-configured subscriptions and accounts
//! - Error injection per method
//! - Artificial latency, to exercise request timeouts
//! - Call tracking

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::billing::{AccountSnapshot, Metadata, SubscriptionSnapshot};
use crate::ports::{PaymentError, PaymentProvider};

/// Mock payment provider for testing.
///
/// # Example
///
/// ```ignore
/// let mock = MockPaymentProvider::new();
/// mock.add_subscription(snapshot);
/// mock.set_method_error("update_subscription_metadata", PaymentError::network("down"));
/// ```
#[derive(Default, Clone)]
pub struct MockPaymentProvider {
    inner: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    subscriptions: HashMap<String, SubscriptionSnapshot>,
    accounts: HashMap<String, AccountSnapshot>,
    method_errors: HashMap<String, PaymentError>,
    delay: Option<Duration>,
    call_log: Vec<MethodCall>,
}

/// Recorded method call for assertions.
#[derive(Debug, Clone)]
pub struct MethodCall {
    pub method: String,
    pub args: Vec<String>,
}

impl MockPaymentProvider {
    /// Create a new mock provider with no data.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Configuration Methods
    // ════════════════════════════════════════════════════════════════════════════

    /// Add a subscription to the "provider".
    pub fn add_subscription(&self, subscription: SubscriptionSnapshot) {
        self.state()
            .subscriptions
            .insert(subscription.id.clone(), subscription);
    }

    /// Add a connected account to the "provider".
    pub fn add_account(&self, account: AccountSnapshot) {
        self.state().accounts.insert(account.id.clone(), account);
    }

    /// Set an error for a specific method.
    pub fn set_method_error(&self, method: &str, error: PaymentError) {
        self.state().method_errors.insert(method.to_string(), error);
    }

    /// Delay every call by `delay`.
    pub fn set_delay(&self, delay: Duration) {
        self.state().delay = Some(delay);
    }

    /// Clear all configured errors.
    pub fn clear_errors(&self) {
        self.state().method_errors.clear();
    }

    /// Current stored copy of a subscription.
    pub fn subscription(&self, subscription_id: &str) -> Option<SubscriptionSnapshot> {
        self.state().subscriptions.get(subscription_id).cloned()
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Call Tracking
    // ════════════════════════════════════════════════════════════════════════════

    /// Get all recorded method calls.
    pub fn calls(&self) -> Vec<MethodCall> {
        self.state().call_log.clone()
    }

    /// Get count of calls to a method.
    pub fn call_count(&self, method: &str) -> usize {
        self.state()
            .call_log
            .iter()
            .filter(|c| c.method == method)
            .count()
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Internal Helpers
    // ════════════════════════════════════════════════════════════════════════════

    async fn enter(&self, method: &str, args: Vec<String>) -> Result<(), PaymentError> {
        let delay = {
            let mut state = self.state();
            state.call_log.push(MethodCall {
                method: method.to_string(),
                args,
            });
            state.delay
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        match self.state().method_errors.get(method) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl PaymentProvider for MockPaymentProvider {
    async fn get_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Option<SubscriptionSnapshot>, PaymentError> {
        self.enter("get_subscription", vec![subscription_id.to_string()])
            .await?;
        Ok(self.state().subscriptions.get(subscription_id).cloned())
    }

    async fn get_account(&self, account_id: &str) -> Result<Option<AccountSnapshot>, PaymentError> {
        self.enter("get_account", vec![account_id.to_string()]).await?;
        Ok(self.state().accounts.get(account_id).cloned())
    }

    async fn update_subscription_metadata(
        &self,
        subscription_id: &str,
        metadata: &Metadata,
    ) -> Result<(), PaymentError> {
        let mut args = vec![subscription_id.to_string()];
        args.extend(metadata.iter().map(|(k, v)| format!("{}={}", k, v)));
        self.enter("update_subscription_metadata", args).await?;

        let mut state = self.state();
        let subscription = state
            .subscriptions
            .get_mut(subscription_id)
            .ok_or_else(|| PaymentError::not_found("Subscription"))?;
        subscription
            .metadata
            .extend(metadata.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }
}
