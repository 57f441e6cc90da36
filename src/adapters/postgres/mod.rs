//! PostgreSQL adapters - Ledger implementations over sqlx.
//!
//! - `PostgresSubscriptionLedger` - `fan_subscriptions` upserts and cancellations
//! - `PostgresCreatorAccountLedger` - `creator_profiles` billing columns and `payout_grants`
//!
//! Schema lives in `migrations/0001_billing_ledger.sql`.

mod creator_account_ledger;
mod subscription_ledger;

pub use creator_account_ledger::PostgresCreatorAccountLedger;
pub use subscription_ledger::PostgresSubscriptionLedger;
