//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! - `PaymentProvider` - Read-back and metadata patching at the provider
//! - `SubscriptionLedger` - Fan subscription rows
//! - `CreatorAccountLedger` - Creator connected-account columns and payout grants

mod creator_account_ledger;
mod payment_provider;
mod subscription_ledger;

pub use creator_account_ledger::CreatorAccountLedger;
pub use payment_provider::{PaymentError, PaymentErrorCode, PaymentProvider};
pub use subscription_ledger::SubscriptionLedger;
