//! In-process ledger adapters.
//!
//! Hold the ledger in memory behind a single async lock per store, which makes
//! every port call atomic. Used by tests and for local runs without a
//! database (`ledger.url = "memory://"`).

mod creator_account_ledger;
mod subscription_ledger;

pub use creator_account_ledger::InMemoryCreatorAccountLedger;
pub use subscription_ledger::InMemorySubscriptionLedger;
