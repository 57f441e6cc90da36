//! PostgREST adapters - Ledger implementations over a REST API.
//!
//! Used when `ledger.url` is an `http(s)://` REST root (e.g. Supabase). Every
//! request authenticates with the service key as both `apikey` and bearer token.
//! Table layout matches `migrations/0001_billing_ledger.sql`.

mod client;
mod creator_account_ledger;
mod subscription_ledger;

pub use client::{PostgrestClient, PostgrestConfig};
pub use creator_account_ledger::PostgrestCreatorAccountLedger;
pub use subscription_ledger::PostgrestSubscriptionLedger;
