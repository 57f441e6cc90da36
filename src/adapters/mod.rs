//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the domain to external systems:
//! - `stripe` - Payment provider (Stripe REST API, plus a mock for tests)
//! - `postgres` - Ledger over sqlx
//! - `postgrest` - Ledger over a PostgREST API
//! - `memory` - In-process ledger
//! - `http` - axum endpoint exposure

pub mod http;
pub mod memory;
pub mod postgres;
pub mod postgrest;
pub mod stripe;

pub use memory::{InMemoryCreatorAccountLedger, InMemorySubscriptionLedger};
pub use postgres::{PostgresCreatorAccountLedger, PostgresSubscriptionLedger};
pub use postgrest::{
    PostgrestClient, PostgrestConfig, PostgrestCreatorAccountLedger, PostgrestSubscriptionLedger,
};
pub use stripe::{MockPaymentProvider, StripeConfig, StripePaymentAdapter};
