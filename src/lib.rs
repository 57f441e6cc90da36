//! Billing Reconciler - Payment webhook reconciliation service
//!
//! Verifies Stripe webhook deliveries and reconciles them into a fan→creator
//! subscription ledger, creator connected-account state, and payout grants.
//!
//! Layout follows ports and adapters:
//! - `domain` - pure billing rules (signature verification, status mapping, merge rules)
//! - `ports` - traits for the payment provider and the ledger stores
//! - `application` - command handlers that route events to reconciliation paths
//! - `adapters` - Stripe, Postgres, PostgREST, in-memory and HTTP implementations
//! - `config` - typed configuration loaded once at start-up

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
