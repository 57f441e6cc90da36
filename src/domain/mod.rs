//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (IDs, timestamps, errors)
//! - `billing` - Webhook verification, event normalization, status mapping
//!   and ledger row semantics

pub mod billing;
pub mod foundation;
