//! Ledger status vocabulary and the provider-status mapping.
//!
//! The provider reports a wide and growing set of subscription states; the
//! ledger stores a closed vocabulary. `map_provider_status` collapses one into
//! the other, and `derive_entitlement` applies the cancel-at-period-end grace
//! rule to decide whether the fan has access right now.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::foundation::{Timestamp, ValidationError};

/// Status of a subscription ledger row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerStatus {
    /// Placeholder written by checkout code before the provider confirms.
    /// Never produced by the mapper.
    Incomplete,

    /// Paid and in good standing.
    Active,

    /// Payment failed or is being retried.
    PastDue,

    /// Cancelled, or scheduled to cancel at period end.
    Canceled,

    /// Never became payable, or lapsed without payment.
    Expired,
}

impl LedgerStatus {
    /// Returns the stored string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerStatus::Incomplete => "incomplete",
            LedgerStatus::Active => "active",
            LedgerStatus::PastDue => "past_due",
            LedgerStatus::Canceled => "canceled",
            LedgerStatus::Expired => "expired",
        }
    }

    /// Parses the stored string form.
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        match s {
            "incomplete" => Ok(LedgerStatus::Incomplete),
            "active" => Ok(LedgerStatus::Active),
            "past_due" => Ok(LedgerStatus::PastDue),
            "canceled" => Ok(LedgerStatus::Canceled),
            "expired" => Ok(LedgerStatus::Expired),
            other => Err(ValidationError::invalid_format(
                "status",
                format!("unknown ledger status '{}'", other),
            )),
        }
    }
}

impl fmt::Display for LedgerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps a provider subscription status onto the ledger vocabulary.
///
/// Unrecognized values map to `PastDue`: access is withheld, but the row is
/// not treated as terminal, so a later canonical event can restore it.
pub fn map_provider_status(provider_status: &str) -> LedgerStatus {
    match provider_status {
        "active" | "trialing" => LedgerStatus::Active,
        "past_due" | "unpaid" | "paused" => LedgerStatus::PastDue,
        "canceled" => LedgerStatus::Canceled,
        "incomplete" | "incomplete_expired" => LedgerStatus::Expired,
        _ => LedgerStatus::PastDue,
    }
}

/// Status and access flag as they will be stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entitlement {
    pub status: LedgerStatus,
    pub is_active: bool,
}

/// Applies the status mapping and the grace-period rule.
///
/// With `cancel_at_period_end`, the stored status is `Canceled`. Access
/// continues until `current_period_end` (or indefinitely if the provider sent
/// no period end) only while the provider still reports the period as paid.
pub fn derive_entitlement(
    provider_status: &str,
    cancel_at_period_end: bool,
    current_period_end: Option<Timestamp>,
    observed_at: Timestamp,
) -> Entitlement {
    let mapped = map_provider_status(provider_status);

    if !cancel_at_period_end {
        return Entitlement {
            status: mapped,
            is_active: mapped == LedgerStatus::Active,
        };
    }

    let period_continues = current_period_end.map_or(true, |end| end.is_after(&observed_at));

    Entitlement {
        status: LedgerStatus::Canceled,
        is_active: mapped == LedgerStatus::Active && period_continues,
    }
}
