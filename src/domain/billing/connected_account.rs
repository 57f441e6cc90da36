//! Creator connected accounts and payout grants.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::provider_event::AccountSnapshot;
use crate::domain::foundation::{CreatorId, Timestamp, ValidationError};

/// Onboarding progress of a creator's connected account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnboardingStatus {
    NotStarted,
    Pending,
    /// Charges and payouts are both enabled.
    Complete,
}

impl OnboardingStatus {
    /// Derives the status from the last observed capabilities.
    ///
    /// An account only exists once onboarding was requested, so anything
    /// short of fully enabled is `Pending`.
    pub fn from_capabilities(charges_enabled: bool, payouts_enabled: bool) -> Self {
        if charges_enabled && payouts_enabled {
            OnboardingStatus::Complete
        } else {
            OnboardingStatus::Pending
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OnboardingStatus::NotStarted => "not_started",
            OnboardingStatus::Pending => "pending",
            OnboardingStatus::Complete => "complete",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        match s {
            "not_started" => Ok(OnboardingStatus::NotStarted),
            "pending" => Ok(OnboardingStatus::Pending),
            "complete" => Ok(OnboardingStatus::Complete),
            other => Err(ValidationError::invalid_format(
                "onboarding_status",
                format!("unknown onboarding status '{}'", other),
            )),
        }
    }
}

impl fmt::Display for OnboardingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Billing columns of a creator profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatorAccountRow {
    pub creator_id: CreatorId,
    pub stripe_account_id: Option<String>,
    pub charges_enabled: bool,
    pub payouts_enabled: bool,
    pub onboarding_status: OnboardingStatus,
}

impl CreatorAccountRow {
    /// Applies an update and returns the resulting transition.
    pub fn apply(&mut self, update: &AccountUpdate) -> AccountTransition {
        let previous = self.onboarding_status;
        self.charges_enabled = update.charges_enabled;
        self.payouts_enabled = update.payouts_enabled;
        self.onboarding_status = update.onboarding_status;

        AccountTransition {
            creator_id: self.creator_id.clone(),
            previous,
            current: self.onboarding_status,
        }
    }
}

/// Capability update for the profile holding `stripe_account_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountUpdate {
    pub stripe_account_id: String,
    pub charges_enabled: bool,
    pub payouts_enabled: bool,
    pub onboarding_status: OnboardingStatus,
}

impl From<&AccountSnapshot> for AccountUpdate {
    fn from(account: &AccountSnapshot) -> Self {
        Self {
            stripe_account_id: account.id.clone(),
            charges_enabled: account.charges_enabled,
            payouts_enabled: account.payouts_enabled,
            onboarding_status: OnboardingStatus::from_capabilities(
                account.charges_enabled,
                account.payouts_enabled,
            ),
        }
    }
}

/// Onboarding status before and after an account update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountTransition {
    pub creator_id: CreatorId,
    pub previous: OnboardingStatus,
    pub current: OnboardingStatus,
}

impl AccountTransition {
    /// True only on the update that first makes the account fully enabled.
    pub fn became_complete(&self) -> bool {
        self.previous != OnboardingStatus::Complete && self.current == OnboardingStatus::Complete
    }
}

/// Record that a creator's payouts were enabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayoutGrant {
    pub creator_id: CreatorId,
    pub stripe_account_id: String,
    pub granted_at: Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transition(previous: OnboardingStatus, current: OnboardingStatus) -> AccountTransition {
        AccountTransition {
            creator_id: CreatorId::new("C2").unwrap(),
            previous,
            current,
        }
    }

    #[test]
    fn partially_enabled_account_is_pending() {
        assert_eq!(OnboardingStatus::from_capabilities(true, false), OnboardingStatus::Pending);
        assert_eq!(OnboardingStatus::from_capabilities(false, true), OnboardingStatus::Pending);
        assert_eq!(OnboardingStatus::from_capabilities(false, false), OnboardingStatus::Pending);
    }

    #[test]
    fn fully_enabled_account_is_complete() {
        assert_eq!(OnboardingStatus::from_capabilities(true, true), OnboardingStatus::Complete);
    }

    #[test]
    fn became_complete_only_on_transition() {
        use OnboardingStatus::*;
        assert!(transition(Pending, Complete).became_complete());
        assert!(transition(NotStarted, Complete).became_complete());
        assert!(!transition(Complete, Complete).became_complete());
        assert!(!transition(Complete, Pending).became_complete());
        assert!(!transition(NotStarted, Pending).became_complete());
    }

    #[test]
    fn account_update_from_snapshot() {
        let update = AccountUpdate::from(&AccountSnapshot {
            id: "acct_1".to_string(),
            charges_enabled: true,
            payouts_enabled: false,
        });

        assert_eq!(update.stripe_account_id, "acct_1");
        assert_eq!(update.onboarding_status, OnboardingStatus::Pending);
    }

    #[test]
    fn apply_reports_previous_status() {
        let mut row = CreatorAccountRow {
            creator_id: CreatorId::new("C2").unwrap(),
            stripe_account_id: Some("acct_1".to_string()),
            charges_enabled: true,
            payouts_enabled: false,
            onboarding_status: OnboardingStatus::Pending,
        };
        let update = AccountUpdate::from(&AccountSnapshot {
            id: "acct_1".to_string(),
            charges_enabled: true,
            payouts_enabled: true,
        });

        let transition = row.apply(&update);

        assert!(transition.became_complete());
        assert!(row.payouts_enabled);
        assert_eq!(row.onboarding_status, OnboardingStatus::Complete);
    }

    #[test]
    fn onboarding_status_parses_stored_form() {
        assert_eq!(OnboardingStatus::parse("not_started").unwrap(), OnboardingStatus::NotStarted);
        assert!(OnboardingStatus::parse("completed").is_err());
    }
}
