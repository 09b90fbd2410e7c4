use serde::{Deserialize, Serialize};

/// Switches that tighten or relax the validator.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Policy {
    /// Reject agreements whose milestones are priced in more than one currency.
    pub single_currency: bool,
    /// Reject `PayMilestone` transitions that carry no cash settlement.
    pub require_settlement: bool,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            single_currency: true,
            require_settlement: false,
        }
    }
}

impl Policy {
    pub fn strict() -> Self {
        Self {
            single_currency: true,
            require_settlement: true,
        }
    }
}
