//! Cash leg attached to a `PayMilestone` transition.
//!
//! The asset ledger that actually moves value lives outside this crate. The
//! validator only checks that the leg it is shown spends the developer's cash,
//! pays the contractor exactly the milestone's amount in the milestone's
//! currency, and neither creates nor destroys value.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::model::{Amount, Milestone, PublicKey};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CashCommand {
    Issue,
    Move,
}

/// Cash held by `owner`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CashState {
    pub amount: Amount,
    pub owner: PublicKey,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Settlement {
    pub command: CashCommand,
    pub inputs: Vec<CashState>,
    pub outputs: Vec<CashState>,
}

impl Settlement {
    /// A move of `amount` from `payer` to `payee`.
    pub fn transfer(amount: Amount, payer: PublicKey, payee: PublicKey) -> Self {
        Self {
            command: CashCommand::Move,
            inputs: vec![CashState {
                amount: amount.clone(),
                owner: payer,
            }],
            outputs: vec![CashState {
                amount,
                owner: payee,
            }],
        }
    }

    fn states(&self) -> impl Iterator<Item = &CashState> {
        self.inputs.iter().chain(self.outputs.iter())
    }

    /// Checks the leg against the milestone being paid, the developer paying
    /// it and the contractor receiving it.
    pub fn verify_payment(
        &self,
        milestone: &Milestone,
        developer: &PublicKey,
        contractor: &PublicKey,
    ) -> Result<(), ValidationError> {
        if self.command != CashCommand::Move {
            return Err(ValidationError::CashCommandNotMove);
        }
        if self.inputs.iter().any(|s| &s.owner != developer) {
            return Err(ValidationError::ForeignCashInput);
        }

        let currency = &milestone.amount.currency;
        if self.states().any(|s| &s.amount.currency != currency) {
            return Err(ValidationError::CashCurrencyMismatch);
        }

        let input_total = total(self.inputs.iter());
        let output_total = total(self.outputs.iter());
        if input_total.is_none() || input_total != output_total {
            return Err(ValidationError::CashValueMismatch);
        }

        let paid = total(self.outputs.iter().filter(|s| &s.owner == contractor));
        if paid != Some(milestone.amount.quantity) {
            return Err(ValidationError::ContractorUnderpaid);
        }
        Ok(())
    }
}

fn total<'a>(mut states: impl Iterator<Item = &'a CashState>) -> Option<u64> {
    states.try_fold(0u64, |acc, s| acc.checked_add(s.amount.quantity))
}
