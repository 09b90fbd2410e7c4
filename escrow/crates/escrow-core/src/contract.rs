//! The milestone escrow validator.
//!
//! [`JobContract::verify`] inspects a proposed [`Transition`] and either
//! accepts it or names the first rule it breaks. Checks run in a fixed order so
//! the same invalid transition always yields the same reason:
//!
//! | Command          | consumed | produced | milestone `i`           | signers                |
//! |------------------|----------|----------|-------------------------|------------------------|
//! | AgreeJob         | 0        | 1        | all UNSTARTED           | developer + contractor |
//! | StartMilestone   | 1        | 1        | UNSTARTED → STARTED     | developer + contractor |
//! | FinishMilestone  | 1        | 1        | STARTED → COMPLETED     | contractor             |
//! | RejectMilestone  | 1        | 1        | COMPLETED → STARTED     | developer              |
//! | AcceptMilestone  | 1        | 1        | COMPLETED → ACCEPTED    | developer              |
//! | PayMilestone     | 1        | 1        | ACCEPTED → PAID         | developer              |
//!
//! Apart from milestone `i`'s status, the consumed and produced records must
//! be identical.

use tracing::debug;

use crate::command::{Command, JobCommand, Role, Signers, StatusRule};
use crate::error::ValidationError;
use crate::model::{JobState, MilestoneStatus};
use crate::policy::Policy;
use crate::transition::Transition;

/// Verifies `transition` under the default [`Policy`].
pub fn verify(transition: &Transition) -> Result<(), ValidationError> {
    JobContract::default().verify(transition)
}

#[derive(Clone, Debug, Default)]
pub struct JobContract {
    policy: Policy,
}

impl JobContract {
    pub fn new(policy: Policy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn verify(&self, transition: &Transition) -> Result<(), ValidationError> {
        let command = transition.command.value;
        let result = match (command.milestone_index(), command.status_rule()) {
            (Some(index), Some(rule)) => self.verify_milestone_change(transition, index, rule),
            _ => self.verify_agreement(transition),
        };
        match &result {
            Ok(()) => debug!(%command, "transition accepted"),
            Err(reason) => debug!(%command, %reason, "transition rejected"),
        }
        result
    }

    fn verify_agreement(&self, tx: &Transition) -> Result<(), ValidationError> {
        if !tx.inputs.is_empty() {
            return Err(ValidationError::InputsConsumed);
        }
        let job = match tx.outputs.as_slice() {
            [job] => job,
            _ => return Err(ValidationError::ExpectedOneOutput),
        };
        if tx.settlement.is_some() {
            return Err(ValidationError::UnexpectedSettlement);
        }

        if job.milestones.is_empty() {
            return Err(ValidationError::NoMilestones);
        }
        if job.developer.is_same_party(&job.contractor) {
            return Err(ValidationError::SameParties);
        }
        if job
            .milestones
            .iter()
            .any(|m| m.status != MilestoneStatus::Unstarted)
        {
            return Err(ValidationError::MilestonesNotUnstarted);
        }
        if self.policy.single_currency {
            let currency = &job.milestones[0].amount.currency;
            if job.milestones.iter().any(|m| &m.amount.currency != currency) {
                return Err(ValidationError::MixedCurrencies);
            }
        }

        require_signers(&tx.command, job, Signers::Both)
    }

    fn verify_milestone_change(
        &self,
        tx: &Transition,
        index: usize,
        rule: StatusRule,
    ) -> Result<(), ValidationError> {
        let input = match tx.inputs.as_slice() {
            [job] => job,
            _ => return Err(ValidationError::ExpectedOneInput),
        };
        let output = match tx.outputs.as_slice() {
            [job] => job,
            _ => return Err(ValidationError::ExpectedOneOutput),
        };
        let is_payment = matches!(tx.command.value, JobCommand::PayMilestone { .. });
        if tx.settlement.is_some() && !is_payment {
            return Err(ValidationError::UnexpectedSettlement);
        }

        let before = input
            .milestones
            .get(index)
            .ok_or(ValidationError::IndexOutOfBounds {
                index,
                len: input.milestones.len(),
            })?;
        let after = output
            .milestones
            .get(index)
            .ok_or(ValidationError::IndexOutOfBounds {
                index,
                len: output.milestones.len(),
            })?;

        if before.status != rule.from {
            return Err(ValidationError::InputStatus {
                expected: rule.from,
            });
        }
        if after.status != rule.to {
            return Err(ValidationError::OutputStatus { expected: rule.to });
        }
        if !before.same_terms(after) {
            return Err(ValidationError::MilestoneTermsChanged);
        }

        let others_unchanged = input.milestones.len() == output.milestones.len()
            && input
                .milestones
                .iter()
                .zip(&output.milestones)
                .enumerate()
                .all(|(i, (a, b))| i == index || a == b);
        if !others_unchanged {
            return Err(ValidationError::OtherMilestonesModified);
        }
        if input.developer != output.developer
            || input.contractor != output.contractor
            || input.linear_id != output.linear_id
        {
            return Err(ValidationError::JobTermsChanged);
        }

        require_signers(&tx.command, input, rule.signers)?;

        if is_payment {
            match &tx.settlement {
                Some(leg) => {
                    leg.verify_payment(before, &input.developer.key, &input.contractor.key)?
                }
                None if self.policy.require_settlement => {
                    return Err(ValidationError::MissingSettlement)
                }
                None => {}
            }
        }
        Ok(())
    }
}

fn require_signers(
    command: &Command,
    job: &JobState,
    signers: Signers,
) -> Result<(), ValidationError> {
    let signed = signers.keys(job).iter().all(|key| command.is_signed_by(key));
    if signed {
        return Ok(());
    }
    Err(match signers {
        Signers::Both => ValidationError::MissingPartySigners,
        Signers::Developer => ValidationError::MissingSigner(Role::Developer),
        Signers::Contractor => ValidationError::MissingSigner(Role::Contractor),
    })
}
