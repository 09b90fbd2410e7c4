//! Proposal builders.
//!
//! Each action derives the next version of a job from the current one, names
//! the signers its command needs and checks the result against the contract
//! before anyone is asked to sign.

use escrow_core::{
    JobCommand, JobContract, JobState, Milestone, ModelError, Party, PublicKey, Role, Settlement,
    Transition, ValidationError,
};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Terms both parties agree to when a job is created.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgreementTerms {
    pub developer: Party,
    pub contractor: Party,
    pub milestones: Vec<Milestone>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlowAction {
    Start { index: usize },
    Finish { index: usize },
    Accept { index: usize },
    Reject { index: usize },
    Pay { index: usize },
}

impl FlowAction {
    pub fn command(&self) -> JobCommand {
        match *self {
            FlowAction::Start { index } => JobCommand::StartMilestone { index },
            FlowAction::Finish { index } => JobCommand::FinishMilestone { index },
            FlowAction::Accept { index } => JobCommand::AcceptMilestone { index },
            FlowAction::Reject { index } => JobCommand::RejectMilestone { index },
            FlowAction::Pay { index } => JobCommand::PayMilestone { index },
        }
    }

    /// The side of the agreement allowed to start this action.
    pub fn initiator(&self) -> Role {
        match self {
            FlowAction::Start { .. } | FlowAction::Finish { .. } => Role::Contractor,
            FlowAction::Accept { .. } | FlowAction::Reject { .. } | FlowAction::Pay { .. } => {
                Role::Developer
            }
        }
    }
}

pub struct JobFlows<'a> {
    contract: &'a JobContract,
}

impl<'a> JobFlows<'a> {
    pub fn new(contract: &'a JobContract) -> Self {
        Self { contract }
    }

    /// Builds the transition creating a new job. Only the developer proposes jobs.
    pub fn agree(&self, initiator: &PublicKey, terms: AgreementTerms) -> Result<Transition, FlowError> {
        if &terms.developer.key != initiator {
            return Err(FlowError::WrongInitiator(Role::Developer));
        }
        let signers = [terms.developer.key, terms.contractor.key];
        let job = JobState::new(terms.developer, terms.contractor, terms.milestones);
        let tx = Transition::agree(job, signers);
        self.contract.verify(&tx)?;
        info!(linear_id = %tx.outputs[0].linear_id, "agreement proposed");
        Ok(tx)
    }

    /// Builds the transition applying `action` to the `current` version of a job.
    pub fn propose(
        &self,
        initiator: &PublicKey,
        current: &JobState,
        action: FlowAction,
    ) -> Result<Transition, FlowError> {
        if current.is_settled() {
            return Err(FlowError::Settled);
        }
        let expected = match action.initiator() {
            Role::Developer => &current.developer,
            Role::Contractor => &current.contractor,
        };
        if &expected.key != initiator {
            return Err(FlowError::WrongInitiator(action.initiator()));
        }

        let command = action.command();
        let (index, rule) = match (command.milestone_index(), command.status_rule()) {
            (Some(index), Some(rule)) => (index, rule),
            _ => return Err(FlowError::NotAMilestoneAction(command)),
        };
        let milestone = current.milestone(index)?;
        let output = current.with_milestone_status(index, rule.to)?;

        let mut tx = Transition::evolve(current.clone(), output, command, rule.signers.keys(current));
        if let FlowAction::Pay { .. } = action {
            tx = tx.with_settlement(Settlement::transfer(
                milestone.amount.clone(),
                current.developer.key,
                current.contractor.key,
            ));
        }

        self.contract.verify(&tx)?;
        info!(linear_id = %current.linear_id, %command, "transition proposed");
        Ok(tx)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error("The {0} must start this flow.")]
    WrongInitiator(Role),
    #[error("{0} does not target a milestone")]
    NotAMilestoneAction(JobCommand),
    #[error("every milestone is paid; the job accepts no further transitions")]
    Settled,
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("transition rejected: {0}")]
    Rejected(#[from] ValidationError),
}

#[cfg(test)]
mod tests {
    use super::*;

    use escrow_core::{Amount, CashCommand, Currency, MilestoneStatus};

    const DEVELOPER: PublicKey = PublicKey([1u8; 32]);
    const CONTRACTOR: PublicKey = PublicKey([2u8; 32]);

    fn usd(dollars: u64) -> Amount {
        Amount::new(dollars * 100, Currency::new("USD").unwrap())
    }

    fn terms() -> AgreementTerms {
        AgreementTerms {
            developer: Party::new("John Doe", DEVELOPER),
            contractor: Party::new("Richard Roe", CONTRACTOR),
            milestones: vec![
                Milestone::new("Fit windows", usd(100)),
                Milestone::new("Fit doors", usd(50)),
            ],
        }
    }

    #[test]
    fn flows_walk_a_milestone_to_paid() {
        let contract = JobContract::default();
        let flows = JobFlows::new(&contract);
        let agree = flows.agree(&DEVELOPER, terms()).unwrap();
        let mut job = agree.outputs[0].clone();

        for (who, action) in [
            (CONTRACTOR, FlowAction::Start { index: 1 }),
            (CONTRACTOR, FlowAction::Finish { index: 1 }),
            (DEVELOPER, FlowAction::Reject { index: 1 }),
            (CONTRACTOR, FlowAction::Finish { index: 1 }),
            (DEVELOPER, FlowAction::Accept { index: 1 }),
            (DEVELOPER, FlowAction::Pay { index: 1 }),
        ] {
            job = flows.propose(&who, &job, action).unwrap().outputs[0].clone();
        }
        assert_eq!(job.milestones[1].status, MilestoneStatus::Paid);
        assert_eq!(job.milestones[0].status, MilestoneStatus::Unstarted);
    }

    #[test]
    fn declared_signers_follow_the_command() {
        let contract = JobContract::default();
        let flows = JobFlows::new(&contract);
        let job = flows.agree(&DEVELOPER, terms()).unwrap().outputs[0].clone();

        let start = flows
            .propose(&CONTRACTOR, &job, FlowAction::Start { index: 0 })
            .unwrap();
        assert_eq!(start.command.signers.len(), 2);

        let started = start.outputs[0].clone();
        let finish = flows
            .propose(&CONTRACTOR, &started, FlowAction::Finish { index: 0 })
            .unwrap();
        assert_eq!(finish.command.signers.iter().collect::<Vec<_>>(), vec![&CONTRACTOR]);
    }

    #[test]
    fn payment_carries_a_cash_move() {
        let contract = JobContract::default();
        let flows = JobFlows::new(&contract);
        let mut job = flows.agree(&DEVELOPER, terms()).unwrap().outputs[0].clone();
        job.milestones[0].status = MilestoneStatus::Accepted;

        let tx = flows
            .propose(&DEVELOPER, &job, FlowAction::Pay { index: 0 })
            .unwrap();
        let leg = tx.settlement.unwrap();
        assert_eq!(leg.command, CashCommand::Move);
        assert_eq!(leg.outputs[0].owner, CONTRACTOR);
        assert_eq!(leg.outputs[0].amount, usd(100));
    }

    #[test]
    fn only_the_right_party_starts_a_flow() {
        let contract = JobContract::default();
        let flows = JobFlows::new(&contract);
        assert!(matches!(
            flows.agree(&CONTRACTOR, terms()),
            Err(FlowError::WrongInitiator(Role::Developer))
        ));

        let job = flows.agree(&DEVELOPER, terms()).unwrap().outputs[0].clone();
        let err = flows
            .propose(&DEVELOPER, &job, FlowAction::Start { index: 0 })
            .unwrap_err();
        assert_eq!(err.to_string(), "The contractor must start this flow.");
    }

    #[test]
    fn illegal_proposals_are_caught_before_signing() {
        let contract = JobContract::default();
        let flows = JobFlows::new(&contract);
        let job = flows.agree(&DEVELOPER, terms()).unwrap().outputs[0].clone();

        let err = flows
            .propose(&DEVELOPER, &job, FlowAction::Accept { index: 0 })
            .unwrap_err();
        assert!(matches!(
            err,
            FlowError::Rejected(ValidationError::InputStatus { expected: MilestoneStatus::Completed })
        ));

        let err = flows
            .propose(&CONTRACTOR, &job, FlowAction::Start { index: 7 })
            .unwrap_err();
        assert!(matches!(err, FlowError::Model(ModelError::NoSuchMilestone { index: 7, len: 2 })));
    }

    #[test]
    fn settled_jobs_accept_nothing_further() {
        let contract = JobContract::default();
        let flows = JobFlows::new(&contract);
        let mut job = flows.agree(&DEVELOPER, terms()).unwrap().outputs[0].clone();
        for m in &mut job.milestones {
            m.status = MilestoneStatus::Paid;
        }
        assert!(matches!(
            flows.propose(&DEVELOPER, &job, FlowAction::Pay { index: 0 }),
            Err(FlowError::Settled)
        ));
    }

    #[test]
    fn self_dealing_agreement_is_rejected() {
        let contract = JobContract::default();
        let flows = JobFlows::new(&contract);
        let mut terms = terms();
        terms.contractor.key = DEVELOPER;
        assert!(matches!(
            flows.agree(&DEVELOPER, terms),
            Err(FlowError::Rejected(ValidationError::SameParties))
        ));
    }
}
