//! Property-based tests for the validator
//!
//! These tests use proptest to check the validator's invariants across many
//! generated jobs and transitions.

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use crate::command::JobCommand;
    use crate::contract::{verify, JobContract};
    use crate::error::ValidationError;
    use crate::model::{Amount, Currency, JobState, Milestone, MilestoneStatus, Party, PublicKey};
    use crate::transition::Transition;

    const DEVELOPER: PublicKey = PublicKey([1u8; 32]);
    const CONTRACTOR: PublicKey = PublicKey([2u8; 32]);

    // ===== STRATEGY HELPERS =====

    fn any_status() -> impl Strategy<Value = MilestoneStatus> {
        prop_oneof![
            Just(MilestoneStatus::Unstarted),
            Just(MilestoneStatus::Started),
            Just(MilestoneStatus::Completed),
            Just(MilestoneStatus::Accepted),
            Just(MilestoneStatus::Paid),
        ]
    }

    fn any_milestone() -> impl Strategy<Value = Milestone> {
        ("[A-Za-z ]{1,24}", 1u64..1_000_000, any_status()).prop_map(|(description, cents, status)| {
            Milestone::new(description, Amount::new(cents, Currency::new("USD").unwrap()))
                .with_status(status)
        })
    }

    fn any_job() -> impl Strategy<Value = JobState> {
        prop::collection::vec(any_milestone(), 1..6).prop_map(|milestones| {
            JobState::new(
                Party::new("developer", DEVELOPER),
                Party::new("contractor", CONTRACTOR),
                milestones,
            )
        })
    }

    fn command_for(kind: u8, index: usize) -> JobCommand {
        match kind % 5 {
            0 => JobCommand::StartMilestone { index },
            1 => JobCommand::FinishMilestone { index },
            2 => JobCommand::RejectMilestone { index },
            3 => JobCommand::AcceptMilestone { index },
            _ => JobCommand::PayMilestone { index },
        }
    }

    fn all_signers() -> [PublicKey; 2] {
        [DEVELOPER, CONTRACTOR]
    }

    proptest! {
        /// A well-formed transition is accepted exactly when the milestone is in the rule's input status.
        #[test]
        fn prop_verdict_depends_on_input_status(job in any_job(), kind in any::<u8>(), pick in any::<prop::sample::Index>()) {
            let index = pick.index(job.milestones.len());
            let command = command_for(kind, index);
            let rule = command.status_rule().unwrap();
            let output = job.with_milestone_status(index, rule.to).unwrap();
            let tx = Transition::evolve(job.clone(), output, command, all_signers());

            let result = verify(&tx);
            if job.milestones[index].status == rule.from {
                prop_assert_eq!(result, Ok(()));
            } else {
                prop_assert_eq!(result, Err(ValidationError::InputStatus { expected: rule.from }));
            }
        }

        /// Touching any milestone other than the target is always rejected.
        #[test]
        fn prop_other_milestones_are_frozen(job in any_job(), kind in any::<u8>(), extra in 1u64..1_000) {
            prop_assume!(job.milestones.len() >= 2);
            let command = command_for(kind, 0);
            let rule = command.status_rule().unwrap();
            let mut input = job.clone();
            input.milestones[0].status = rule.from;
            let mut output = input.with_milestone_status(0, rule.to).unwrap();
            output.milestones[1].amount.quantity += extra;

            let tx = Transition::evolve(input, output, command, all_signers());
            prop_assert_eq!(verify(&tx), Err(ValidationError::OtherMilestonesModified));
        }

        /// Any index at or past the end of the job is a fatal error.
        #[test]
        fn prop_out_of_bounds_index_is_rejected(job in any_job(), kind in any::<u8>(), past in 0usize..10) {
            let len = job.milestones.len();
            let command = command_for(kind, len + past);
            let tx = Transition::evolve(job.clone(), job, command, all_signers());
            prop_assert_eq!(verify(&tx), Err(ValidationError::IndexOutOfBounds { index: len + past, len }));
        }

        /// Verification is deterministic: the same input always yields the same verdict.
        #[test]
        fn prop_verdict_is_repeatable(job in any_job(), kind in any::<u8>(), pick in any::<prop::sample::Index>(), to in any_status()) {
            let index = pick.index(job.milestones.len());
            let output = job.with_milestone_status(index, to).unwrap();
            let tx = Transition::evolve(job, output, command_for(kind, index), [DEVELOPER]);
            let contract = JobContract::default();
            prop_assert_eq!(contract.verify(&tx), contract.verify(&tx));
        }

        /// Agreement between a party and itself never verifies.
        #[test]
        fn prop_self_agreement_fails(job in any_job()) {
            let mut job = job;
            job.contractor = job.developer.clone();
            for m in &mut job.milestones {
                m.status = MilestoneStatus::Unstarted;
            }
            let tx = Transition::agree(job, all_signers());
            prop_assert_eq!(verify(&tx), Err(ValidationError::SameParties));
        }

        /// Agreement with any milestone already in progress never verifies.
        #[test]
        fn prop_agreement_requires_unstarted(job in any_job()) {
            prop_assume!(job.milestones.iter().any(|m| m.status != MilestoneStatus::Unstarted));
            let tx = Transition::agree(job, all_signers());
            prop_assert_eq!(verify(&tx), Err(ValidationError::MilestonesNotUnstarted));
        }
    }
}
