use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::{JobState, MilestoneStatus, PublicKey};

/// The intent of a transition. `index` always names the milestone being modified.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobCommand {
    AgreeJob,
    StartMilestone { index: usize },
    FinishMilestone { index: usize },
    RejectMilestone { index: usize },
    AcceptMilestone { index: usize },
    PayMilestone { index: usize },
}

impl JobCommand {
    pub fn milestone_index(&self) -> Option<usize> {
        match self {
            JobCommand::AgreeJob => None,
            JobCommand::StartMilestone { index }
            | JobCommand::FinishMilestone { index }
            | JobCommand::RejectMilestone { index }
            | JobCommand::AcceptMilestone { index }
            | JobCommand::PayMilestone { index } => Some(*index),
        }
    }

    /// Status rule for milestone-level commands; `None` for [`JobCommand::AgreeJob`].
    pub fn status_rule(&self) -> Option<StatusRule> {
        use MilestoneStatus::*;

        let (from, to, signers) = match self {
            JobCommand::AgreeJob => return None,
            JobCommand::StartMilestone { .. } => (Unstarted, Started, Signers::Both),
            JobCommand::FinishMilestone { .. } => (Started, Completed, Signers::Contractor),
            JobCommand::RejectMilestone { .. } => (Completed, Started, Signers::Developer),
            JobCommand::AcceptMilestone { .. } => (Completed, Accepted, Signers::Developer),
            JobCommand::PayMilestone { .. } => (Accepted, Paid, Signers::Developer),
        };
        Some(StatusRule { from, to, signers })
    }

    pub fn name(&self) -> &'static str {
        match self {
            JobCommand::AgreeJob => "AgreeJob",
            JobCommand::StartMilestone { .. } => "StartMilestone",
            JobCommand::FinishMilestone { .. } => "FinishMilestone",
            JobCommand::RejectMilestone { .. } => "RejectMilestone",
            JobCommand::AcceptMilestone { .. } => "AcceptMilestone",
            JobCommand::PayMilestone { .. } => "PayMilestone",
        }
    }
}

impl fmt::Display for JobCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.milestone_index() {
            Some(index) => write!(f, "{}({})", self.name(), index),
            None => f.write_str(self.name()),
        }
    }
}

/// Side of the agreement a party is on.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Developer,
    Contractor,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Developer => f.write_str("developer"),
            Role::Contractor => f.write_str("contractor"),
        }
    }
}

/// Who must sign a milestone-level command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Signers {
    Both,
    Developer,
    Contractor,
}

impl Signers {
    pub fn roles(&self) -> &'static [Role] {
        match self {
            Signers::Both => &[Role::Developer, Role::Contractor],
            Signers::Developer => &[Role::Developer],
            Signers::Contractor => &[Role::Contractor],
        }
    }

    /// Keys of the required signers within `job`.
    pub fn keys(&self, job: &JobState) -> BTreeSet<PublicKey> {
        self.roles()
            .iter()
            .map(|role| match role {
                Role::Developer => job.developer.key,
                Role::Contractor => job.contractor.key,
            })
            .collect()
    }
}

/// Precondition, postcondition and signers a command imposes on its milestone.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusRule {
    pub from: MilestoneStatus,
    pub to: MilestoneStatus,
    pub signers: Signers,
}

/// A command together with the keys that sign the transition carrying it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Command {
    pub value: JobCommand,
    pub signers: BTreeSet<PublicKey>,
}

impl Command {
    pub fn new(value: JobCommand, signers: impl IntoIterator<Item = PublicKey>) -> Self {
        Self {
            value,
            signers: signers.into_iter().collect(),
        }
    }

    pub fn is_signed_by(&self, key: &PublicKey) -> bool {
        self.signers.contains(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_rules_follow_the_milestone_lifecycle() {
        let rule = JobCommand::RejectMilestone { index: 0 }.status_rule().unwrap();
        assert_eq!(rule.from, MilestoneStatus::Completed);
        assert_eq!(rule.to, MilestoneStatus::Started);
        assert_eq!(rule.signers, Signers::Developer);

        let rule = JobCommand::FinishMilestone { index: 3 }.status_rule().unwrap();
        assert_eq!(rule.signers.roles(), &[Role::Contractor]);
        assert!(JobCommand::AgreeJob.status_rule().is_none());
    }

    #[test]
    fn commands_serialize_as_tagged_variants() {
        let json = serde_json::to_string(&JobCommand::PayMilestone { index: 1 }).unwrap();
        assert_eq!(json, r#"{"type":"pay_milestone","index":1}"#);
        let agree: JobCommand = serde_json::from_str(r#"{"type":"agree_job"}"#).unwrap();
        assert_eq!(agree, JobCommand::AgreeJob);
        assert_eq!(JobCommand::StartMilestone { index: 2 }.to_string(), "StartMilestone(2)");
    }
}
