use serde::{Deserialize, Serialize};

use crate::command::{Command, JobCommand};
use crate::model::{JobState, PublicKey};
use crate::settlement::Settlement;

/// A proposed replacement of consumed job versions by produced ones.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transition {
    #[serde(default)]
    pub inputs: Vec<JobState>,
    #[serde(default)]
    pub outputs: Vec<JobState>,
    pub command: Command,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settlement: Option<Settlement>,
}

impl Transition {
    /// Creation of a new job: nothing consumed, one record produced.
    pub fn agree(output: JobState, signers: impl IntoIterator<Item = PublicKey>) -> Self {
        Self {
            inputs: Vec::new(),
            outputs: vec![output],
            command: Command::new(JobCommand::AgreeJob, signers),
            settlement: None,
        }
    }

    /// One version replaced by its successor.
    pub fn evolve(
        input: JobState,
        output: JobState,
        command: JobCommand,
        signers: impl IntoIterator<Item = PublicKey>,
    ) -> Self {
        Self {
            inputs: vec![input],
            outputs: vec![output],
            command: Command::new(command, signers),
            settlement: None,
        }
    }

    pub fn with_settlement(mut self, settlement: Settlement) -> Self {
        self.settlement = Some(settlement);
        self
    }
}
