use thiserror::Error;

use crate::command::Role;
use crate::model::MilestoneStatus;

/// Errors raised while building or decoding model values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    /// A milestone index does not exist in the job.
    #[error("there is no milestone at index {index} (job has {len} milestones)")]
    NoSuchMilestone { index: usize, len: usize },

    /// Hex-encoded key material had the wrong shape.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Hex-encoded identifier had the wrong shape.
    #[error("invalid linear id: {0}")]
    InvalidLinearId(String),

    /// Currency codes are upper-case ASCII letters.
    #[error("invalid currency code {0:?}")]
    InvalidCurrency(String),
}

/// Reason a transition was rejected by the [`crate::JobContract`].
///
/// Every variant renders to a fixed sentence naming the rule that failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("No JobState inputs should be consumed.")]
    InputsConsumed,

    #[error("One JobState input should be consumed.")]
    ExpectedOneInput,

    #[error("One JobState output should be produced.")]
    ExpectedOneOutput,

    #[error("The job should have at least one milestone.")]
    NoMilestones,

    #[error("The developer and the contractor should be different parties.")]
    SameParties,

    #[error("All the milestones should be unstarted.")]
    MilestonesNotUnstarted,

    #[error("All the milestones should share the same currency.")]
    MixedCurrencies,

    #[error("The milestone index {index} is out of bounds for a job with {len} milestones.")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("The modified milestone should have an input status of {expected}.")]
    InputStatus { expected: MilestoneStatus },

    #[error("The modified milestone should have an output status of {expected}.")]
    OutputStatus { expected: MilestoneStatus },

    #[error("The modified milestone's description and amount shouldn't change.")]
    MilestoneTermsChanged,

    #[error("All the other milestones should be unmodified.")]
    OtherMilestonesModified,

    #[error("Only the modified milestone's status should change.")]
    JobTermsChanged,

    #[error("The developer and the contractor should be required signers.")]
    MissingPartySigners,

    #[error("The {0} should be a required signer.")]
    MissingSigner(Role),

    #[error("Only a PayMilestone transition may carry a cash settlement.")]
    UnexpectedSettlement,

    #[error("The Cash command should be Move.")]
    CashCommandNotMove,

    #[error("The cash inputs should all be owned by the developer.")]
    ForeignCashInput,

    #[error("The cash inputs and outputs should all be in the same currency as the modified milestone.")]
    CashCurrencyMismatch,

    #[error("The cash inputs and outputs should have the same value.")]
    CashValueMismatch,

    #[error("The cash outputs owned by the contractor should have the same value as the modified milestone.")]
    ContractorUnderpaid,

    #[error("The PayMilestone transition should carry a cash settlement.")]
    MissingSettlement,
}
