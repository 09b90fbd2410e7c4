//! Core primitives for milestone escrow.
//!
//! A developer commissions work from a contractor; the work is split into
//! ordered milestones that each walk their own lifecycle. Every change to a job
//! is expressed as a [`Transition`] that consumes the previous version of the
//! record and produces its successor, and the [`JobContract`] decides whether
//! that transition is legal:
//!
//! * [`model`]: job records, milestones, parties and amounts.
//! * [`command`]: the closed set of commands and the status rule each one
//!   enforces on its target milestone.
//! * [`settlement`]: the cash leg that pays for a milestone.
//! * [`policy`]: validation switches loaded from configuration.
//! * [`contract`]: the validator itself.
//!
//! Nothing in this crate performs I/O or holds shared state, so the validator
//! can be called from any number of threads at once.

pub mod command;
pub mod contract;
pub mod model;
pub mod policy;
pub mod settlement;
pub mod transition;

mod error;

#[cfg(test)]
mod property_tests;

pub use command::{Command, JobCommand, Role, Signers, StatusRule};
pub use contract::{verify, JobContract};
pub use error::{ModelError, ValidationError};
pub use model::{Amount, Currency, JobState, LinearId, Milestone, MilestoneStatus, Party, PublicKey};
pub use policy::Policy;
pub use settlement::{CashCommand, CashState, Settlement};
pub use transition::Transition;
