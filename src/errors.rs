//! CLI error type and exit codes.

use std::{io, path::PathBuf};

use escrow_core::{ModelError, ValidationError};
use thiserror::Error;

use crate::flows::FlowError;
use crate::ledger::LedgerError;
use crate::signing::SignatureError;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("unable to read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("unable to write {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },

    #[error("malformed JSON in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid configuration in {}: {source}", path.display())]
    Config {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("{} does not hold exactly one job version", path.display())]
    NotAJob { path: PathBuf },

    #[error("journal line {line}: {source}")]
    JournalEntry {
        line: usize,
        source: serde_json::Error,
    },

    #[error("journal line {line}: {source}")]
    Journal { line: usize, source: LedgerError },

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Signature(#[from] SignatureError),

    #[error(transparent)]
    Flow(#[from] FlowError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("{0}")]
    Rejected(#[from] ValidationError),
}

pub type Result<T> = std::result::Result<T, CliError>;

impl CliError {
    /// 2 when a transition was rejected, 1 for everything else.
    pub fn exit_code(&self) -> u8 {
        if self.is_rejection() {
            2
        } else {
            1
        }
    }

    fn is_rejection(&self) -> bool {
        match self {
            CliError::Rejected(_) => true,
            CliError::Flow(err) => matches!(err, FlowError::Rejected(_)),
            CliError::Signature(err) => signature_rejects(err),
            CliError::Ledger(err) | CliError::Journal { source: err, .. } => ledger_rejects(err),
            _ => false,
        }
    }
}

fn signature_rejects(err: &SignatureError) -> bool {
    !matches!(
        err,
        SignatureError::Encode(_) | SignatureError::InvalidSecretKey(_)
    )
}

fn ledger_rejects(err: &LedgerError) -> bool {
    match err {
        LedgerError::Signature(err) => signature_rejects(err),
        LedgerError::BalanceOverflow { .. } => false,
        _ => true,
    }
}
