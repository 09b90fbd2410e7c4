use std::collections::{BTreeMap, BTreeSet};

use escrow_core::{
    Amount, Currency, JobCommand, JobContract, JobState, LinearId, MilestoneStatus, PublicKey,
    Settlement, ValidationError,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::signing::{SignatureError, SignedTransition};

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("insufficient {currency} funds held by {owner}")]
    InsufficientFunds { owner: PublicKey, currency: Currency },
    #[error("balance overflow for {owner}")]
    BalanceOverflow { owner: PublicKey },
    #[error("There is no JobState with linear ID {0}")]
    UnknownJob(LinearId),
    #[error("job {0} has already been agreed")]
    DuplicateJob(LinearId),
    #[error("input for job {0} is not its latest unconsumed version")]
    StaleInput(LinearId),
    #[error("duplicate transition detected")]
    DuplicateTransition,
    #[error(transparent)]
    Signature(#[from] SignatureError),
    #[error("transition rejected: {0}")]
    Rejected(#[from] ValidationError),
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SnapshotMetadata {
    pub height: u64,
    pub timestamp: u64,
    pub previous_transition: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Balance {
    pub owner: PublicKey,
    pub amount: Amount,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerSnapshot {
    pub meta: SnapshotMetadata,
    pub jobs: Vec<JobState>,
    pub balances: Vec<Balance>,
    pub events: Vec<LedgerEvent>,
    pub merkle_root: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    CashIssued {
        owner: PublicKey,
        amount: Amount,
    },
    JobAgreed {
        linear_id: LinearId,
        developer: PublicKey,
        contractor: PublicKey,
        milestones: usize,
    },
    MilestoneAdvanced {
        linear_id: LinearId,
        index: usize,
        from: MilestoneStatus,
        to: MilestoneStatus,
    },
    MilestonePaid {
        linear_id: LinearId,
        index: usize,
        amount: Amount,
    },
}

/// One line of a replay journal.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JournalEntry {
    Issue { owner: PublicKey, amount: Amount },
    Transition(SignedTransition),
}

type Balances = BTreeMap<(PublicKey, Currency), u64>;

/// In-memory record of the latest job versions and cash balances.
///
/// Nothing here is persisted; a ledger is rebuilt from its journal.
#[derive(Default)]
pub struct JobLedger {
    pub meta: SnapshotMetadata,
    contract: JobContract,
    jobs: BTreeMap<LinearId, JobState>,
    balances: Balances,
    events: Vec<LedgerEvent>,
    applied: BTreeSet<[u8; 32]>,
}

impl JobLedger {
    pub fn new(contract: JobContract) -> Self {
        Self {
            contract,
            ..Self::default()
        }
    }

    pub fn issue_cash(&mut self, owner: PublicKey, amount: Amount) -> Result<(), LedgerError> {
        credit(&mut self.balances, &owner, &amount)?;
        info!(%owner, %amount, "cash issued");
        self.events.push(LedgerEvent::CashIssued { owner, amount });
        Ok(())
    }

    pub fn apply_entry(&mut self, entry: &JournalEntry, timestamp: u64) -> Result<(), LedgerError> {
        match entry {
            JournalEntry::Issue { owner, amount } => self.issue_cash(*owner, amount.clone()),
            JournalEntry::Transition(signed) => self.apply(signed, timestamp).map(|_| ()),
        }
    }

    /// Validates and records a signed transition, returning its digest.
    ///
    /// Either every effect is applied or none is.
    pub fn apply(
        &mut self,
        signed: &SignedTransition,
        timestamp: u64,
    ) -> Result<[u8; 32], LedgerError> {
        let result = self.try_apply(signed, timestamp);
        if let Err(err) = &result {
            warn!(command = %signed.tx.command.value, error = %err, "transition not applied");
        }
        result
    }

    fn try_apply(
        &mut self,
        signed: &SignedTransition,
        timestamp: u64,
    ) -> Result<[u8; 32], LedgerError> {
        let digest = signed.digest()?;
        if self.applied.contains(&digest) {
            return Err(LedgerError::DuplicateTransition);
        }
        signed.verify_signatures()?;

        let tx = &signed.tx;
        for input in &tx.inputs {
            match self.jobs.get(&input.linear_id) {
                None => return Err(LedgerError::UnknownJob(input.linear_id)),
                Some(latest) if latest != input => {
                    return Err(LedgerError::StaleInput(input.linear_id))
                }
                Some(_) => {}
            }
        }
        self.contract.verify(tx)?;

        let consumed: BTreeSet<LinearId> = tx.inputs.iter().map(|j| j.linear_id).collect();
        for output in &tx.outputs {
            if self.jobs.contains_key(&output.linear_id) && !consumed.contains(&output.linear_id) {
                return Err(LedgerError::DuplicateJob(output.linear_id));
            }
        }

        let mut balances = self.balances.clone();
        if let Some(leg) = &tx.settlement {
            settle(&mut balances, leg)?;
        }

        let events = transition_events(signed);
        self.balances = balances;
        for id in &consumed {
            self.jobs.remove(id);
        }
        for output in &tx.outputs {
            self.jobs.insert(output.linear_id, output.clone());
        }
        self.events.extend(events);
        self.applied.insert(digest);
        self.meta.height += 1;
        self.meta.timestamp = timestamp;
        self.meta.previous_transition = Some(hex::encode(digest));

        info!(
            command = %tx.command.value,
            height = self.meta.height,
            "transition applied"
        );
        Ok(digest)
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            meta: self.meta.clone(),
            jobs: self.jobs.values().cloned().collect(),
            balances: self
                .balances
                .iter()
                .map(|((owner, currency), quantity)| Balance {
                    owner: *owner,
                    amount: Amount::new(*quantity, currency.clone()),
                })
                .collect(),
            events: self.events.clone(),
            merkle_root: hex::encode(compute_merkle_root(&self.jobs, &self.balances)),
        }
    }
}

#[cfg(test)]
impl JobLedger {
    fn job(&self, linear_id: &LinearId) -> Option<&JobState> {
        self.jobs.get(linear_id)
    }

    fn balance(&self, owner: &PublicKey, currency: &Currency) -> u64 {
        self.balances
            .get(&(*owner, currency.clone()))
            .copied()
            .unwrap_or(0)
    }

    fn events(&self) -> &[LedgerEvent] {
        &self.events
    }
}

fn credit(balances: &mut Balances, owner: &PublicKey, amount: &Amount) -> Result<(), LedgerError> {
    let balance = balances
        .entry((*owner, amount.currency.clone()))
        .or_insert(0);
    *balance = balance
        .checked_add(amount.quantity)
        .ok_or(LedgerError::BalanceOverflow { owner: *owner })?;
    Ok(())
}

fn debit(balances: &mut Balances, owner: &PublicKey, amount: &Amount) -> Result<(), LedgerError> {
    let insufficient = || LedgerError::InsufficientFunds {
        owner: *owner,
        currency: amount.currency.clone(),
    };
    let balance = balances
        .get_mut(&(*owner, amount.currency.clone()))
        .ok_or_else(insufficient)?;
    if *balance < amount.quantity {
        return Err(insufficient());
    }
    *balance -= amount.quantity;
    Ok(())
}

fn settle(balances: &mut Balances, leg: &Settlement) -> Result<(), LedgerError> {
    for input in &leg.inputs {
        debit(balances, &input.owner, &input.amount)?;
    }
    for output in &leg.outputs {
        credit(balances, &output.owner, &output.amount)?;
    }
    Ok(())
}

fn transition_events(signed: &SignedTransition) -> Vec<LedgerEvent> {
    let tx = &signed.tx;
    let mut events = Vec::new();
    match tx.command.value.milestone_index() {
        None => {
            for job in &tx.outputs {
                events.push(LedgerEvent::JobAgreed {
                    linear_id: job.linear_id,
                    developer: job.developer.key,
                    contractor: job.contractor.key,
                    milestones: job.milestones.len(),
                });
            }
        }
        Some(index) => {
            for (input, output) in tx.inputs.iter().zip(&tx.outputs) {
                let (Some(before), Some(after)) =
                    (input.milestones.get(index), output.milestones.get(index))
                else {
                    continue;
                };
                events.push(LedgerEvent::MilestoneAdvanced {
                    linear_id: output.linear_id,
                    index,
                    from: before.status,
                    to: after.status,
                });
                if let (JobCommand::PayMilestone { .. }, Some(_)) =
                    (tx.command.value, &tx.settlement)
                {
                    events.push(LedgerEvent::MilestonePaid {
                        linear_id: output.linear_id,
                        index,
                        amount: after.amount.clone(),
                    });
                }
            }
        }
    }
    events
}

fn compute_merkle_root(jobs: &BTreeMap<LinearId, JobState>, balances: &Balances) -> [u8; 32] {
    let mut leaves: Vec<[u8; 32]> = Vec::new();
    for (linear_id, job) in jobs {
        let mut hasher = Sha256::new();
        hasher.update(b"job");
        hasher.update(linear_id.0);
        for party in job.participants() {
            hasher.update(party.key.as_bytes());
            update_str(&mut hasher, &party.name);
        }
        hasher.update((job.milestones.len() as u64).to_le_bytes());
        for milestone in &job.milestones {
            update_str(&mut hasher, &milestone.description);
            hasher.update(milestone.amount.quantity.to_le_bytes());
            update_str(&mut hasher, milestone.amount.currency.code());
            update_str(&mut hasher, milestone.status.as_str());
        }
        leaves.push(hasher.finalize().into());
    }
    for ((owner, currency), quantity) in balances {
        let mut hasher = Sha256::new();
        hasher.update(b"acct");
        hasher.update(owner.as_bytes());
        update_str(&mut hasher, currency.code());
        hasher.update(quantity.to_le_bytes());
        leaves.push(hasher.finalize().into());
    }
    build_merkle(leaves)
}

/// Length-prefixed so adjacent fields cannot run into each other.
fn update_str(hasher: &mut Sha256, value: &str) {
    hasher.update((value.len() as u64).to_le_bytes());
    hasher.update(value.as_bytes());
}

fn build_merkle(mut leaves: Vec<[u8; 32]>) -> [u8; 32] {
    if leaves.is_empty() {
        return Sha256::digest(b"escrow-ledger-empty").into();
    }
    while leaves.len() > 1 {
        let mut next = Vec::with_capacity((leaves.len() + 1) / 2);
        for chunk in leaves.chunks(2) {
            let mut hasher = Sha256::new();
            hasher.update(b"node");
            hasher.update(chunk[0]);
            if chunk.len() == 2 {
                hasher.update(chunk[1]);
            } else {
                hasher.update(chunk[0]);
            }
            next.push(hasher.finalize().into());
        }
        leaves = next;
    }
    leaves[0]
}
