//! Job records and the values they are made of.
//!
//! Every type here is an immutable value with structural equality. A job is
//! never edited in place: a successor version is derived with
//! [`JobState::with_milestone_status`] and the old version is consumed by a
//! [`crate::Transition`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Raw ed25519 verifying key of a party.
///
/// The validator compares keys by value only; signature checks belong to the
/// signer-set resolver that feeds it.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PublicKey(#[serde(with = "hex_bytes")] pub [u8; 32]);

impl PublicKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for PublicKey {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        hex_bytes::decode_array(s).map(PublicKey).map_err(ModelError::InvalidKey)
    }
}

/// A named identity holding a signing key.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Party {
    pub name: String,
    pub key: PublicKey,
}

impl Party {
    pub fn new(name: impl Into<String>, key: PublicKey) -> Self {
        Self {
            name: name.into(),
            key,
        }
    }

    /// Parties are the same party when they share a key, whatever their names.
    pub fn is_same_party(&self, other: &Party) -> bool {
        self.key == other.key
    }
}

/// Upper-case currency or token code such as `USD`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    pub fn new(code: &str) -> Result<Self, ModelError> {
        let valid = !code.is_empty()
            && code.len() <= 12
            && code.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit());
        if !valid {
            return Err(ModelError::InvalidCurrency(code.to_string()));
        }
        Ok(Self(code.to_string()))
    }

    pub fn code(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Currency {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Currency::new(&value)
    }
}

impl From<Currency> for String {
    fn from(value: Currency) -> Self {
        value.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Quantity in the smallest unit of a single currency, whatever its
/// number of decimal places. Displayed as the raw quantity.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Amount {
    pub quantity: u64,
    pub currency: Currency,
}

impl Amount {
    pub fn new(quantity: u64, currency: Currency) -> Self {
        Self { quantity, currency }
    }

    /// Adds two amounts of the same currency; `None` on a currency mismatch or overflow.
    pub fn checked_add(&self, other: &Amount) -> Option<Amount> {
        if self.currency != other.currency {
            return None;
        }
        Some(Amount {
            quantity: self.quantity.checked_add(other.quantity)?,
            currency: self.currency.clone(),
        })
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.quantity, self.currency)
    }
}

/// Lifecycle of a single milestone.
///
/// ```text
/// UNSTARTED ──► STARTED ──► COMPLETED ──► ACCEPTED ──► PAID
///                  ▲            │
///                  └────────────┘ (rejected)
/// ```
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MilestoneStatus {
    Unstarted,
    Started,
    Completed,
    Accepted,
    Paid,
}

impl MilestoneStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MilestoneStatus::Unstarted => "UNSTARTED",
            MilestoneStatus::Started => "STARTED",
            MilestoneStatus::Completed => "COMPLETED",
            MilestoneStatus::Accepted => "ACCEPTED",
            MilestoneStatus::Paid => "PAID",
        }
    }
}

impl fmt::Display for MilestoneStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One billable unit of work. Description and amount are fixed once agreed.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Milestone {
    pub description: String,
    pub amount: Amount,
    #[serde(default = "unstarted")]
    pub status: MilestoneStatus,
}

fn unstarted() -> MilestoneStatus {
    MilestoneStatus::Unstarted
}

impl Milestone {
    pub fn new(description: impl Into<String>, amount: Amount) -> Self {
        Self {
            description: description.into(),
            amount,
            status: MilestoneStatus::Unstarted,
        }
    }

    pub fn with_status(&self, status: MilestoneStatus) -> Self {
        Self {
            status,
            ..self.clone()
        }
    }

    /// True when only the status differs between the two milestones.
    pub fn same_terms(&self, other: &Milestone) -> bool {
        self.description == other.description && self.amount == other.amount
    }
}

/// Identifier shared by every version of one job.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LinearId(#[serde(with = "hex_bytes")] pub [u8; 16]);

impl LinearId {
    pub fn random() -> Self {
        Self(rand::random())
    }
}

impl fmt::Display for LinearId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for LinearId {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        hex_bytes::decode_array(s)
            .map(LinearId)
            .map_err(ModelError::InvalidLinearId)
    }
}

/// One version of an agreement between a developer and a contractor.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobState {
    pub developer: Party,
    pub contractor: Party,
    pub milestones: Vec<Milestone>,
    pub linear_id: LinearId,
}

impl JobState {
    /// A fresh job under a new linear id.
    pub fn new(developer: Party, contractor: Party, milestones: Vec<Milestone>) -> Self {
        Self {
            developer,
            contractor,
            milestones,
            linear_id: LinearId::random(),
        }
    }

    pub fn participants(&self) -> [&Party; 2] {
        [&self.developer, &self.contractor]
    }

    pub fn milestone(&self, index: usize) -> Result<&Milestone, ModelError> {
        self.milestones.get(index).ok_or(ModelError::NoSuchMilestone {
            index,
            len: self.milestones.len(),
        })
    }

    /// The successor version with milestone `index` set to `status`.
    pub fn with_milestone_status(
        &self,
        index: usize,
        status: MilestoneStatus,
    ) -> Result<JobState, ModelError> {
        let updated = self.milestone(index)?.with_status(status);
        let mut milestones = self.milestones.clone();
        milestones[index] = updated;
        Ok(JobState {
            milestones,
            ..self.clone()
        })
    }

    pub fn currency(&self) -> Option<&Currency> {
        self.milestones.first().map(|m| &m.amount.currency)
    }

    pub fn total_amount(&self) -> Option<Amount> {
        sum_amounts(self.milestones.iter())
    }

    pub fn amount_paid(&self) -> Option<Amount> {
        let paid = self
            .milestones
            .iter()
            .filter(|m| m.status == MilestoneStatus::Paid);
        match sum_amounts(paid) {
            Some(total) => Some(total),
            None => self.currency().map(|c| Amount::new(0, c.clone())),
        }
    }

    /// Every milestone has been paid; no further transition applies.
    pub fn is_settled(&self) -> bool {
        !self.milestones.is_empty()
            && self
                .milestones
                .iter()
                .all(|m| m.status == MilestoneStatus::Paid)
    }
}

fn sum_amounts<'a>(mut milestones: impl Iterator<Item = &'a Milestone>) -> Option<Amount> {
    let first = milestones.next()?.amount.clone();
    milestones.try_fold(first, |acc, m| acc.checked_add(&m.amount))
}

pub(crate) mod hex_bytes {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S, const N: usize>(value: &[u8; N], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(value))
    }

    pub fn deserialize<'de, D, const N: usize>(deserializer: D) -> Result<[u8; N], D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        decode_array(&encoded).map_err(D::Error::custom)
    }

    pub fn decode_array<const N: usize>(encoded: &str) -> Result<[u8; N], String> {
        let bytes = hex::decode(encoded.trim()).map_err(|e| e.to_string())?;
        let len = bytes.len();
        bytes
            .try_into()
            .map_err(|_| format!("expected {N} bytes, got {len}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usd(dollars: u64) -> Amount {
        Amount::new(dollars * 100, Currency::new("USD").unwrap())
    }

    fn job() -> JobState {
        JobState::new(
            Party::new("John Doe", PublicKey([1u8; 32])),
            Party::new("Richard Roe", PublicKey([2u8; 32])),
            vec![
                Milestone::new("Fit windows", usd(100)),
                Milestone::new("Fit doors", usd(50)),
            ],
        )
    }

    #[test]
    fn functional_update_leaves_original_untouched() {
        let original = job();
        let next = original
            .with_milestone_status(1, MilestoneStatus::Started)
            .unwrap();
        assert_eq!(original.milestones[1].status, MilestoneStatus::Unstarted);
        assert_eq!(next.milestones[1].status, MilestoneStatus::Started);
        assert_eq!(next.milestones[0], original.milestones[0]);
        assert_eq!(next.linear_id, original.linear_id);
    }

    #[test]
    fn functional_update_rejects_out_of_bounds_index() {
        let err = job()
            .with_milestone_status(2, MilestoneStatus::Started)
            .unwrap_err();
        assert_eq!(err, ModelError::NoSuchMilestone { index: 2, len: 2 });
    }

    #[test]
    fn totals_and_settlement() {
        let mut state = job();
        assert_eq!(state.total_amount(), Some(usd(150)));
        assert_eq!(state.amount_paid(), Some(usd(0)));
        assert!(!state.is_settled());
        for m in &mut state.milestones {
            m.status = MilestoneStatus::Paid;
        }
        assert_eq!(state.amount_paid(), Some(usd(150)));
        assert!(state.is_settled());
    }

    #[test]
    fn amounts_display_their_raw_quantity() {
        let yen = Amount::new(1_500, Currency::new("JPY").unwrap());
        let dinar = Amount::new(1_500, Currency::new("KWD").unwrap());
        assert_eq!(yen.to_string(), "1500 JPY");
        assert_eq!(dinar.to_string(), "1500 KWD");
    }

    #[test]
    fn mixed_currencies_have_no_total() {
        let mut state = job();
        state.milestones[1].amount.currency = Currency::new("GBP").unwrap();
        assert_eq!(state.total_amount(), None);
    }

    #[test]
    fn keys_and_statuses_serialize_readably() {
        let key = PublicKey([0xab; 32]);
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, format!("\"{}\"", "ab".repeat(32)));
        assert_eq!(serde_json::from_str::<PublicKey>(&json).unwrap(), key);

        let status = serde_json::to_string(&MilestoneStatus::Unstarted).unwrap();
        assert_eq!(status, "\"UNSTARTED\"");
        assert!("zz".parse::<PublicKey>().is_err());
        assert!(Currency::new("usd").is_err());
    }

    #[test]
    fn milestone_status_defaults_to_unstarted_when_omitted() {
        let json = r#"{"description":"Fit doors","amount":{"quantity":5000,"currency":"USD"}}"#;
        let milestone: Milestone = serde_json::from_str(json).unwrap();
        assert_eq!(milestone, Milestone::new("Fit doors", usd(50)));
    }
}
