//! Signature collection and signer-set resolution.
//!
//! Parties sign the SHA-256 digest of a transition's canonical JSON. Before a
//! transition reaches the validator, every attached signature is checked and
//! the verified keys must cover the signer set declared on its command.

use std::collections::BTreeSet;

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use escrow_core::{PublicKey, Transition};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const DIGEST_DOMAIN: &[u8] = b"escrow-transition-v1";

pub fn transition_digest(tx: &Transition) -> Result<[u8; 32], SignatureError> {
    let encoded = serde_json::to_vec(tx)?;
    let mut hasher = Sha256::new();
    hasher.update(DIGEST_DOMAIN);
    hasher.update(&encoded);
    Ok(hasher.finalize().into())
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PartySignature {
    pub key: PublicKey,
    #[serde(with = "crate::signing::serde_bytes")]
    pub signature: Vec<u8>,
}

/// A transition together with the signatures collected so far.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignedTransition {
    pub tx: Transition,
    #[serde(default)]
    pub signatures: Vec<PartySignature>,
}

impl SignedTransition {
    pub fn new(tx: Transition) -> Self {
        Self {
            tx,
            signatures: Vec::new(),
        }
    }

    pub fn digest(&self) -> Result<[u8; 32], SignatureError> {
        transition_digest(&self.tx)
    }

    /// Adds (or replaces) the signature of `signing_key`.
    pub fn sign(&mut self, signing_key: &SigningKey) -> Result<PublicKey, SignatureError> {
        let digest = self.digest()?;
        let signature = signing_key.sign(&digest);
        let key = public_key(signing_key);
        self.signatures.retain(|s| s.key != key);
        self.signatures.push(PartySignature {
            key,
            signature: signature.to_bytes().to_vec(),
        });
        Ok(key)
    }

    /// Checks every attached signature and returns the keys that signed.
    pub fn resolve_signers(&self) -> Result<BTreeSet<PublicKey>, SignatureError> {
        let digest = self.digest()?;
        let mut verified = BTreeSet::new();
        for sig in &self.signatures {
            let key = VerifyingKey::from_bytes(sig.key.as_bytes())
                .map_err(|_| SignatureError::MalformedKey(sig.key))?;
            let signature = Signature::from_slice(&sig.signature)
                .map_err(|_| SignatureError::MalformedSignature(sig.key))?;
            key.verify_strict(&digest, &signature)
                .map_err(|_| SignatureError::InvalidSignature(sig.key))?;
            verified.insert(sig.key);
        }
        Ok(verified)
    }

    /// Like [`Self::resolve_signers`], and additionally requires a signature
    /// from every key the command declares.
    pub fn verify_signatures(&self) -> Result<BTreeSet<PublicKey>, SignatureError> {
        let verified = self.resolve_signers()?;
        let missing: Vec<PublicKey> = self
            .tx
            .command
            .signers
            .difference(&verified)
            .copied()
            .collect();
        if !missing.is_empty() {
            return Err(SignatureError::MissingSignatures { missing });
        }
        Ok(verified)
    }
}

pub fn public_key(signing_key: &SigningKey) -> PublicKey {
    PublicKey(signing_key.verifying_key().to_bytes())
}

pub fn generate_signing_key() -> SigningKey {
    let mut sk_bytes = [0u8; 32];
    OsRng.fill_bytes(&mut sk_bytes);
    SigningKey::from_bytes(&sk_bytes)
}

pub fn parse_signing_key(sk_hex: &str) -> Result<SigningKey, SignatureError> {
    let bytes = hex::decode(sk_hex.trim())
        .map_err(|e| SignatureError::InvalidSecretKey(e.to_string()))?;
    let arr: [u8; 32] = bytes
        .try_into()
        .map_err(|_| SignatureError::InvalidSecretKey("expected 32 bytes (64 hex chars)".into()))?;
    Ok(SigningKey::from_bytes(&arr))
}

#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("unable to encode transition: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("invalid secret key: {0}")]
    InvalidSecretKey(String),
    #[error("key {0} is not a valid ed25519 public key")]
    MalformedKey(PublicKey),
    #[error("malformed signature from {0}")]
    MalformedSignature(PublicKey),
    #[error("invalid signature from {0}")]
    InvalidSignature(PublicKey),
    #[error("missing signatures from {}", join_keys(.missing))]
    MissingSignatures { missing: Vec<PublicKey> },
}

fn join_keys(keys: &[PublicKey]) -> String {
    keys.iter()
        .map(PublicKey::to_hex)
        .collect::<Vec<_>>()
        .join(", ")
}


pub(crate) mod serde_bytes {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        hex::decode(&encoded).map_err(D::Error::custom)
    }
}
