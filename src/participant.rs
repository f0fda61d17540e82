use crate::identity::Address;
use serde::{Deserialize, Serialize};

/// Number of ceremony rounds (powers-of-tau sizes 2^12 through 2^15).
pub const ROUNDS: usize = 4;

/// Public material a participant submitted for one round.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundWitness {
    pub pot_pubkey: String,
    pub bls_signature: String,
}

/// One row of the dataset.
///
/// Transcript-sourced fields are copied verbatim and never recomputed.
/// `balance`, `nonce` and `ens` stay `None` until fetched; once set they are
/// never fetched again. An empty `ens` string means the lookup ran and found
/// nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantRecord {
    pub participant_id: String,
    pub address: Option<Address>,
    pub witnesses: [RoundWitness; ROUNDS],
    pub ecdsa_signature: String,
    pub balance: Option<u128>,
    pub nonce: Option<u64>,
    pub ens: Option<String>,
}

impl ParticipantRecord {
    pub fn new(
        participant_id: impl Into<String>,
        witnesses: [RoundWitness; ROUNDS],
        ecdsa_signature: impl Into<String>,
    ) -> Self {
        Self {
            participant_id: participant_id.into(),
            address: None,
            witnesses,
            ecdsa_signature: ecdsa_signature.into(),
            balance: None,
            nonce: None,
            ens: None,
        }
    }

    /// Witness for the first (smallest) round.
    pub fn first_round(&self) -> &RoundWitness {
        &self.witnesses[0]
    }
}
