use crate::CensusError;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use std::fmt;
use std::str::FromStr;

/// Prefix carried by participants who signed in with an Ethereum account.
pub const CHAIN_IDENTITY_PREFIX: &str = "eth|";

/// A 20-byte account address. Displays in EIP-55 checksum form.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address([u8; 20]);

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);

    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Address(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    /// Lowercase hex without the `0x` prefix.
    pub fn to_lower_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn to_checksum(&self) -> String {
        let lower = self.to_lower_hex();
        let hash = Keccak256::digest(lower.as_bytes());

        let mut out = String::with_capacity(42);
        out.push_str("0x");
        for (i, c) in lower.chars().enumerate() {
            let byte = hash[i / 2];
            let nibble = if i % 2 == 0 { byte >> 4 } else { byte & 0x0f };
            if c.is_ascii_alphabetic() && nibble >= 8 {
                out.push(c.to_ascii_uppercase());
            } else {
                out.push(c);
            }
        }
        out
    }
}

impl FromStr for Address {
    type Err = String;

    /// Accepts 40 hex digits in any case, with or without `0x`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        if digits.len() != 40 {
            return Err(format!("expected 40 hex digits, found {}", digits.len()));
        }
        let mut bytes = [0u8; 20];
        hex::decode_to_slice(digits, &mut bytes).map_err(|e| format!("not hex: {}", e))?;
        Ok(Address(bytes))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_checksum())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_checksum())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignInMethod {
    Ethereum,
    Other,
}

pub fn sign_in_method(participant_id: &str) -> SignInMethod {
    if participant_id.starts_with(CHAIN_IDENTITY_PREFIX) {
        SignInMethod::Ethereum
    } else {
        SignInMethod::Other
    }
}

/// Derive the account address encoded in a participant id.
///
/// Returns `Ok(None)` for ids from other sign-in providers and
/// `InvalidAddress` when the id carries the chain prefix but the remainder
/// does not parse.
pub fn resolve(participant_id: &str) -> Result<Option<Address>, CensusError> {
    let Some(remainder) = participant_id.strip_prefix(CHAIN_IDENTITY_PREFIX) else {
        return Ok(None);
    };
    remainder
        .parse::<Address>()
        .map(Some)
        .map_err(|reason| CensusError::InvalidAddress {
            participant_id: participant_id.to_string(),
            reason,
        })
}
