//! Reverse name resolution helpers: namehash and the little ABI encoding the
//! registry and resolver calls need.

use crate::identity::Address;
use crate::CensusError;
use sha3::{Digest, Keccak256};

/// Mainnet ENS registry.
pub const ENS_REGISTRY: &str = "0x00000000000C2E074eC69A0dFb2997BA6C7d2e1e";

/// `resolver(bytes32)`
const RESOLVER_SELECTOR: [u8; 4] = [0x01, 0x78, 0xb8, 0xbf];
/// `name(bytes32)`
const NAME_SELECTOR: [u8; 4] = [0x69, 0x1f, 0x34, 0x31];

pub fn namehash(name: &str) -> [u8; 32] {
    let mut node = [0u8; 32];
    if name.is_empty() {
        return node;
    }
    for label in name.rsplit('.') {
        let label_hash = Keccak256::digest(label.as_bytes());
        let mut hasher = Keccak256::new();
        hasher.update(node);
        hasher.update(label_hash);
        node.copy_from_slice(&hasher.finalize());
    }
    node
}

/// The reverse record name for an address: `<lowercase hex>.addr.reverse`.
pub fn reverse_name(address: &Address) -> String {
    format!("{}.addr.reverse", address.to_lower_hex())
}

pub fn resolver_calldata(node: &[u8; 32]) -> Vec<u8> {
    call_with_node(RESOLVER_SELECTOR, node)
}

pub fn name_calldata(node: &[u8; 32]) -> Vec<u8> {
    call_with_node(NAME_SELECTOR, node)
}

fn call_with_node(selector: [u8; 4], node: &[u8; 32]) -> Vec<u8> {
    let mut data = Vec::with_capacity(36);
    data.extend_from_slice(&selector);
    data.extend_from_slice(node);
    data
}

/// Decode a single ABI `address` return word.
pub fn decode_address(data: &[u8]) -> Result<Address, CensusError> {
    if data.len() < 32 {
        return Err(CensusError::RpcDecode(format!(
            "address return is {} bytes, expected 32",
            data.len()
        )));
    }
    if data[..12].iter().any(|&b| b != 0) {
        return Err(CensusError::RpcDecode("address word has dirty high bytes".to_string()));
    }
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&data[12..32]);
    Ok(Address::from_bytes(bytes))
}

/// Decode a single ABI dynamic `string` return value.
pub fn decode_string(data: &[u8]) -> Result<String, CensusError> {
    let offset = read_usize_word(data, 0)?;
    let len = read_usize_word(data, offset)?;
    let start = offset
        .checked_add(32)
        .ok_or_else(|| CensusError::RpcDecode("string offset overflow".to_string()))?;
    let end = start
        .checked_add(len)
        .filter(|&end| end <= data.len())
        .ok_or_else(|| {
            CensusError::RpcDecode(format!("string of {} bytes runs past return data", len))
        })?;
    String::from_utf8(data[start..end].to_vec())
        .map_err(|e| CensusError::RpcDecode(format!("name is not utf-8: {}", e)))
}

fn read_usize_word(data: &[u8], at: usize) -> Result<usize, CensusError> {
    let word = at
        .checked_add(32)
        .and_then(|end| data.get(at..end))
        .ok_or_else(|| {
            CensusError::RpcDecode(format!("return data too short for word at {}", at))
        })?;
    if word[..24].iter().any(|&b| b != 0) {
        return Err(CensusError::RpcDecode(format!("word at {} does not fit in usize", at)));
    }
    let mut tail = [0u8; 8];
    tail.copy_from_slice(&word[24..]);
    usize::try_from(u64::from_be_bytes(tail))
        .map_err(|_| CensusError::RpcDecode(format!("word at {} does not fit in usize", at)))
}
