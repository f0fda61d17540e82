use crate::ens;
use crate::identity::Address;
use crate::CensusError;
use serde::Deserialize;
use serde_json::{Value, json};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// The block every fetch of a run is pinned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockHeight(pub u64);

impl BlockHeight {
    /// JSON-RPC quantity form, e.g. `0xed14f1`.
    pub fn to_quantity(&self) -> String {
        format!("{:#x}", self.0)
    }
}

impl fmt::Display for BlockHeight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for BlockHeight {
    type Err = CensusError;

    /// Decimal or `0x`-prefixed hex.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(hex) => u64::from_str_radix(hex, 16),
            None => s.parse::<u64>(),
        };
        parsed
            .map(BlockHeight)
            .map_err(|e| CensusError::Config(format!("invalid block height {:?}: {}", s, e)))
    }
}

/// Read access to account state at a historical block.
///
/// Implementations return `RpcTransport` for any network or protocol
/// failure. `reverse_resolve_name` may additionally return `RpcDecode` when
/// the on-chain resolver answers with something that is not a name.
pub trait ChainReader {
    fn get_balance(&mut self, address: &Address, block: BlockHeight) -> Result<u128, CensusError>;
    fn get_transaction_count(
        &mut self,
        address: &Address,
        block: BlockHeight,
    ) -> Result<u64, CensusError>;
    fn reverse_resolve_name(
        &mut self,
        address: &Address,
        block: BlockHeight,
    ) -> Result<String, CensusError>;
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

/// Blocking JSON-RPC client over HTTP.
pub struct JsonRpcClient {
    http: reqwest::blocking::Client,
    url: String,
    registry: Address,
    next_id: u64,
}

impl JsonRpcClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, CensusError> {
        let http = reqwest::blocking::Client::builder().timeout(timeout).build()?;
        let registry = ens::ENS_REGISTRY
            .parse()
            .map_err(|e| CensusError::Config(format!("ens registry: {}", e)))?;
        Ok(Self {
            http,
            url: url.into(),
            registry,
            next_id: 1,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn call(&mut self, method: &str, params: Value) -> Result<Value, CensusError> {
        let id = self.next_id;
        self.next_id += 1;

        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        debug!("[rpc] -> {} id={}", method, id);

        let response: RpcResponse = self
            .http
            .post(&self.url)
            .json(&body)
            .send()?
            .error_for_status()?
            .json()?;

        if let Some(err) = response.error {
            return Err(CensusError::RpcTransport(format!(
                "{} failed with code {}: {}",
                method, err.code, err.message
            )));
        }
        response.result.ok_or_else(|| {
            CensusError::RpcTransport(format!("{} returned neither result nor error", method))
        })
    }

    fn eth_call(
        &mut self,
        to: &Address,
        data: &[u8],
        block: BlockHeight,
    ) -> Result<Vec<u8>, CensusError> {
        let result = self.call(
            "eth_call",
            json!([
                { "to": to.to_checksum(), "data": format!("0x{}", hex::encode(data)) },
                block.to_quantity(),
            ]),
        )?;
        let text = result.as_str().ok_or_else(|| {
            CensusError::RpcTransport("eth_call result is not a string".to_string())
        })?;
        let digits = text.strip_prefix("0x").unwrap_or(text);
        hex::decode(digits)
            .map_err(|e| CensusError::RpcTransport(format!("eth_call result is not hex: {}", e)))
    }
}

impl ChainReader for JsonRpcClient {
    fn get_balance(&mut self, address: &Address, block: BlockHeight) -> Result<u128, CensusError> {
        let params = json!([address.to_checksum(), block.to_quantity()]);
        let result = self.call("eth_getBalance", params)?;
        parse_quantity(&result)
    }

    fn get_transaction_count(
        &mut self,
        address: &Address,
        block: BlockHeight,
    ) -> Result<u64, CensusError> {
        let params = json!([address.to_checksum(), block.to_quantity()]);
        let result = self.call("eth_getTransactionCount", params)?;
        let count = parse_quantity(&result)?;
        u64::try_from(count).map_err(|_| {
            CensusError::RpcTransport(format!("transaction count {} overflows u64", count))
        })
    }

    fn reverse_resolve_name(
        &mut self,
        address: &Address,
        block: BlockHeight,
    ) -> Result<String, CensusError> {
        let node = ens::namehash(&ens::reverse_name(address));

        let registry = self.registry;
        let resolver_word = self.eth_call(&registry, &ens::resolver_calldata(&node), block)?;
        let resolver = ens::decode_address(&resolver_word)?;
        if resolver.is_zero() {
            return Ok(String::new());
        }

        let name_data = self.eth_call(&resolver, &ens::name_calldata(&node), block)?;
        ens::decode_string(&name_data)
    }
}

/// Parse a JSON-RPC hex quantity.
pub fn parse_quantity(value: &Value) -> Result<u128, CensusError> {
    let text = value
        .as_str()
        .ok_or_else(|| CensusError::RpcTransport(format!("expected hex quantity, got {}", value)))?;
    let digits = text
        .strip_prefix("0x")
        .ok_or_else(|| CensusError::RpcTransport(format!("quantity {:?} lacks 0x prefix", text)))?;
    if digits.is_empty() {
        return Err(CensusError::RpcTransport("empty quantity".to_string()));
    }
    u128::from_str_radix(digits, 16)
        .map_err(|e| CensusError::RpcTransport(format!("quantity {:?}: {}", text, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_height_parse() {
        assert_eq!("0xED14F1".parse::<BlockHeight>().unwrap(), BlockHeight(15_537_393));
        assert_eq!("15537393".parse::<BlockHeight>().unwrap(), BlockHeight(15_537_393));
        assert!("latest".parse::<BlockHeight>().is_err());
    }

    #[test]
    fn test_block_height_quantity() {
        assert_eq!(BlockHeight(15_537_393).to_quantity(), "0xed14f1");
        assert_eq!(BlockHeight(0).to_quantity(), "0x0");
    }

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity(&json!("0x0")).unwrap(), 0);
        let two_ether = parse_quantity(&json!("0x1bc16d674ec80000")).unwrap();
        assert_eq!(two_ether, 2_000_000_000_000_000_000);
    }

    #[test]
    fn test_parse_quantity_failures_are_transport_errors() {
        for bad in [json!(12), json!("12"), json!("0x"), json!("0xzz")] {
            assert!(matches!(parse_quantity(&bad), Err(CensusError::RpcTransport(_))), "{}", bad);
        }
    }

    #[test]
    fn test_unreachable_endpoint_is_transport_error() {
        let mut client =
            JsonRpcClient::new("http://127.0.0.1:9", Duration::from_millis(500)).unwrap();
        let address: Address = "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed".parse().unwrap();
        let result = client.get_balance(&address, BlockHeight(1));
        assert!(matches!(result, Err(CensusError::RpcTransport(_))));
    }
}
