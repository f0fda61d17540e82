#![allow(dead_code)]

use ceremony_census::identity::Address;
use ceremony_census::rpc::{BlockHeight, ChainReader};
use ceremony_census::CensusError;
use rustc_hash::{FxHashMap, FxHashSet};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread::{self, JoinHandle};

pub fn address(n: u64) -> String {
    format!("0x{:040x}", n)
}

pub fn eth_id(n: u64) -> String {
    format!("eth|{}", address(n))
}

/// Build a transcript JSON document. An anchor entry is prepended at index 0.
pub fn transcript_json(ids: &[String]) -> String {
    let mut all_ids = vec![String::new()];
    all_ids.extend(ids.iter().cloned());

    let rounds: Vec<serde_json::Value> = (0..4)
        .map(|round| {
            let pubkeys: Vec<String> = (0..all_ids.len())
                .map(|i| format!("0x{:02x}{:04x}", round, i))
                .collect();
            let sigs: Vec<Option<String>> = (0..all_ids.len())
                .map(|i| if i == 0 { None } else { Some(format!("0xb{:02x}{:04x}", round, i)) })
                .collect();
            serde_json::json!({ "witness": { "potPubkeys": pubkeys, "blsSignatures": sigs } })
        })
        .collect();
    let ecdsa: Vec<Option<String>> = (0..all_ids.len())
        .map(|i| if i == 0 { None } else { Some(format!("0xe{:04x}", i)) })
        .collect();

    serde_json::json!({
        "participantIds": all_ids,
        "participantEcdsaSignatures": ecdsa,
        "transcripts": rounds,
    })
    .to_string()
}

/// Deterministic in-memory chain.
///
/// Balances and nonces are derived from the address bytes unless overridden.
/// Addresses in `transport_failures` answer every call with `RpcTransport`.
/// `decode_failures` only break name resolution and `balance_decode_failures`
/// only break balance reads. `panic_after` aborts the process-equivalent
/// after that many calls.
#[derive(Default)]
pub struct StubChain {
    pub balances: FxHashMap<Address, u128>,
    pub names: FxHashMap<Address, String>,
    pub transport_failures: FxHashSet<Address>,
    pub decode_failures: FxHashSet<Address>,
    pub balance_decode_failures: FxHashSet<Address>,
    pub panic_after: Option<usize>,
    pub calls: Vec<(&'static str, Address)>,
}

impl StubChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls_for(&self, method: &str) -> Vec<Address> {
        self.calls.iter().filter(|(m, _)| *m == method).map(|(_, a)| *a).collect()
    }

    fn record(&mut self, method: &'static str, address: &Address) -> Result<(), CensusError> {
        if let Some(limit) = self.panic_after {
            if self.calls.len() >= limit {
                panic!("simulated crash after {} calls", limit);
            }
        }
        self.calls.push((method, *address));
        if self.transport_failures.contains(address) {
            return Err(CensusError::RpcTransport(format!("node refused {}", method)));
        }
        Ok(())
    }

    fn seed(address: &Address) -> u64 {
        address.as_bytes()[12..].iter().fold(0u64, |acc, b| acc << 8 | *b as u64)
    }
}

impl ChainReader for StubChain {
    fn get_balance(&mut self, address: &Address, _block: BlockHeight) -> Result<u128, CensusError> {
        self.record("balance", address)?;
        if self.balance_decode_failures.contains(address) {
            return Err(CensusError::RpcDecode("balance is not a quantity".to_string()));
        }
        Ok(self
            .balances
            .get(address)
            .copied()
            .unwrap_or(Self::seed(address) as u128 * 1_000_000_000_000_000))
    }

    fn get_transaction_count(
        &mut self,
        address: &Address,
        _block: BlockHeight,
    ) -> Result<u64, CensusError> {
        self.record("nonce", address)?;
        Ok(Self::seed(address) % 7)
    }

    fn reverse_resolve_name(
        &mut self,
        address: &Address,
        _block: BlockHeight,
    ) -> Result<String, CensusError> {
        self.record("ens", address)?;
        if self.decode_failures.contains(address) {
            return Err(CensusError::RpcDecode("invalid string offset".to_string()));
        }
        Ok(self.names.get(address).cloned().unwrap_or_default())
    }
}

/// JSON-RPC envelope carrying `result`.
pub fn rpc_result(result: &str) -> String {
    serde_json::json!({ "jsonrpc": "2.0", "id": 1, "result": result }).to_string()
}

/// JSON-RPC envelope carrying an error object.
pub fn rpc_error(code: i64, message: &str) -> String {
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": 1,
        "error": { "code": code, "message": message },
    })
    .to_string()
}

/// Serve one canned HTTP 200 body per connection, in order, on a local port.
///
/// Returns the base URL and a handle that yields the request bodies received.
pub fn serve(bodies: Vec<String>) -> (String, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());

    let handle = thread::spawn(move || {
        let mut requests = Vec::new();
        for body in bodies {
            let (mut stream, _) = listener.accept().unwrap();
            requests.push(read_request_body(&mut stream));
            let response = format!(
                concat!(
                    "HTTP/1.1 200 OK\r\n",
                    "Content-Type: application/json\r\n",
                    "Content-Length: {}\r\n",
                    "Connection: close\r\n\r\n{}"
                ),
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).unwrap();
            stream.flush().unwrap();
        }
        requests
    });
    (url, handle)
}

fn read_request_body(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = stream.read(&mut chunk).unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);

        let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
            continue;
        };
        let headers = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
        let len = headers
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        let start = end + 4;
        if buf.len() >= start + len {
            return String::from_utf8_lossy(&buf[start..start + len]).into_owned();
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}
