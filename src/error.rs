use std::fmt;

#[derive(Debug)]
pub enum CensusError {
    /// Transcript lists are misaligned or a required field is absent.
    MalformedTranscript(String),
    /// A chain-identity participant id whose remainder is not an address.
    InvalidAddress { participant_id: String, reason: String },
    /// Network, HTTP or JSON-RPC protocol failure. Always fatal.
    RpcTransport(String),
    /// Malformed contract response during name resolution.
    RpcDecode(String),
    /// The dataset could not be written or read back.
    Persistence(String),
    Config(String),
    Deserialization(Box<bincode::error::DecodeError>),
    Io(std::io::Error),
    Other(String),
}

impl fmt::Display for CensusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CensusError::MalformedTranscript(e) => write!(f, "Malformed transcript: {}", e),
            CensusError::InvalidAddress { participant_id, reason } => {
                write!(f, "Invalid address in participant id {}: {}", participant_id, reason)
            }
            CensusError::RpcTransport(e) => write!(f, "RPC transport error: {}", e),
            CensusError::RpcDecode(e) => write!(f, "RPC decode error: {}", e),
            CensusError::Persistence(e) => write!(f, "Persistence error: {}", e),
            CensusError::Config(e) => write!(f, "Configuration error: {}", e),
            CensusError::Deserialization(e) => write!(f, "Deserialization error: {}", e),
            CensusError::Io(e) => write!(f, "IO error: {}", e),
            CensusError::Other(e) => write!(f, "Error: {}", e),
        }
    }
}

impl std::error::Error for CensusError {}

impl CensusError {
    /// Whether the error is recoverable by recording an empty name.
    pub fn is_decode(&self) -> bool {
        matches!(self, CensusError::RpcDecode(_))
    }

    /// Append a note to the message while keeping the variant where it carries text.
    pub fn with_note(self, note: impl fmt::Display) -> Self {
        match self {
            CensusError::MalformedTranscript(m) => {
                CensusError::MalformedTranscript(format!("{}; {}", m, note))
            }
            CensusError::RpcTransport(m) => CensusError::RpcTransport(format!("{}; {}", m, note)),
            CensusError::RpcDecode(m) => CensusError::RpcDecode(format!("{}; {}", m, note)),
            CensusError::Persistence(m) => CensusError::Persistence(format!("{}; {}", m, note)),
            CensusError::Config(m) => CensusError::Config(format!("{}; {}", m, note)),
            CensusError::Other(m) => CensusError::Other(format!("{}; {}", m, note)),
            other => CensusError::Other(format!("{}; {}", other, note)),
        }
    }
}

impl From<bincode::error::EncodeError> for CensusError {
    fn from(err: bincode::error::EncodeError) -> Self {
        CensusError::Persistence(format!("encode: {}", err))
    }
}

impl From<bincode::error::DecodeError> for CensusError {
    fn from(err: bincode::error::DecodeError) -> Self {
        CensusError::Deserialization(Box::new(err))
    }
}

impl From<std::io::Error> for CensusError {
    fn from(err: std::io::Error) -> Self {
        CensusError::Io(err)
    }
}

impl From<reqwest::Error> for CensusError {
    fn from(err: reqwest::Error) -> Self {
        CensusError::RpcTransport(err.to_string())
    }
}

impl From<csv::Error> for CensusError {
    fn from(err: csv::Error) -> Self {
        CensusError::Other(format!("csv: {}", err))
    }
}

impl From<String> for CensusError {
    fn from(err: String) -> Self {
        CensusError::Other(err)
    }
}

impl From<&str> for CensusError {
    fn from(err: &str) -> Self {
        CensusError::Other(err.to_string())
    }
}
