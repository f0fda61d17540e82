use crate::identity::Address;
use crate::participant::{ParticipantRecord, ROUNDS, RoundWitness};
use crate::CensusError;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const MAGIC: [u8; 4] = *b"CCDS";
/// Version 1 predates reverse name resolution and has no `ens` column.
const FORMAT_VERSION: u32 = 2;

/// The participant table, indexed by participant id.
///
/// Rows keep insertion order. All reads and writes that target a single row
/// go through the id index rather than positions.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    records: Vec<ParticipantRecord>,
    index: FxHashMap<String, usize>,
}

impl PartialEq for Dataset {
    fn eq(&self, other: &Self) -> bool {
        self.records == other.records
    }
}

impl Eq for Dataset {}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Vec::with_capacity(capacity),
            index: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
        }
    }

    /// Build a table from rows that must already be unique by id.
    pub fn from_records(records: Vec<ParticipantRecord>) -> Result<Self, CensusError> {
        let mut dataset = Self::with_capacity(records.len());
        for record in records {
            let id = record.participant_id.clone();
            if !dataset.push_unique(record) {
                return Err(CensusError::Other(format!("duplicate participant id {}", id)));
            }
        }
        Ok(dataset)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[ParticipantRecord] {
        &self.records
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParticipantRecord> {
        self.records.iter()
    }

    pub fn contains(&self, participant_id: &str) -> bool {
        self.index.contains_key(participant_id)
    }

    pub fn get(&self, participant_id: &str) -> Option<&ParticipantRecord> {
        self.index.get(participant_id).map(|&i| &self.records[i])
    }

    /// Rows with a resolved address.
    pub fn addressed(&self) -> impl Iterator<Item = (&ParticipantRecord, Address)> {
        self.records
            .iter()
            .filter_map(|r| r.address.map(|a| (r, a)))
    }

    pub fn into_records(self) -> Vec<ParticipantRecord> {
        self.records
    }

    /// Mutable access for in-crate writers. The id must not be changed.
    pub(crate) fn get_mut(&mut self, participant_id: &str) -> Option<&mut ParticipantRecord> {
        match self.index.get(participant_id) {
            Some(&i) => Some(&mut self.records[i]),
            None => None,
        }
    }

    /// Append a row unless its id is already present. Returns whether it was added.
    pub(crate) fn push_unique(&mut self, record: ParticipantRecord) -> bool {
        if self.index.contains_key(&record.participant_id) {
            return false;
        }
        self.index.insert(record.participant_id.clone(), self.records.len());
        self.records.push(record);
        true
    }
}

#[derive(Serialize, Deserialize)]
struct Header {
    magic: [u8; 4],
    version: u32,
}

#[derive(Deserialize)]
struct RecordV1 {
    participant_id: String,
    address: Option<Address>,
    witnesses: [RoundWitness; ROUNDS],
    ecdsa_signature: String,
    balance: Option<u128>,
    nonce: Option<u64>,
}

impl From<RecordV1> for ParticipantRecord {
    fn from(v1: RecordV1) -> Self {
        ParticipantRecord {
            participant_id: v1.participant_id,
            address: v1.address,
            witnesses: v1.witnesses,
            ecdsa_signature: v1.ecdsa_signature,
            balance: v1.balance,
            nonce: v1.nonce,
            ens: None,
        }
    }
}

/// Durable storage for the dataset: one file, replaced atomically on save.
#[derive(Debug, Clone)]
pub struct DatasetStore {
    path: PathBuf,
    temp_path: PathBuf,
}

impl DatasetStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut temp_name = path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "participants.bin".into());
        temp_name.push(".tmp");
        let temp_path = path.with_file_name(temp_name);
        Self { path, temp_path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the whole dataset. On return the file on disk holds exactly this snapshot.
    pub fn save(&self, dataset: &Dataset) -> Result<(), CensusError> {
        let config = bincode::config::standard();
        let header = Header { magic: MAGIC, version: FORMAT_VERSION };

        let mut bytes = bincode::serde::encode_to_vec(&header, config)?;
        bytes.extend(bincode::serde::encode_to_vec(dataset.records(), config)?);

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| self.persistence("create directory", e))?;
            }
        }

        // Remove temp file if it exists from a previous failed save
        if self.temp_path.exists() {
            fs::remove_file(&self.temp_path).map_err(|e| self.persistence("remove stale temp", e))?;
        }

        let mut file =
            File::create(&self.temp_path).map_err(|e| self.persistence("create temp", e))?;
        file.write_all(&bytes).map_err(|e| self.persistence("write", e))?;
        file.sync_all().map_err(|e| self.persistence("sync", e))?;
        drop(file);

        fs::rename(&self.temp_path, &self.path).map_err(|e| self.persistence("rename", e))?;

        debug!(
            "[dataset] Saved {} rows ({} bytes) to {}",
            dataset.len(),
            bytes.len(),
            self.path.display()
        );
        Ok(())
    }

    /// Load the last saved dataset, or `None` when nothing has been saved yet.
    pub fn load(&self) -> Result<Option<Dataset>, CensusError> {
        if !self.path.exists() {
            return Ok(None);
        }

        let bytes = fs::read(&self.path).map_err(|e| self.persistence("read", e))?;
        let config = bincode::config::standard();
        let (header, offset): (Header, usize) = bincode::serde::decode_from_slice(&bytes, config)?;

        if header.magic != MAGIC {
            return Err(CensusError::Persistence(format!(
                "{} is not a participant dataset",
                self.path.display()
            )));
        }

        let body = &bytes[offset..];
        let records: Vec<ParticipantRecord> = match header.version {
            1 => {
                let (legacy, _): (Vec<RecordV1>, usize) =
                    bincode::serde::decode_from_slice(body, config)?;
                info!("[dataset] Upgrading version 1 dataset, ens column starts missing");
                legacy.into_iter().map(ParticipantRecord::from).collect()
            }
            FORMAT_VERSION => {
                bincode::serde::decode_from_slice::<Vec<ParticipantRecord>, _>(body, config)?.0
            }
            other => {
                return Err(CensusError::Persistence(format!(
                    "unsupported dataset version {} in {}",
                    other,
                    self.path.display()
                )));
            }
        };

        let dataset = Dataset::from_records(records)
            .map_err(|e| CensusError::Persistence(format!("{}: {}", self.path.display(), e)))?;
        info!("[dataset] Loaded {} rows from {}", dataset.len(), self.path.display());
        Ok(Some(dataset))
    }

    pub fn load_or_empty(&self) -> Result<Dataset, CensusError> {
        Ok(self.load()?.unwrap_or_default())
    }

    fn persistence(&self, action: &str, err: std::io::Error) -> CensusError {
        CensusError::Persistence(format!("{} {}: {}", action, self.path.display(), err))
    }
}
