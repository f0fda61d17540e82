use crate::participant::{ParticipantRecord, ROUNDS, RoundWitness};
use crate::CensusError;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// The published ceremony state, reduced to the fields we read.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptDocument {
    pub participant_ids: Vec<String>,
    pub transcripts: Vec<RoundTranscript>,
    pub participant_ecdsa_signatures: Vec<Option<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoundTranscript {
    pub witness: Witness,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Witness {
    pub pot_pubkeys: Vec<String>,
    pub bls_signatures: Vec<Option<String>>,
}

impl TranscriptDocument {
    pub fn from_json(text: &str) -> Result<Self, CensusError> {
        serde_json::from_str(text).map_err(|e| CensusError::MalformedTranscript(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, CensusError> {
        let text = fs::read_to_string(path).map_err(|e| {
            CensusError::MalformedTranscript(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&text)
    }
}

/// Turn a transcript into one record per contributor.
///
/// Index 0 is the ceremony's anchor entry and is skipped. Every list must be
/// the same length as `participantIds`; nothing is returned on mismatch.
pub fn parse(doc: &TranscriptDocument) -> Result<Vec<ParticipantRecord>, CensusError> {
    let n = doc.participant_ids.len();

    if doc.transcripts.len() != ROUNDS {
        return Err(CensusError::MalformedTranscript(format!(
            "expected {} rounds, found {}",
            ROUNDS,
            doc.transcripts.len()
        )));
    }
    check_len("participantEcdsaSignatures", doc.participant_ecdsa_signatures.len(), n)?;
    for (round, transcript) in doc.transcripts.iter().enumerate() {
        let witness = &transcript.witness;
        let prefix = format!("transcripts[{}].witness", round);
        check_len(&format!("{}.potPubkeys", prefix), witness.pot_pubkeys.len(), n)?;
        check_len(&format!("{}.blsSignatures", prefix), witness.bls_signatures.len(), n)?;
    }

    let records = (1..n)
        .map(|i| {
            let witnesses: [RoundWitness; ROUNDS] = std::array::from_fn(|round| {
                let witness = &doc.transcripts[round].witness;
                RoundWitness {
                    pot_pubkey: witness.pot_pubkeys[i].clone(),
                    bls_signature: witness.bls_signatures[i].clone().unwrap_or_default(),
                }
            });
            ParticipantRecord::new(
                doc.participant_ids[i].clone(),
                witnesses,
                doc.participant_ecdsa_signatures[i].clone().unwrap_or_default(),
            )
        })
        .collect();

    Ok(records)
}

fn check_len(field: &str, found: usize, expected: usize) -> Result<(), CensusError> {
    if found != expected {
        return Err(CensusError::MalformedTranscript(format!(
            "{} has {} entries, participantIds has {}",
            field, found, expected
        )));
    }
    Ok(())
}

/// Fetch the current ceremony state and replace the transcript file with it.
pub fn download(url: &str, path: &Path, timeout: Duration) -> Result<(), CensusError> {
    info!("[transcript] Downloading {}", url);
    let fetch = || -> Result<String, reqwest::Error> {
        let client = reqwest::blocking::Client::builder().timeout(timeout).build()?;
        client.get(url).send()?.error_for_status()?.text()
    };
    let body =
        fetch().map_err(|e| CensusError::Other(format!("transcript download failed: {}", e)))?;

    // Refuse to overwrite a good transcript with something unparseable
    let doc = TranscriptDocument::from_json(&body)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let temp_path = path.with_extension("json.download");
    fs::write(&temp_path, &body)?;
    fs::rename(&temp_path, path)?;

    info!(
        "[transcript] Saved {} participant entries to {}",
        doc.participant_ids.len(),
        path.display()
    );
    Ok(())
}
