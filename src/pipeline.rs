use crate::backfill::{self, BackfillOptions, BackfillReport};
use crate::dataset::{Dataset, DatasetStore};
use crate::merge::{self, InvalidAddressPolicy, MergeStats};
use crate::rpc::ChainReader;
use crate::transcript::{self, TranscriptDocument};
use crate::CensusError;
use tracing::info;

#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub parsed: usize,
    pub merge: MergeStats,
    pub total: usize,
    pub backfill: Vec<BackfillReport>,
}

/// Parse a transcript, merge it into the stored dataset and save the result.
///
/// Parse and merge failures leave the stored file untouched.
pub fn ingest(
    store: &DatasetStore,
    doc: &TranscriptDocument,
    policy: InvalidAddressPolicy,
) -> Result<(Dataset, IngestOutcome), CensusError> {
    let incoming = transcript::parse(doc)?;
    let parsed = incoming.len();
    let existing = store.load_or_empty()?;
    info!(
        "[ingest] Parsed {} contributions; {} rows already stored at {}",
        parsed,
        existing.len(),
        store.path().display()
    );

    let (dataset, stats) = merge::merge(existing, incoming, policy)?;
    store.save(&dataset)?;
    info!("[ingest] Saved {} rows ({} new)", dataset.len(), stats.added);

    let outcome = IngestOutcome {
        parsed,
        merge: stats,
        total: dataset.len(),
        backfill: Vec::new(),
    };
    Ok((dataset, outcome))
}

/// Ingest, then optionally fill every derived field through `chain`.
pub fn run(
    store: &DatasetStore,
    doc: &TranscriptDocument,
    policy: InvalidAddressPolicy,
    chain: Option<(&mut dyn ChainReader, &BackfillOptions)>,
) -> Result<(Dataset, IngestOutcome), CensusError> {
    let (mut dataset, mut outcome) = ingest(store, doc, policy)?;
    if let Some((client, options)) = chain {
        outcome.backfill = backfill::backfill_all(&mut dataset, client, store, options)?;
    }
    Ok((dataset, outcome))
}
