use crate::dataset::Dataset;
use crate::identity;
use crate::participant::ParticipantRecord;
use crate::CensusError;
use rustc_hash::FxHashSet;
use std::fmt;
use std::str::FromStr;
use tracing::{info, warn};

/// What to do with a chain-identity id whose address does not parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum InvalidAddressPolicy {
    /// Fail the merge; nothing is mutated or saved.
    #[default]
    Abort,
    /// Leave the row out of the merged dataset.
    Drop,
    /// Keep the row with no address; it will never be backfilled.
    KeepUnresolved,
}

impl fmt::Display for InvalidAddressPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InvalidAddressPolicy::Abort => "abort",
            InvalidAddressPolicy::Drop => "drop",
            InvalidAddressPolicy::KeepUnresolved => "keep-unresolved",
        })
    }
}

impl FromStr for InvalidAddressPolicy {
    type Err = CensusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "abort" => Ok(InvalidAddressPolicy::Abort),
            "drop" => Ok(InvalidAddressPolicy::Drop),
            "keep-unresolved" => Ok(InvalidAddressPolicy::KeepUnresolved),
            other => Err(CensusError::Config(format!("unknown invalid address policy: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub existing: usize,
    pub incoming: usize,
    pub added: usize,
    pub duplicates: usize,
    pub dropped: usize,
}

/// Combine the persisted rows with freshly parsed ones.
///
/// Rows are deduplicated by participant id keeping the first occurrence, so
/// an existing row always beats an incoming one. The address column is then
/// derived again for every kept row. The result is built separately and only
/// returned once complete.
pub fn merge(
    existing: Dataset,
    incoming: Vec<ParticipantRecord>,
    policy: InvalidAddressPolicy,
) -> Result<(Dataset, MergeStats), CensusError> {
    let mut stats = MergeStats {
        existing: existing.len(),
        incoming: incoming.len(),
        ..Default::default()
    };

    let mut merged = Dataset::with_capacity(existing.len() + incoming.len());
    let mut seen: FxHashSet<String> = FxHashSet::default();

    for mut record in existing.into_records().into_iter().chain(incoming) {
        if !seen.insert(record.participant_id.clone()) {
            stats.duplicates += 1;
            continue;
        }

        record.address = match identity::resolve(&record.participant_id) {
            Ok(address) => address,
            Err(err) => match policy {
                InvalidAddressPolicy::Abort => return Err(err),
                InvalidAddressPolicy::Drop => {
                    warn!("[merge] Dropping row: {}", err);
                    stats.dropped += 1;
                    continue;
                }
                InvalidAddressPolicy::KeepUnresolved => {
                    warn!("[merge] Keeping row without address: {}", err);
                    None
                }
            },
        };

        merged.push_unique(record);
    }

    stats.added = merged.len().saturating_sub(stats.existing);
    info!(
        "[merge] {} existing + {} incoming -> {} rows ({} new, {} duplicates, {} dropped)",
        stats.existing,
        stats.incoming,
        merged.len(),
        stats.added,
        stats.duplicates,
        stats.dropped
    );

    Ok((merged, stats))
}
