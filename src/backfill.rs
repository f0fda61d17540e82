use crate::dataset::{Dataset, DatasetStore};
use crate::identity::Address;
use crate::participant::ParticipantRecord;
use crate::rpc::{BlockHeight, ChainReader};
use crate::CensusError;
use std::fmt;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

pub const DEFAULT_SAVE_INTERVAL: usize = 256;

/// A column filled from chain state rather than from the transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DerivedField {
    Balance,
    Nonce,
    Ens,
}

impl DerivedField {
    /// Pass order for a full backfill.
    pub const ALL: [DerivedField; 3] =
        [DerivedField::Balance, DerivedField::Nonce, DerivedField::Ens];

    pub fn name(&self) -> &'static str {
        match self {
            DerivedField::Balance => "balance",
            DerivedField::Nonce => "nonce",
            DerivedField::Ens => "ens",
        }
    }

    pub fn is_missing(&self, record: &ParticipantRecord) -> bool {
        match self {
            DerivedField::Balance => record.balance.is_none(),
            DerivedField::Nonce => record.nonce.is_none(),
            DerivedField::Ens => record.ens.is_none(),
        }
    }

    /// One fetch for this field. Only name resolution absorbs decode errors,
    /// recording the empty name so the row is not asked again.
    fn fetch<C: ChainReader + ?Sized>(
        &self,
        client: &mut C,
        address: &Address,
        block: BlockHeight,
    ) -> Result<FieldValue, CensusError> {
        match self {
            DerivedField::Balance => client.get_balance(address, block).map(FieldValue::Balance),
            DerivedField::Nonce => {
                client.get_transaction_count(address, block).map(FieldValue::Nonce)
            }
            DerivedField::Ens => match client.reverse_resolve_name(address, block) {
                Ok(name) => Ok(FieldValue::Ens(name)),
                Err(err) if err.is_decode() => {
                    warn!("[backfill] Unreadable name for {}, recording empty: {}", address, err);
                    Ok(FieldValue::Ens(String::new()))
                }
                Err(err) => Err(err),
            },
        }
    }
}

impl fmt::Display for DerivedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Balance(u128),
    Nonce(u64),
    Ens(String),
}

impl FieldValue {
    fn apply(self, record: &mut ParticipantRecord) {
        match self {
            FieldValue::Balance(v) => record.balance = Some(v),
            FieldValue::Nonce(v) => record.nonce = Some(v),
            FieldValue::Ens(v) => record.ens = Some(v),
        }
    }

    fn is_empty_name(&self) -> bool {
        matches!(self, FieldValue::Ens(name) if name.is_empty())
    }
}

#[derive(Debug, Clone)]
pub struct BackfillOptions {
    pub block: BlockHeight,
    /// Rows fetched between checkpoints.
    pub save_interval: usize,
    /// Minimum spacing between consecutive fetches.
    pub request_delay: Duration,
}

impl BackfillOptions {
    pub fn new(block: BlockHeight) -> Self {
        Self {
            block,
            save_interval: DEFAULT_SAVE_INTERVAL,
            request_delay: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackfillReport {
    pub field: DerivedField,
    pub missing: usize,
    pub fetched: usize,
    pub empty_names: usize,
    pub checkpoints: usize,
}

/// Rows that still need `field` and have an address, in row order.
pub fn working_set(dataset: &Dataset, field: DerivedField) -> Vec<(String, Address)> {
    dataset
        .addressed()
        .filter(|(record, _)| field.is_missing(record))
        .map(|(record, address)| (record.participant_id.clone(), address))
        .collect()
}

/// Fill one derived field for every eligible row.
///
/// The dataset is saved after every `save_interval` fetched rows and once
/// more when the working set is exhausted. A fetch error stops the pass; the
/// rows fetched since the last checkpoint are saved before the error is
/// returned.
pub fn backfill_field<C: ChainReader + ?Sized>(
    dataset: &mut Dataset,
    field: DerivedField,
    client: &mut C,
    store: &DatasetStore,
    options: &BackfillOptions,
) -> Result<BackfillReport, CensusError> {
    let save_interval = options.save_interval.max(1);
    let pending = working_set(dataset, field);

    info!(
        "[backfill] Patching the {} missing {} values at block {}",
        pending.len(),
        field,
        options.block
    );

    let mut report = BackfillReport {
        field,
        missing: pending.len(),
        fetched: 0,
        empty_names: 0,
        checkpoints: 0,
    };
    let mut unsaved = 0usize;
    let mut last_request: Option<Instant> = None;
    let started = Instant::now();

    for (participant_id, address) in &pending {
        if let Some(last) = last_request {
            let elapsed = last.elapsed();
            if elapsed < options.request_delay {
                thread::sleep(options.request_delay - elapsed);
            }
        }
        last_request = Some(Instant::now());

        let value = match field.fetch(client, address, options.block) {
            Ok(value) => value,
            Err(err) => {
                error!(
                    "[backfill] {} fetch for {} failed after {}/{} rows: {}",
                    field,
                    participant_id,
                    report.fetched,
                    report.missing,
                    err
                );
                if unsaved > 0 {
                    if let Err(save_err) = store.save(dataset) {
                        error!("[backfill] Could not save progress before stopping: {}", save_err);
                        return Err(err.with_note(format!(
                            "{} fetched {} values since the last checkpoint were not saved: {}",
                            unsaved, field, save_err
                        )));
                    }
                }
                return Err(err);
            }
        };

        if value.is_empty_name() {
            report.empty_names += 1;
        }

        let record = dataset.get_mut(participant_id).ok_or_else(|| {
            CensusError::Other(format!("row {} vanished during {} backfill", participant_id, field))
        })?;
        value.apply(record);
        report.fetched += 1;
        unsaved += 1;

        if unsaved >= save_interval {
            store.save(dataset)?;
            report.checkpoints += 1;
            unsaved = 0;
            info!(
                "[backfill] {}: {}/{} fetched, checkpoint saved ({:.1}s)",
                field,
                report.fetched,
                report.missing,
                started.elapsed().as_secs_f64()
            );
        }
    }

    store.save(dataset)?;
    report.checkpoints += 1;

    debug!("[backfill] {} pass report: {:?}", field, report);
    info!(
        "[backfill] {} complete: {} fetched ({} empty names) in {:.1}s",
        field,
        report.fetched,
        report.empty_names,
        started.elapsed().as_secs_f64()
    );
    Ok(report)
}

/// Run the balance, nonce and name passes in order against one block.
pub fn backfill_all<C: ChainReader + ?Sized>(
    dataset: &mut Dataset,
    client: &mut C,
    store: &DatasetStore,
    options: &BackfillOptions,
) -> Result<Vec<BackfillReport>, CensusError> {
    let mut reports = Vec::with_capacity(DerivedField::ALL.len());
    for field in DerivedField::ALL {
        reports.push(backfill_field(dataset, field, client, store, options)?);
    }
    Ok(reports)
}
