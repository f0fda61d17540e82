use crate::classify::{BotLabel, BotRules};
use crate::dataset::Dataset;
use crate::participant::ParticipantRecord;
use crate::CensusError;
use csv::Writer;
use itertools::Itertools;
use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

pub const WEI_PER_ETHER: f64 = 1e18;

pub fn wei_to_ether(wei: u128) -> f64 {
    wei as f64 / WEI_PER_ETHER
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Range {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

impl Range {
    fn of(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        Some(Self { min, max, mean })
    }
}

/// Headline numbers for a dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub total: usize,
    pub chain_sign_ins: usize,
    pub nonce: Option<Range>,
    /// In ether.
    pub balance: Option<Range>,
    pub labels: BTreeMap<BotLabel, usize>,
}

impl Summary {
    pub fn compute(dataset: &Dataset, rules: &BotRules) -> Self {
        let nonces: Vec<f64> = dataset.iter().filter_map(|r| r.nonce).map(|n| n as f64).collect();
        let balances: Vec<f64> =
            dataset.iter().filter_map(|r| r.balance).map(wei_to_ether).collect();
        let labels = dataset.iter().map(|r| rules.classify(r)).counts().into_iter().collect();

        Self {
            total: dataset.len(),
            chain_sign_ins: dataset.addressed().count(),
            nonce: Range::of(&nonces),
            balance: Range::of(&balances),
            labels,
        }
    }

    pub fn label_count(&self, label: BotLabel) -> usize {
        self.labels.get(&label).copied().unwrap_or(0)
    }

    pub fn suspects(&self) -> usize {
        self.labels.iter().filter(|(l, _)| l.is_suspect()).map(|(_, c)| c).sum()
    }
}

fn share(part: usize, whole: usize) -> f64 {
    if whole == 0 { 0.0 } else { part as f64 / whole as f64 * 100.0 }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let other = self.total - self.chain_sign_ins;
        writeln!(f, "There are {} total contributions", self.total)?;
        writeln!(f)?;
        writeln!(f, "Sign-in stats:")?;
        let chain = self.chain_sign_ins;
        writeln!(
            f,
            "  {:>6} ({:>6.2}%) signed in with an Ethereum account",
            chain,
            share(chain, self.total)
        )?;
        writeln!(
            f,
            "  {:>6} ({:>6.2}%) signed in with another provider",
            other,
            share(other, self.total)
        )?;
        writeln!(f)?;
        writeln!(f, "Account stats:")?;
        match &self.nonce {
            Some(r) => writeln!(
                f,
                "  Nonces   range from {:>3} to {:>7}. The mean is {:>5.2}",
                r.min, r.max, r.mean
            )?,
            None => writeln!(f, "  Nonces   not fetched yet")?,
        }
        match &self.balance {
            Some(r) => writeln!(
                f,
                "  Balances range from {:>3.2} to {:>7.2} ETH. The mean is {:>5.2}",
                r.min, r.max, r.mean
            )?,
            None => writeln!(f, "  Balances not fetched yet")?,
        }
        writeln!(f)?;
        writeln!(f, "Bot stats:")?;
        let suspects = self.suspects();
        writeln!(
            f,
            "  {:>6} ({:>6.2}%) are possibly bots",
            suspects,
            share(suspects, self.total)
        )?;
        for label in BotLabel::ALL.iter().filter(|l| l.is_suspect()) {
            let count = self.label_count(*label);
            writeln!(f, "  {:>6} ({:>6.2}%) {}", count, share(count, self.total), label)?;
        }
        Ok(())
    }
}

/// Rows whose account had never sent a transaction at the pinned block.
pub fn zero_nonce_rows(dataset: &Dataset) -> Vec<&ParticipantRecord> {
    dataset.iter().filter(|r| r.nonce == Some(0)).collect()
}

/// Empirical CDF points `(value, fraction <= value)`, sorted by value.
pub fn ecdf(values: &[f64]) -> Vec<(f64, f64)> {
    let sorted: Vec<f64> = values
        .iter()
        .copied()
        .filter(|v| !v.is_nan())
        .sorted_by(|a, b| a.total_cmp(b))
        .collect();
    let n = sorted.len() as f64;
    sorted
        .into_iter()
        .enumerate()
        .map(|(i, v)| (v, (i + 1) as f64 / n))
        .collect()
}

/// Which numeric column an export reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Balance,
    Nonce,
}

impl Metric {
    pub fn name(&self) -> &'static str {
        match self {
            Metric::Balance => "balance",
            Metric::Nonce => "nonce",
        }
    }

    /// Balance in ether, nonce as a count.
    pub fn value(&self, record: &ParticipantRecord) -> Option<f64> {
        match self {
            Metric::Balance => record.balance.map(wei_to_ether),
            Metric::Nonce => record.nonce.map(|n| n as f64),
        }
    }

    pub fn values(&self, dataset: &Dataset) -> Vec<f64> {
        dataset.iter().filter_map(|r| self.value(r)).collect()
    }
}

fn ensure_parent(path: &Path) -> Result<(), CensusError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

pub fn write_ecdf_csv(
    path: &Path,
    metric: Metric,
    dataset: &Dataset,
) -> Result<usize, CensusError> {
    ensure_parent(path)?;
    let points = ecdf(&metric.values(dataset));

    let mut writer = Writer::from_writer(File::create(path)?);
    writer.write_record([metric.name(), "cdf"])?;
    for (value, cdf) in &points {
        writer.write_record(&[value.to_string(), format!("{:.6}", cdf)])?;
    }
    writer.flush()?;
    Ok(points.len())
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdRow {
    pub metric: Metric,
    pub threshold: f64,
    pub at_or_above: usize,
    pub of: usize,
}

/// Count rows at or above each threshold, out of rows that have the metric.
pub fn threshold_report(
    dataset: &Dataset,
    metric: Metric,
    thresholds: &[f64],
) -> Vec<ThresholdRow> {
    let values = metric.values(dataset);
    thresholds
        .iter()
        .map(|&threshold| ThresholdRow {
            metric,
            threshold,
            at_or_above: values.iter().filter(|&&v| v >= threshold).count(),
            of: values.len(),
        })
        .collect()
}

pub fn write_threshold_csv(path: &Path, rows: &[ThresholdRow]) -> Result<(), CensusError> {
    ensure_parent(path)?;
    let mut writer = Writer::from_writer(File::create(path)?);
    writer.write_record(["metric", "threshold", "at_or_above", "of", "share"])?;
    for row in rows {
        writer.write_record(&[
            row.metric.name().to_string(),
            row.threshold.to_string(),
            row.at_or_above.to_string(),
            row.of.to_string(),
            format!("{:.4}", share(row.at_or_above, row.of) / 100.0),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Eligibility {
    pub min_nonce: u64,
    /// In ether.
    pub min_balance: f64,
}

impl Eligibility {
    /// Addressed, classified normal, and meeting both minimums with fetched values.
    pub fn admits(&self, record: &ParticipantRecord, rules: &BotRules) -> bool {
        record.address.is_some()
            && rules.classify(record) == BotLabel::Normal
            && record.nonce.is_some_and(|n| n >= self.min_nonce)
            && record.balance.is_some_and(|b| wei_to_ether(b) >= self.min_balance)
    }
}

/// Write one checksummed address per line. Returns how many were written.
pub fn export_addresses(
    path: &Path,
    dataset: &Dataset,
    rules: &BotRules,
    eligibility: &Eligibility,
) -> Result<usize, CensusError> {
    ensure_parent(path)?;
    let mut out = BufWriter::new(File::create(path)?);
    let mut written = 0;
    for (record, address) in dataset.addressed() {
        if eligibility.admits(record, rules) {
            writeln!(out, "{}", address)?;
            written += 1;
        }
    }
    out.flush()?;
    Ok(written)
}
