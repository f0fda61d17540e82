use ceremony_census::backfill::{self, DerivedField};
use ceremony_census::config::CensusConfig;
use ceremony_census::dataset::{Dataset, DatasetStore};
use ceremony_census::merge::InvalidAddressPolicy;
use ceremony_census::pipeline;
use ceremony_census::report::{self, Eligibility, Metric, Summary};
use ceremony_census::rpc::{BlockHeight, ChainReader, JsonRpcClient};
use ceremony_census::transcript::{self, TranscriptDocument};
use ceremony_census::CensusError;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(name = "ceremony_census")]
#[command(about = "Build and enrich a dataset of ceremony contributors", long_about = None)]
struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,
    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,
    /// Dataset file (overrides CENSUS_DATASET_PATH)
    #[arg(long, global = true)]
    dataset: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a transcript, merge it into the dataset and optionally backfill
    Ingest {
        /// Transcript JSON file (overrides CENSUS_TRANSCRIPT_PATH)
        transcript: Option<PathBuf>,
        /// Download the current transcript before parsing
        #[arg(long)]
        fetch: bool,
        /// Fetch balance, nonce and ENS name for rows missing them
        #[arg(long)]
        backfill: bool,
        #[arg(long, value_enum)]
        invalid_address: Option<InvalidAddressPolicy>,
        #[command(flatten)]
        chain: ChainArgs,
    },
    /// Fill one derived field only
    Backfill {
        #[arg(value_enum)]
        field: FieldArg,
        #[command(flatten)]
        chain: ChainArgs,
    },
    /// Print summary statistics and write report files
    Report {
        /// Directory for CSV and address exports
        #[arg(long, default_value = "report")]
        out_dir: PathBuf,
        /// Write balance_ecdf.csv and nonce_ecdf.csv
        #[arg(long)]
        ecdf: bool,
        /// Write thresholds.csv for these nonce thresholds
        #[arg(long, value_delimiter = ',')]
        nonce_thresholds: Vec<f64>,
        /// Write thresholds.csv for these balance thresholds (ETH)
        #[arg(long, value_delimiter = ',')]
        balance_thresholds: Vec<f64>,
        /// Write eligible checksummed addresses to addresses.txt
        #[arg(long)]
        addresses: bool,
        #[arg(long, default_value_t = 0)]
        min_nonce: u64,
        #[arg(long, default_value_t = 0.0)]
        min_balance: f64,
        /// List participant ids whose nonce is zero
        #[arg(long)]
        zero_nonce: bool,
    },
}

/// Flags shared by every command that talks to the node.
#[derive(Args, Debug, Default)]
struct ChainArgs {
    #[arg(long)]
    rpc_url: Option<String>,
    /// Block to read account state at (decimal or 0x hex)
    #[arg(long, value_parser = parse_block)]
    block: Option<BlockHeight>,
    /// Rows fetched between checkpoints
    #[arg(long)]
    save_interval: Option<usize>,
    /// Minimum milliseconds between RPC requests
    #[arg(long)]
    request_delay_ms: Option<u64>,
}

impl ChainArgs {
    fn apply(self, config: &mut CensusConfig) -> Result<(), CensusError> {
        if let Some(url) = self.rpc_url {
            config.rpc_url = url;
        }
        if let Some(block) = self.block {
            config.block = block;
        }
        if let Some(interval) = self.save_interval {
            config.save_interval = interval;
        }
        if let Some(ms) = self.request_delay_ms {
            config.request_delay = Duration::from_millis(ms);
        }
        config.validate()
    }
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum FieldArg {
    Balance,
    Nonce,
    Ens,
}

impl From<FieldArg> for DerivedField {
    fn from(arg: FieldArg) -> Self {
        match arg {
            FieldArg::Balance => DerivedField::Balance,
            FieldArg::Nonce => DerivedField::Nonce,
            FieldArg::Ens => DerivedField::Ens,
        }
    }
}

fn parse_block(s: &str) -> Result<BlockHeight, String> {
    s.parse().map_err(|e: CensusError| e.to_string())
}

fn load_existing(store: &DatasetStore) -> Result<Dataset, CensusError> {
    store
        .load()?
        .ok_or_else(|| CensusError::Config(format!("no dataset at {}", store.path().display())))
}

fn run(cli: Cli) -> Result<(), CensusError> {
    let mut config = CensusConfig::from_env()?;
    if let Some(path) = cli.dataset {
        config.dataset_path = path;
    }
    let store = DatasetStore::new(&config.dataset_path);

    match cli.command {
        Commands::Ingest {
            transcript: transcript_path,
            fetch,
            backfill,
            invalid_address,
            chain,
        } => {
            if let Some(path) = transcript_path {
                config.transcript_path = path;
            }
            if let Some(policy) = invalid_address {
                config.invalid_address_policy = policy;
            }
            chain.apply(&mut config)?;

            if fetch {
                info!("[census] Downloading transcript from {}", config.transcript_url);
                transcript::download(
                    &config.transcript_url,
                    &config.transcript_path,
                    config.http_timeout,
                )?;
            }
            let doc = TranscriptDocument::load(&config.transcript_path)?;

            let (_, outcome) = if backfill {
                let mut client = JsonRpcClient::new(&config.rpc_url, config.http_timeout)?;
                let options = config.backfill_options();
                info!("[census] Backfilling through {} at block {}", client.url(), options.block);
                let reader: &mut dyn ChainReader = &mut client;
                let policy = config.invalid_address_policy;
                pipeline::run(&store, &doc, policy, Some((reader, &options)))?
            } else {
                pipeline::run(&store, &doc, config.invalid_address_policy, None)?
            };

            println!(
                "{} contributions parsed, {} new rows, {} rows total",
                outcome.parsed, outcome.merge.added, outcome.total
            );
            for report in &outcome.backfill {
                println!("{}: {}/{} fetched", report.field, report.fetched, report.missing);
            }
        }
        Commands::Backfill { field, chain } => {
            chain.apply(&mut config)?;
            let mut dataset = load_existing(&store)?;
            let mut client = JsonRpcClient::new(&config.rpc_url, config.http_timeout)?;
            let report = backfill::backfill_field(
                &mut dataset,
                field.into(),
                &mut client,
                &store,
                &config.backfill_options(),
            )?;
            println!("{}: {}/{} fetched", report.field, report.fetched, report.missing);
        }
        Commands::Report {
            out_dir,
            ecdf,
            nonce_thresholds,
            balance_thresholds,
            addresses,
            min_nonce,
            min_balance,
            zero_nonce,
        } => {
            let dataset = load_existing(&store)?;

            print!("{}", Summary::compute(&dataset, &config.bot_rules));

            if zero_nonce {
                let rows = report::zero_nonce_rows(&dataset);
                println!();
                println!("{} rows with zero nonce:", rows.len());
                for row in rows {
                    println!("  {}", row.participant_id);
                }
            }

            if ecdf {
                for metric in [Metric::Balance, Metric::Nonce] {
                    let path = out_dir.join(format!("{}_ecdf.csv", metric.name()));
                    let points = report::write_ecdf_csv(&path, metric, &dataset)?;
                    info!("[census] Wrote {} points to {}", points, path.display());
                }
            }

            if !nonce_thresholds.is_empty() || !balance_thresholds.is_empty() {
                let mut rows = report::threshold_report(&dataset, Metric::Nonce, &nonce_thresholds);
                let balance_rows =
                    report::threshold_report(&dataset, Metric::Balance, &balance_thresholds);
                rows.extend(balance_rows);
                let path = out_dir.join("thresholds.csv");
                report::write_threshold_csv(&path, &rows)?;
                info!("[census] Wrote {} thresholds to {}", rows.len(), path.display());
            }

            if addresses {
                let path = out_dir.join("addresses.txt");
                let eligibility = Eligibility { min_nonce, min_balance };
                let written =
                    report::export_addresses(&path, &dataset, &config.bot_rules, &eligibility)?;
                println!("{} eligible addresses written to {}", written, path.display());
            }
        }
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    let level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };
    ceremony_census::init_tracing(level);

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
