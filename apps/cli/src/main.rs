//! MeritDrop CLI
//!
//! Operator entry point: serve the paginated read API, or plan and execute
//! a reputation-gated batch disbursement.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use meritdrop_api::ApiState;
use meritdrop_core::{Address, Profile, ScoreSet, UserRecord};
use meritdrop_directory::{
    DirectoryService, HttpSource, InMemorySource, MemoryCache, PageQuery, RestCache,
};
use meritdrop_disburse::Disburser;
use meritdrop_eligibility::EligibilityCriterion;
use meritdrop_settings::Settings;
use meritdrop_settlement::{ChainConfig, TokenClient};

/// MeritDrop - reputation-gated token disbursement
#[derive(Parser)]
#[command(name = "meritdrop")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Run against in-memory collaborators instead of live services
    #[arg(long)]
    mock: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the paginated read API
    Serve {
        /// Listen address (overrides MERITDROP_LISTEN_ADDR)
        #[arg(short, long)]
        listen: Option<String>,
    },

    /// Plan and execute a batch disbursement
    Disburse {
        /// Eligibility criterion label, e.g. "Skills Score >= 80"
        #[arg(short, long)]
        criterion: String,

        /// Token contract address
        #[arg(short, long)]
        token: String,

        /// Per-recipient amount in human units, e.g. "1.5"
        #[arg(short, long)]
        amount: String,

        /// Directory pages to scan for candidates
        #[arg(long, default_value = "1")]
        pages: u32,

        /// Print the plan without submitting transactions
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Serve { listen } => cmd_serve(cli.mock, listen).await,
        Commands::Disburse {
            criterion,
            token,
            amount,
            pages,
            dry_run,
        } => cmd_disburse(cli.mock, &criterion, &token, &amount, pages, dry_run).await,
    }
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose {
        "debug"
    } else {
        "info,meritdrop=debug"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();
}

async fn cmd_serve(mock: bool, listen: Option<String>) -> Result<()> {
    let (directory, listen_addr) = if mock {
        info!("serving with in-memory collaborators");
        let directory = DirectoryService::new(
            Arc::new(MemoryCache::new()),
            Arc::new(InMemorySource::new(sample_records())),
        );
        (directory, listen.unwrap_or_else(|| "127.0.0.1:8080".to_string()))
    } else {
        let settings = Settings::from_env().context("loading configuration")?;
        let directory = DirectoryService::new(
            Arc::new(RestCache::new(
                settings.cache.rest_url.clone(),
                settings.cache.rest_token.clone(),
            )),
            Arc::new(HttpSource::new(
                settings.source.base_url.clone(),
                settings.source.api_key.clone(),
            )),
        );
        (directory, listen.unwrap_or(settings.listen_addr))
    };

    let addr: SocketAddr = listen_addr
        .parse()
        .with_context(|| format!("invalid listen address '{listen_addr}'"))?;
    let state = Arc::new(ApiState { directory });
    meritdrop_api::serve(addr, state).await?;
    Ok(())
}

async fn cmd_disburse(
    mock: bool,
    criterion_label: &str,
    token: &str,
    amount: &str,
    pages: u32,
    dry_run: bool,
) -> Result<()> {
    let Some(criterion) = EligibilityCriterion::from_label(criterion_label) else {
        let presets: Vec<String> = EligibilityCriterion::PRESETS
            .iter()
            .map(|p| format!("\"{p}\""))
            .collect();
        bail!(
            "unknown criterion '{criterion_label}'; known criteria: {}",
            presets.join(", ")
        );
    };
    let token: Address = token.parse().context("token address")?;

    let (directory, client) = if mock {
        let directory = DirectoryService::new(
            Arc::new(MemoryCache::new()),
            Arc::new(InMemorySource::new(sample_records())),
        );
        // A throwaway operator and contract; the mock chain starts with no
        // allowance, so the run exercises the full approve → transfer path.
        let client = TokenClient::new(ChainConfig::mock(
            Address::new([0x0a; 20]),
            Address::new([0x0b; 20]),
        ));
        client.register_token(token, 18);
        (directory, client)
    } else {
        let settings = Settings::from_env().context("loading configuration")?;
        let directory = DirectoryService::new(
            Arc::new(RestCache::new(
                settings.cache.rest_url.clone(),
                settings.cache.rest_token.clone(),
            )),
            Arc::new(HttpSource::new(
                settings.source.base_url.clone(),
                settings.source.api_key.clone(),
            )),
        );
        let client = TokenClient::new(ChainConfig::live(
            settings.chain.rpc_url.clone(),
            settings.chain.operator,
            settings.chain.disburse_contract,
        ));
        (directory, client)
    };

    let mut records: Vec<UserRecord> = Vec::new();
    for page in 1..=pages.max(1) {
        let served = directory.page(&PageQuery::new(page)).await?;
        let empty = served.records.is_empty();
        records.extend(served.records);
        if empty {
            break;
        }
    }
    info!(candidates = records.len(), pages, "scanned directory");

    let disburser = Disburser::new(Arc::new(client));
    let plan = disburser
        .prepare(&records, &criterion, token, amount)
        .await?;

    println!("Disbursement plan:");
    println!("  criterion:      {criterion}");
    println!("  token:          {} ({} decimals)", plan.token, plan.decimals);
    println!("  recipients:     {}", plan.recipients.len());
    println!(
        "  per recipient:  {} ({} base units)",
        plan.amount_each, plan.amount_each_base
    );
    println!("  total:          {} base units", plan.total_base);

    if dry_run {
        println!("Dry run: no transactions submitted.");
        return Ok(());
    }

    let receipt = disburser.execute(&plan).await?;
    println!(
        "Disbursement complete: tx 0x{} ({} confirmations)",
        hex::encode(receipt.tx_hash),
        receipt.confirmations
    );
    Ok(())
}

/// Demo dataset for `--mock` runs.
fn sample_records() -> Vec<UserRecord> {
    let user = |id: u64, name: &str, skills, activity, identity, composite| {
        let mut wallet = [0u8; 20];
        wallet[12..20].copy_from_slice(&id.to_be_bytes());
        UserRecord {
            id,
            wallet: Address::new(wallet),
            scores: ScoreSet {
                skills,
                activity,
                identity,
                composite,
            },
            profile: Profile {
                display_name: name.to_string(),
                bio: String::new(),
                location: None,
                avatar_url: String::new(),
            },
        }
    };
    vec![
        user(1, "alice", 90, 55, 82, 76),
        user(2, "bob", 40, 70, 35, 48),
        user(3, "carol", 85, 62, 91, 79),
        user(4, "dave", 20, 30, 25, 25),
        user(5, "erin", 78, 80, 67, 75),
    ]
}
