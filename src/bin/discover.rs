//! Wallet discovery CLI
//!
//! Reads import text (mnemonic, WIF, BIP38 key, xpub/ypub/zpub or address)
//! from the first line of stdin, discovers the wallets behind it using an
//! Esplora server and prints them to stdout. Progress goes to stderr.
//!
//! ## Usage
//! ```bash
//! # Discover BIP84 accounts of a mnemonic on mainnet
//! echo "your twelve word mnemonic ..." | cargo run --bin discover --features cli
//!
//! # Every wallet type, with a BIP39 passphrase read from the next stdin line
//! cargo run --bin discover --features cli -- --all-types --ask-passphrase
//!
//! # Testnet, custom server, JSON output
//! cargo run --bin discover --features cli -- --testnet --esplora-url http://127.0.0.1:3002 --json
//!
//! # Settings from a JSON file (see DiscoveryConfig)
//! cargo run --bin discover --features cli -- --config discovery.json
//! ```
//!
//! Press Ctrl+C to cancel; wallets found so far are discarded.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use async_trait::async_trait;
use bitcoin::Network;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;
use tracing_subscriber::EnvFilter;
use wallet_discovery::discovery::{
    DiscoveredWallet, DiscoveryBuilder, DiscoveryConfig, DiscoveryObserver, DiscoveryOutcome,
    DiscoveryProgress, PromptRejected,
};
use wallet_discovery::errors::DiscoveryResult;
use wallet_discovery::scanning::ScanStage;
use zeroize::Zeroizing;

const MAINNET_ESPLORA: &str = "https://blockstream.info/api";
const TESTNET_ESPLORA: &str = "https://blockstream.info/testnet/api";

#[derive(Parser, Debug)]
#[command(author, version, about = "Discover the wallets behind a mnemonic, key or address", long_about = None)]
pub struct CliArgs {
    #[arg(long, help = "Esplora API base URL (defaults to blockstream.info for the network)")]
    pub esplora_url: Option<String>,

    #[arg(long, help = "Use testnet instead of mainnet")]
    pub testnet: bool,

    #[arg(long, help = "Try every applicable wallet type, not only the primary ones")]
    pub all_types: bool,

    #[arg(long, help = "The mnemonic is protected by a BIP39 passphrase; ask for it")]
    pub ask_passphrase: bool,

    #[arg(long, help = "Override the gap limit of HD wallet types")]
    pub gap_limit: Option<u32>,

    #[arg(long, help = "Load discovery settings from a JSON file")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Print the outcome as JSON")]
    pub json: bool,
}

/// Prints progress to stderr and reads passphrases from stdin
struct TerminalObserver {
    input: Mutex<Lines<BufReader<Stdin>>>,
}

#[async_trait]
impl DiscoveryObserver for TerminalObserver {
    fn on_progress(&self, progress: &DiscoveryProgress) {
        if let ScanStage::Classified(classification) = progress.stage {
            eprintln!("[{:>3}] {} {}", progress.examined, progress, classification);
        }
    }

    fn on_wallet_found(&self, wallet: &DiscoveredWallet) {
        eprintln!("      found {}", wallet);
    }

    async fn on_passphrase_needed(
        &self,
        title: &str,
        subtitle: &str,
    ) -> Result<Zeroizing<String>, PromptRejected> {
        eprint!("{}: {} ", title, subtitle);
        let _ = std::io::stderr().flush();

        let mut input = self.input.lock().await;
        match input.next_line().await {
            Ok(Some(line)) if !line.is_empty() => Ok(Zeroizing::new(line)),
            _ => Err(PromptRejected),
        }
    }
}

fn print_outcome(outcome: &DiscoveryOutcome, json: bool) -> DiscoveryResult<()> {
    if json {
        let wallets: Vec<&DiscoveredWallet> = outcome.wallets.iter().map(|w| w.as_ref()).collect();
        let value = serde_json::json!({
            "cancelled": outcome.cancelled,
            "wallets": wallets,
            "reports": outcome.reports,
        });
        let text = serde_json::to_string_pretty(&value).map_err(|e| {
            wallet_discovery::DiscoveryError::TaskAborted {
                reason: format!("cannot serialise outcome: {}", e),
            }
        })?;
        println!("{}", text);
        return Ok(());
    }

    for wallet in &outcome.wallets {
        println!(
            "{}\t{}\t{}\t{}",
            wallet.wallet_type,
            wallet.derivation_path.as_deref().unwrap_or("-"),
            wallet.first_address,
            wallet.id
        );
    }

    for report in outcome.reports.iter().filter(|report| report.is_degraded()) {
        eprintln!(
            "warning: {} could not be fully checked ({} lookups failed)",
            report.wallet_type, report.unknown
        );
    }

    if outcome.wallets.is_empty() {
        eprintln!("No wallets found");
    } else if outcome.auto_select().is_some() {
        eprintln!("Exactly one wallet found");
    } else {
        eprintln!("{} wallets found", outcome.wallets.len());
    }
    Ok(())
}

async fn run(args: CliArgs) -> DiscoveryResult<ExitCode> {
    let mut config = match &args.config {
        Some(path) => DiscoveryConfig::from_json_file(path)?,
        None => DiscoveryConfig::default(),
    };
    if args.testnet {
        config.network = Network::Testnet;
    }
    if let Some(gap_limit) = args.gap_limit {
        config.gap_limit = Some(gap_limit);
    }

    let esplora_url = args.esplora_url.clone().unwrap_or_else(|| {
        if config.network == Network::Bitcoin {
            MAINNET_ESPLORA.to_string()
        } else {
            TESTNET_ESPLORA.to_string()
        }
    });

    let mut input = BufReader::new(tokio::io::stdin()).lines();
    eprintln!("Enter the mnemonic, key or address to import:");
    let text = Zeroizing::new(input.next_line().await.ok().flatten().unwrap_or_default());

    let handle = DiscoveryBuilder::new()
        .with_config(config)
        .with_esplora_url(esplora_url)
        .with_all_account_types(args.all_types)
        .with_passphrase_prompt(args.ask_passphrase)
        .start(&text)?;
    drop(text);

    let canceller = handle.canceller();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nCancelling...");
            canceller.cancel();
        }
    });

    let observer = TerminalObserver {
        input: Mutex::new(input),
    };
    let outcome = handle.run_with(&observer).await?;

    if outcome.cancelled {
        eprintln!("Discovery cancelled");
        return Ok(ExitCode::from(130));
    }
    print_outcome(&outcome, args.json)?;
    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    match run(CliArgs::parse()).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {}", err);
            ExitCode::FAILURE
        }
    }
}
