//! algo-connect - operator tool for the wallet adapters
//!
//! Queries the node, inspects encoded transactions and signs or sends them
//! through the mnemonic provider.

use async_trait::async_trait;
use clap::{Args, Parser, Subcommand};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;
use zeroize::Zeroizing;

use algo_connect::node::{AlgodClient, NodeClient, NodeConfig};
use algo_connect::providers::{default_metadata, ProviderError, SecretPrompt, TxnGroups};
use algo_connect::registry::{initialize_providers, HostEnvironment, ProviderDef};
use algo_connect::txn::{
    decode_base64, decode_base64_transaction, encode_base64, group_transactions_by_sender,
    TxnMarker,
};
use algo_connect::{Network, ProviderId, WalletManager};

/// algo-connect: wallet provider adapters for the ledger
#[derive(Parser)]
#[command(name = "algo-connect")]
#[command(about = "Inspect, sign and send ledger transactions", long_about = None)]
struct Cli {
    #[command(flatten)]
    node: NodeArgs,

    /// Enable debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct NodeArgs {
    /// Network name (mainnet, testnet, betanet or a custom name)
    #[arg(long, global = true, default_value = "mainnet")]
    network: String,

    /// Node server URL
    #[arg(long, global = true)]
    node_server: Option<String>,

    /// Node API token
    #[arg(long, global = true)]
    node_token: Option<String>,

    /// Node port
    #[arg(long, global = true)]
    node_port: Option<String>,
}

impl NodeArgs {
    fn config(&self) -> NodeConfig {
        let defaults = NodeConfig::default();
        NodeConfig {
            network: Network::from(self.network.clone()),
            node_server: self.node_server.clone().unwrap_or(defaults.node_server),
            node_token: self.node_token.clone().unwrap_or(defaults.node_token),
            node_port: self.node_port.clone().unwrap_or(defaults.node_port),
            node_headers: defaults.node_headers,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List supported providers
    Providers,

    /// Show node health and last round
    Status,

    /// Show account information
    Account {
        #[arg(value_name = "ADDRESS")]
        address: String,
    },

    /// List assets held by an account
    Assets {
        #[arg(value_name = "ADDRESS")]
        address: String,
    },

    /// Decode a base64 transaction
    Decode {
        #[arg(value_name = "B64")]
        txn: String,

        /// The input is a signed envelope
        #[arg(long)]
        signed: bool,
    },

    /// Group `u:<b64>` / `s:<b64>` entries by sender
    Group {
        #[arg(value_name = "ENTRY", required = true)]
        entries: Vec<String>,
    },

    /// Sign base64 transactions with a mnemonic
    Sign {
        #[arg(value_name = "B64", required = true)]
        txns: Vec<String>,
    },

    /// Sign with a mnemonic, broadcast and wait for confirmation
    Send {
        #[arg(value_name = "B64", required = true)]
        txns: Vec<String>,

        /// Rounds to wait; defaults to the first transaction's validity window
        #[arg(short, long)]
        wait: Option<u64>,
    },
}

/// Reads the phrase from the terminal once per process
#[derive(Default)]
struct TerminalPrompt {
    phrase: Mutex<Option<Zeroizing<String>>>,
}

#[async_trait]
impl SecretPrompt for TerminalPrompt {
    async fn prompt(&self, message: &str) -> Result<Zeroizing<String>, ProviderError> {
        let mut cached = self.phrase.lock().await;
        if let Some(phrase) = cached.as_ref() {
            return Ok(phrase.clone());
        }

        let message = format!("{}\n> ", message);
        let phrase = tokio::task::spawn_blocking(move || rpassword::prompt_password(message))
            .await
            .map_err(|e| ProviderError::UserRejected(e.to_string()))?
            .map_err(prompt_error)?;
        let phrase = Zeroizing::new(phrase);
        *cached = Some(phrase.clone());
        Ok(phrase)
    }
}

/// Terminal read failures mean no phrase was given
fn prompt_error(e: std::io::Error) -> ProviderError {
    ProviderError::UserRejected(format!("Could not read the mnemonic: {}", e))
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set subscriber");

    if let Err(e) = run(cli).await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), ProviderError> {
    let config = cli.node.config();

    match cli.command {
        Commands::Providers => list_providers(),
        Commands::Status => {
            let node = AlgodClient::new(&config)?;
            node.health().await?;
            let status = node.status().await?;
            println!("network:    {}", config.network);
            println!("node:       {}", node.base_url());
            println!("last round: {}", status.last_round);
        }
        Commands::Account { address } => {
            let info = AlgodClient::new(&config)?.account_information(&address).await?;
            print_json(&info)?;
        }
        Commands::Assets { address } => {
            let info = AlgodClient::new(&config)?.account_information(&address).await?;
            print_json(&info.assets)?;
        }
        Commands::Decode { txn, signed } => {
            let txn = decode_base64_transaction(&txn, signed)?;
            println!("id: {}", txn.id());
            print_json(&txn)?;
        }
        Commands::Group { entries } => {
            let entries = entries
                .iter()
                .map(|e| parse_entry(e))
                .collect::<Result<Vec<_>, _>>()?;
            print_json(&group_transactions_by_sender(&entries)?)?;
        }
        Commands::Sign { txns } => {
            let manager = mnemonic_manager(&config).await?;
            let groups = decode_group(&txns)?;
            let signed = manager.sign_transactions(&groups, None, true).await?;
            for txn in signed {
                println!("{}", encode_base64(&txn));
            }
        }
        Commands::Send { txns, wait } => {
            let manager = mnemonic_manager(&config).await?;
            let groups = decode_group(&txns)?;
            let confirmed = manager.send_transactions(&groups, None, wait).await?;
            info!("Confirmed in round {}", confirmed.confirmed_round);
            print_json(&confirmed)?;
        }
    }

    Ok(())
}

/// Manager holding only the mnemonic provider, already connected
async fn mnemonic_manager(config: &NodeConfig) -> Result<WalletManager, ProviderError> {
    if config.network == Network::Mainnet {
        return Err(ProviderError::InvalidConfig(
            "Mnemonic signing is not available on mainnet; pass --network testnet or another network"
                .to_string(),
        ));
    }
    let env = HostEnvironment {
        prompt: Some(Arc::new(TerminalPrompt::default())),
        ..Default::default()
    };
    let registry = initialize_providers(vec![ProviderDef::new(ProviderId::Mnemonic)], config, &env).await?;
    let manager = WalletManager::new(registry);
    let wallet = manager.connect(ProviderId::Mnemonic, None).await?;
    info!("Signing as {}", wallet.accounts[0].address);
    Ok(manager)
}

fn decode_group(txns: &[String]) -> Result<TxnGroups, ProviderError> {
    Ok(TxnGroups::Flat(
        txns.iter()
            .map(|t| decode_base64(t))
            .collect::<Result<Vec<_>, _>>()?,
    ))
}

fn parse_entry(entry: &str) -> Result<(TxnMarker, String), ProviderError> {
    match entry.split_once(':') {
        Some(("u", txn)) => Ok((TxnMarker::Unsigned, txn.to_string())),
        Some(("s", txn)) => Ok((TxnMarker::Signed, txn.to_string())),
        _ => Err(ProviderError::MalformedInput(format!(
            "Expected u:<b64> or s:<b64>, got {}",
            entry
        ))),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), ProviderError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn list_providers() {
    println!("{:<14} {:<10} {:<14} RELAY", "ID", "CLASS", "NAME");
    for id in ProviderId::ALL {
        let metadata = default_metadata(id);
        println!(
            "{:<14} {:<10} {:<14} {}",
            id.as_str(),
            format!("{:?}", id.class()),
            metadata.name,
            if metadata.is_wallet_connect { "yes" } else { "no" }
        );
    }
}
