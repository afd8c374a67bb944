// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::process::ExitCode;
use std::sync::Arc;

use alloy::providers::ProviderBuilder;
use chrono::DateTime;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use fhevm_circle::blockchain::{
    self, client, format_amount, parse_amount, AlloyCircleContract, ChainClient, HttpConnector,
    LocalWallet, NetworkConfig, TxReceipt,
};
use fhevm_circle::circle::{CircleContract, CircleSession};
use fhevm_circle::config::{
    SessionConfig, ADDRESS_BOOK_ENV, CONTRACT_ADDRESS_ENV, LOG_FORMAT_ENV, MOCK_CHAINS_ENV,
    PRIVATE_KEY_ENV, RELAYER_SDK_URL_ENV, RPC_URL_ENV,
};
use fhevm_circle::error::FhevmError;
use fhevm_circle::fhevm::{
    resolver, ChainResolution, DetachedSdkSource, Endpoint, FactoryStatus, InstanceFactory,
    SdkRegistry, StatusLog,
};

const ETH_DECIMALS: u8 = 18;

#[derive(Parser)]
#[command(name = "fhevm-circle", version, about = "Confidential FriendCircle client")]
struct Cli {
    /// JSON-RPC endpoint of the host chain
    #[arg(long, global = true, env = RPC_URL_ENV)]
    rpc_url: Option<String>,

    /// FriendCircle contract address
    #[arg(long, global = true, env = CONTRACT_ADDRESS_ENV)]
    contract: Option<String>,

    /// Deployment address book used when no contract address is given
    #[arg(long, global = true, env = ADDRESS_BOOK_ENV)]
    address_book: Option<String>,

    /// Hex private key of the signing account
    #[arg(long, global = true, env = PRIVATE_KEY_ENV, hide_env_values = true)]
    private_key: Option<String>,

    /// Extra development chains (`id=url,id=url`)
    #[arg(long, global = true, env = MOCK_CHAINS_ENV)]
    mock_chains: Option<String>,

    /// Relayer SDK bundle location
    #[arg(long, global = true, env = RELAYER_SDK_URL_ENV)]
    relayer_sdk_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    fn setting(&self, key: &str) -> Option<String> {
        match key {
            RPC_URL_ENV => self.rpc_url.clone(),
            CONTRACT_ADDRESS_ENV => self.contract.clone(),
            ADDRESS_BOOK_ENV => self.address_book.clone(),
            PRIVATE_KEY_ENV => self.private_key.clone(),
            MOCK_CHAINS_ENV => self.mock_chains.clone(),
            RELAYER_SDK_URL_ENV => self.relayer_sdk_url.clone(),
            _ => None,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Show chain resolution, exposed accounts and FHEVM instance status
    Status,
    /// List every post
    Posts,
    /// Publish a post
    Post {
        text: String,
        #[arg(long, default_value = "")]
        ipfs: String,
    },
    /// Like a post with an encrypted 1
    Like {
        id: u64,
        /// Fee in wei; defaults to the contract's like fee
        #[arg(long)]
        fee_wei: Option<String>,
    },
    /// Tip a post
    Tip {
        id: u64,
        /// Amount in ETH
        amount: String,
    },
    /// Grant yourself decrypt permission on a post
    Grant { id: u64 },
    /// Decrypt a post's like count and tip total
    Stats { id: u64 },
}

impl Command {
    fn needs_instance(&self) -> bool {
        matches!(self, Command::Like { .. } | Command::Stats { .. })
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var(LOG_FORMAT_ENV)
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling");
            interrupt.cancel();
        }
    });

    let result = tokio::select! {
        result = run(cli, cancel.clone()) => result,
        _ = cancel.cancelled() => Err(FhevmError::Cancelled),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, cancel: CancellationToken) -> Result<(), FhevmError> {
    let config = SessionConfig::from_lookup(|key| cli.setting(key))?;
    tracing::debug!(config = ?config, "Loaded configuration");

    let endpoint = Endpoint::Url(config.rpc_url.clone());
    let resolution = resolver::resolve(&endpoint, &config.mock_chains).await?;
    let network = blockchain::network_for_chain(resolution.chain_id);
    tracing::info!(
        chain_id = resolution.chain_id,
        is_mock = resolution.is_mock,
        network = network.as_ref().map(|n| n.name).unwrap_or("unknown"),
        "Connected"
    );

    let registry =
        SdkRegistry::init_global(Arc::new(DetachedSdkSource), config.relayer_sdk_url.clone());
    let factory = InstanceFactory::new(registry, Arc::new(HttpConnector));
    let status = StatusLog::new();

    if let Command::Status = cli.command {
        return show_status(&config, &endpoint, &resolution, &factory, &status, &cancel).await;
    }

    let instance = if cli.command.needs_instance() {
        Some(
            factory
                .create(&endpoint, &config.mock_chains, &cancel, Some(&status))
                .await?,
        )
    } else {
        None
    };

    let contract_address = config
        .resolve_contract_address(resolution.chain_id)?
        .to_string();
    let wallet = match config.private_key.as_deref() {
        Some(key) => LocalWallet::from_hex(key)?,
        None => LocalWallet::unset(),
    };
    let url: url::Url = config.rpc_url.parse().map_err(|e| {
        FhevmError::Config(format!("{RPC_URL_ENV}={}: {e}", config.rpc_url))
    })?;

    match wallet.ethereum_wallet() {
        Some(signing) => {
            let provider = ProviderBuilder::new().wallet(signing).connect_http(url);
            let contract = AlloyCircleContract::new(&provider, &contract_address)?;
            let session = CircleSession::new(contract, wallet, instance);
            execute(&session, cli.command, network.as_ref()).await
        }
        None => {
            let provider = ProviderBuilder::new().connect_http(url);
            let contract = AlloyCircleContract::new(&provider, &contract_address)?;
            let session = CircleSession::new(contract, wallet, instance);
            execute(&session, cli.command, network.as_ref()).await
        }
    }
}

async fn show_status(
    config: &SessionConfig,
    endpoint: &Endpoint,
    resolution: &ChainResolution,
    factory: &InstanceFactory,
    status: &StatusLog,
    cancel: &CancellationToken,
) -> Result<(), FhevmError> {
    let chain = ChainClient::new(&config.rpc_url)?;
    let network = blockchain::network_for_chain(resolution.chain_id);

    println!("RPC:          {}", chain.rpc_url());
    println!("Chain id:     {}", resolution.chain_id);
    println!(
        "Network:      {}",
        network.as_ref().map(|n| n.name).unwrap_or("unknown")
    );
    println!("Mock chain:   {}", resolution.is_mock);
    println!("Block:        {}", chain.get_block_number().await?);

    match client::client_version(&chain).await {
        Ok(version) => println!("Client:       {version}"),
        Err(e) => tracing::debug!(error = %e, "web3_clientVersion unavailable"),
    }
    match client::exposed_accounts(&chain).await {
        Ok(accounts) => {
            println!("Accounts:     {}", accounts.len());
            for account in accounts {
                println!("  {account}");
            }
        }
        Err(e) => tracing::debug!(error = %e, "Accounts unavailable"),
    }

    match factory
        .create(endpoint, &config.mock_chains, cancel, Some(status))
        .await
    {
        Ok(instance) => println!(
            "Instance:     {} (chain {})",
            instance.kind(),
            instance.chain_id()
        ),
        Err(FhevmError::Cancelled) => return Err(FhevmError::Cancelled),
        Err(e) => println!("Instance:     unavailable ({e})"),
    }

    let trail: Vec<&str> = status.snapshot().iter().map(FactoryStatus::as_str).collect();
    println!("Status:       {}", trail.join(" -> "));
    Ok(())
}

async fn execute<C: CircleContract>(
    session: &CircleSession<C, LocalWallet>,
    command: Command,
    network: Option<&NetworkConfig>,
) -> Result<(), FhevmError> {
    match command {
        Command::Status => {}
        Command::Posts => {
            let posts = session.all_posts().await?;
            if posts.is_empty() {
                println!("No posts yet.");
            }
            for entry in posts {
                println!(
                    "#{} {} by {}",
                    entry.id,
                    format_timestamp(entry.post.timestamp),
                    entry.post.author
                );
                println!("    {}", entry.post.text);
                if !entry.post.ipfs_hash.is_empty() {
                    println!("    ipfs://{}", entry.post.ipfs_hash);
                }
            }
        }
        Command::Post { text, ipfs } => {
            report(&session.create_post(&text, &ipfs).await?, network);
        }
        Command::Like { id, fee_wei } => {
            let fee = fee_wei.map(|raw| parse_amount(&raw, 0)).transpose()?;
            report(&session.like(id, fee).await?, network);
        }
        Command::Tip { id, amount } => {
            let wei = parse_amount(&amount, ETH_DECIMALS)?;
            report(&session.tip(id, wei).await?, network);
        }
        Command::Grant { id } => {
            report(&session.grant_decrypt_for_post(id).await?, network);
        }
        Command::Stats { id } => {
            let stats = session.decrypt_post_stats(id).await?;
            println!("Post #{id}");
            println!("  likes: {}", stats.likes);
            println!("  tips:  {} ETH", format_amount(stats.tips, ETH_DECIMALS));
        }
    }

    if let Some(message) = session.message() {
        println!("{message}");
    }
    Ok(())
}

fn report(receipt: &TxReceipt, network: Option<&NetworkConfig>) {
    println!(
        "Confirmed {} in block {} (gas {})",
        receipt.tx_hash, receipt.block_number, receipt.gas_used
    );
    if let Some(link) = network.and_then(|n| receipt.explorer_url(n)) {
        println!("{link}");
    }
}

fn format_timestamp(timestamp: u64) -> String {
    i64::try_from(timestamp)
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| timestamp.to_string())
}
