use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use alloy::primitives::Address;
use anyhow::{anyhow, Result};
use clap::{Arg, ArgMatches, Command};
use rust_decimal::Decimal;
use tracing::{error, info, warn};

use vault_wallet::chain::abi::AbiRegistry;
use vault_wallet::chain::invoker::ContractInvoker;
use vault_wallet::chain::keystore::KeyStore;
use vault_wallet::chain::node::NodeConnection;
use vault_wallet::config::{Config, ContractsConfig};
use vault_wallet::error::WalletError;
use vault_wallet::identity;
use vault_wallet::orchestrator::{AccountOrchestrator, Confirmation};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let matches = cli().get_matches();

    if matches.get_flag("generate-config") {
        println!("{}", Config::generate_sample());
        return Ok(());
    }
    if matches.get_flag("config-path") {
        println!("{}", Config::default_config_path()?.display());
        return Ok(());
    }

    let config_path = matches.get_one::<String>("config").map(|s| s.as_str());
    let config = Config::load_or_default(config_path).await?;

    let Some((name, sub)) = matches.subcommand() else {
        return Err(anyhow!("no command given; try --help"));
    };

    // Keystore commands work fully offline, before any identity or
    // connection setup.
    match name {
        "export-keystore" => return export_keystore(&matches, sub).await,
        "load-keystore" => return load_keystore(sub),
        _ => {}
    }

    let data_dir = data_dir(&matches)?;
    let (identity, keys) = identity::load_or_create(&data_dir).await?;
    info!("User {} / wallet {}", identity.user_id, identity.wallet_address);

    let contracts_path = matches
        .get_one::<String>("contracts")
        .map(PathBuf::from)
        .unwrap_or_else(|| data_dir.join("contracts.json"));
    let contracts = ContractsConfig::load(&contracts_path).await?;

    let node = Arc::new(NodeConnection::establish(&config.network).await);
    if let Some(endpoint) = node.active_endpoint().await {
        info!("Active endpoint: {}", endpoint);
    } else {
        warn!("Offline mode: balances read as 0, transactions will fail");
    }

    let invoker = Arc::new(ContractInvoker::new(
        node.clone(),
        keys,
        config.gas.clone(),
        config.poll_interval(),
    ));
    let orchestrator = AccountOrchestrator::new(
        invoker.clone(),
        AbiRegistry::standard()?,
        &contracts,
        config.receipt_timeout(),
    )?;

    let result = match name {
        "status" => status(&config, &node, &orchestrator).await,
        "balance" => balance(&orchestrator).await,
        "deposit" => deposit(&config, &matches, sub, &orchestrator).await,
        "faucet" => faucet(&config, &matches, sub, &orchestrator).await,
        "claim" => claim(&config, &matches, sub, &orchestrator).await,
        "reward" => reward(&config, &matches, sub, &orchestrator).await,
        "epoch" => epoch(sub, &orchestrator).await,
        other => Err(anyhow!("unknown command '{}'", other)),
    };

    if let Err(e) = &result {
        error!("{}", e);
    }
    result
}

fn cli() -> Command {
    Command::new("vault-wallet")
        .version("0.1.0")
        .about("Headless Sepolia wallet for the vault/reward demo contracts")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Path to configuration file"),
        )
        .arg(
            Arg::new("contracts")
                .long("contracts")
                .value_name("FILE")
                .help("Path to the deployed-contracts JSON file"),
        )
        .arg(
            Arg::new("data-dir")
                .long("data-dir")
                .value_name("DIR")
                .help("Directory holding the per-device identity record"),
        )
        .arg(
            Arg::new("yes")
                .short('y')
                .long("yes")
                .help("Confirm state-changing operations without prompting")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .help("Print a sample configuration file and exit")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("config-path")
                .long("config-path")
                .help("Print the default configuration file path and exit")
                .action(clap::ArgAction::SetTrue),
        )
        .subcommand(Command::new("status").about("Connection, wallet, and contract status"))
        .subcommand(Command::new("balance").about("ETH and USDC balances for this wallet"))
        .subcommand(
            Command::new("deposit")
                .about("Approve and deposit USDC into the vault (two confirmed transactions)")
                .arg(Arg::new("amount").required(true).help("USDC amount, e.g. 100 or 12.5")),
        )
        .subcommand(
            Command::new("faucet")
                .about("Mint test USDC to this wallet")
                .arg(Arg::new("amount").default_value("1000").help("USDC amount to mint")),
        )
        .subcommand(
            Command::new("claim")
                .about("Claim an epoch reward from the reward pool")
                .arg(Arg::new("epoch").long("epoch").default_value("1"))
                .arg(Arg::new("score").long("score").default_value("100"))
                .arg(
                    Arg::new("signature")
                        .long("signature")
                        .value_name("HEX")
                        .help("Oracle signature over (epoch, score); 65 zero bytes if omitted"),
                ),
        )
        .subcommand(
            Command::new("reward")
                .about("Send a direct USDC reward (10 + score/10) from this wallet")
                .arg(Arg::new("recipient").required(true).help("Recipient address"))
                .arg(Arg::new("score").long("score").default_value("100")),
        )
        .subcommand(
            Command::new("epoch")
                .about("Show reward-pool epoch info and this wallet's calculated reward")
                .arg(Arg::new("id").required(true).help("Epoch id"))
                .arg(Arg::new("score").long("score").default_value("100")),
        )
        .subcommand(
            Command::new("export-keystore")
                .about("Save this device's key as an encrypted keystore file")
                .arg(Arg::new("path").required(true))
                .arg(Arg::new("passphrase").long("passphrase").required(true)),
        )
        .subcommand(
            Command::new("load-keystore")
                .about("Decrypt a keystore file and print its address")
                .arg(Arg::new("path").required(true))
                .arg(Arg::new("passphrase").long("passphrase").required(true)),
        )
}

fn data_dir(matches: &ArgMatches) -> Result<PathBuf> {
    if let Some(dir) = matches.get_one::<String>("data-dir") {
        return Ok(PathBuf::from(dir));
    }
    let base = dirs::data_dir().ok_or_else(|| anyhow!("could not determine data directory"))?;
    Ok(base.join("vault-wallet"))
}

/// State-changing commands refuse to run without `--yes`; this is the
/// headless stand-in for the reference UI's confirmation dialogs.
fn require_confirmation(matches: &ArgMatches, action: &str) -> Result<Confirmation> {
    if matches.get_flag("yes") {
        Ok(Confirmation::granted())
    } else {
        Err(anyhow!(
            "'{}' sends a real transaction and costs gas; re-run with --yes to confirm",
            action
        ))
    }
}

fn parse_amount(sub: &ArgMatches) -> Result<Decimal> {
    let raw = sub
        .get_one::<String>("amount")
        .ok_or_else(|| anyhow!("missing amount"))?;
    Decimal::from_str(raw).map_err(|e| anyhow!("invalid amount '{}': {}", raw, e))
}

fn parse_u64(sub: &ArgMatches, id: &str) -> Result<u64> {
    let raw = sub
        .get_one::<String>(id)
        .ok_or_else(|| anyhow!("missing {}", id))?;
    raw.parse().map_err(|e| anyhow!("invalid {} '{}': {}", id, raw, e))
}

fn print_explorer_link(config: &Config, tx_hash: &str) {
    if let Some(url) = config.explorer_tx_url(tx_hash) {
        println!("View: {}", url);
    }
}

async fn status(
    config: &Config,
    node: &Arc<NodeConnection>,
    orchestrator: &AccountOrchestrator,
) -> Result<()> {
    let connected = node.is_connected().await;
    println!("Network:   Sepolia (chain id {})", config.network.chain_id);
    println!("Connected: {}", connected);
    if let Some(endpoint) = node.active_endpoint().await {
        println!("Endpoint:  {}", endpoint);
    }
    if connected {
        println!("Block:     {}", node.block_number().await?);
    }
    println!("Wallet:    {}", orchestrator.sender().to_checksum(None));

    for (name, address) in [
        ("MockUSDC", orchestrator.usdc_address()),
        ("BrowserVault", orchestrator.vault_address()),
        ("RewardPool", orchestrator.reward_pool_address()),
    ] {
        if connected {
            let deployed = !node.code_at(address).await?.is_empty();
            println!(
                "{:<13} {} ({})",
                name,
                address.to_checksum(None),
                if deployed { "deployed" } else { "no code at address" }
            );
        } else {
            println!("{:<13} {} (unverified, offline)", name, address.to_checksum(None));
        }
    }

    balance(orchestrator).await
}

async fn balance(orchestrator: &AccountOrchestrator) -> Result<()> {
    let sender = orchestrator.sender();
    let eth = orchestrator.tokens().native_balance(sender).await;
    let usdc = orchestrator
        .tokens()
        .token_balance(orchestrator.usdc_address(), sender)
        .await;
    println!("ETH:  {}", eth);
    println!("USDC: {}", usdc);
    Ok(())
}

async fn deposit(
    config: &Config,
    matches: &ArgMatches,
    sub: &ArgMatches,
    orchestrator: &AccountOrchestrator,
) -> Result<()> {
    let amount = parse_amount(sub)?;
    let confirmation = require_confirmation(matches, "deposit")?;

    let outcome = orchestrator.deposit(amount, confirmation).await?;
    println!(
        "Approval confirmed in block {}",
        outcome.approval.block_number.unwrap_or_default()
    );
    println!(
        "Deposit confirmed in block {}",
        outcome.deposit.block_number.unwrap_or_default()
    );
    print_explorer_link(config, &format!("{:?}", outcome.deposit.tx_hash));
    Ok(())
}

async fn faucet(
    config: &Config,
    matches: &ArgMatches,
    sub: &ArgMatches,
    orchestrator: &AccountOrchestrator,
) -> Result<()> {
    let amount = parse_amount(sub)?;
    let confirmation = require_confirmation(matches, "faucet")?;

    let call = orchestrator.faucet_mint(amount, confirmation).await?;
    println!(
        "Minted {} USDC in block {}",
        amount,
        call.receipt.block_number.unwrap_or_default()
    );
    print_explorer_link(config, &format!("{:?}", call.receipt.tx_hash));
    Ok(())
}

async fn claim(
    config: &Config,
    matches: &ArgMatches,
    sub: &ArgMatches,
    orchestrator: &AccountOrchestrator,
) -> Result<()> {
    let epoch_id = parse_u64(sub, "epoch")?;
    let score = parse_u64(sub, "score")?;
    let signature = match sub.get_one::<String>("signature") {
        Some(hex_sig) => hex::decode(hex_sig.trim_start_matches("0x"))
            .map_err(|e| anyhow!("invalid signature hex: {}", e))?,
        // The demo pool accepts a placeholder signature.
        None => vec![0u8; 65],
    };
    let confirmation = require_confirmation(matches, "claim")?;

    let call = orchestrator
        .claim_reward(epoch_id, score, signature, confirmation)
        .await?;
    println!(
        "Reward claimed in block {}",
        call.receipt.block_number.unwrap_or_default()
    );
    print_explorer_link(config, &format!("{:?}", call.receipt.tx_hash));
    Ok(())
}

async fn reward(
    config: &Config,
    matches: &ArgMatches,
    sub: &ArgMatches,
    orchestrator: &AccountOrchestrator,
) -> Result<()> {
    let recipient = sub
        .get_one::<String>("recipient")
        .ok_or_else(|| anyhow!("missing recipient"))?;
    let recipient = Address::from_str(recipient)
        .map_err(|e| anyhow!("invalid recipient address '{}': {}", recipient, e))?;
    let score = parse_u64(sub, "score")?;
    let confirmation = require_confirmation(matches, "reward")?;

    let call = orchestrator
        .send_direct_reward(recipient, score, confirmation)
        .await?;
    println!(
        "Reward sent in block {}",
        call.receipt.block_number.unwrap_or_default()
    );
    print_explorer_link(config, &format!("{:?}", call.receipt.tx_hash));
    Ok(())
}

async fn epoch(sub: &ArgMatches, orchestrator: &AccountOrchestrator) -> Result<()> {
    let epoch_id = parse_u64(sub, "id")?;
    let score = parse_u64(sub, "score")?;

    let info = orchestrator.epoch_info(epoch_id).await?;
    println!("Epoch {}:", epoch_id);
    println!("  yield:     {}", info.yield_amount);
    println!("  total:     {}", info.total_score);
    println!("  score set: {}", info.score_set);
    println!("  remaining: {}", info.remaining_yield);

    let reward = orchestrator.calculate_reward(epoch_id, score).await?;
    println!("  reward for score {}: {}", score, reward);
    Ok(())
}

async fn export_keystore(matches: &ArgMatches, sub: &ArgMatches) -> Result<()> {
    let data_dir = data_dir(matches)?;
    let (_, keys) = identity::load_or_create(&data_dir).await?;

    let path = sub
        .get_one::<String>("path")
        .ok_or_else(|| anyhow!("missing path"))?;
    let passphrase = sub
        .get_one::<String>("passphrase")
        .ok_or_else(|| anyhow!("missing passphrase"))?;

    keys.save_encrypted(path, passphrase)?;
    println!("Keystore written to {}", path);
    Ok(())
}

fn load_keystore(sub: &ArgMatches) -> Result<()> {
    let path = sub
        .get_one::<String>("path")
        .ok_or_else(|| anyhow!("missing path"))?;
    let passphrase = sub
        .get_one::<String>("passphrase")
        .ok_or_else(|| anyhow!("missing passphrase"))?;

    match KeyStore::load_encrypted(path, passphrase) {
        Ok(keys) => {
            println!("{}", keys.address().to_checksum(None));
            Ok(())
        }
        Err(WalletError::DecryptionFailed(reason)) => {
            Err(anyhow!("decryption failed (wrong passphrase or corrupt file): {}", reason))
        }
        Err(e) => Err(e.into()),
    }
}
