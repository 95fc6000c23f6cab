//! quill-cli — Command-line wallet for UTXO chains with claimable rewards.
//!
//! Key generation and passphrase encryption, a live session view, and
//! one-shot send and claim flows, all with secure passphrase prompting.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};

use quill_core::{Asset, Fixed8, Network};
use quill_session::state::SessionEvent;
use quill_session::{Credentials, HttpLedgerClient, SessionConfig, SessionController};
use quill_wallet::nep2::{self, KdfParams};
use quill_wallet::{Account, PrivateKey};

/// Quill command-line wallet.
#[derive(Parser)]
#[command(name = "quill-cli")]
#[command(version, about = "Light wallet for UTXO chains with claimable rewards.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new key, optionally passphrase-encrypted.
    Generate(GenerateArgs),
    /// Encrypt a WIF key under a passphrase.
    Encrypt,
    /// Decrypt an encrypted key record back to a WIF key.
    Decrypt(DecryptArgs),
    /// Log in and stream session events until Ctrl-C.
    Session(SessionArgs),
    /// Send an asset.
    Send(SendArgs),
    /// Claim accrued rewards.
    Claim(SessionArgs),
}

#[derive(Args)]
struct GenerateArgs {
    /// Also encrypt the new key under a passphrase.
    #[arg(short, long)]
    encrypt: bool,
}

#[derive(Args)]
struct DecryptArgs {
    /// The encrypted key record.
    record: String,
}

#[derive(Args, Clone)]
struct CredentialArgs {
    /// Plaintext WIF key. Prompted securely when neither option is given.
    #[arg(long, conflicts_with = "encrypted")]
    wif: Option<String>,

    /// Encrypted key record; the passphrase is prompted.
    #[arg(long)]
    encrypted: Option<String>,
}

#[derive(Args)]
struct SessionArgs {
    #[command(flatten)]
    credentials: CredentialArgs,

    /// Network (mainnet or testnet).
    #[arg(short, long, default_value = "mainnet")]
    network: Network,
}

#[derive(Args)]
struct SendArgs {
    #[command(flatten)]
    credentials: CredentialArgs,

    /// Network (mainnet or testnet).
    #[arg(short, long, default_value = "mainnet")]
    network: Network,

    /// Recipient address.
    #[arg(short, long)]
    to: String,

    /// Asset to send (neo or gas).
    #[arg(short, long)]
    asset: String,

    /// Amount to send (e.g. 10.5).
    #[arg(long)]
    amount: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Generate(args) => generate(args),
        Commands::Encrypt => encrypt(),
        Commands::Decrypt(args) => decrypt(args),
        Commands::Session(args) => session(args).await,
        Commands::Send(args) => send(args).await,
        Commands::Claim(args) => claim(args).await,
    }
}

fn generate(args: GenerateArgs) -> Result<()> {
    if args.encrypt {
        let passphrase = prompt_new_passphrase()?;
        let (account, record) =
            nep2::generate_encrypted(&passphrase, KdfParams::default())
                .context("key generation failed")?;
        println!("Address:       {}", account.address());
        println!("WIF:           {}", account.wif());
        println!("Encrypted key: {record}");
        println!("\nWARNING: the WIF will not be shown again. Store it securely.");
    } else {
        let account = Account::generate();
        println!("Address: {}", account.address());
        println!("WIF:     {}", account.wif());
    }
    Ok(())
}

fn encrypt() -> Result<()> {
    let wif = prompt_secret("WIF key")?;
    let key = PrivateKey::from_wif(&wif).context("invalid WIF key")?;
    let passphrase = prompt_new_passphrase()?;
    let record = nep2::encrypt_key(&key, &passphrase, KdfParams::default())
        .context("encryption failed")?;
    println!("{record}");
    Ok(())
}

fn decrypt(args: DecryptArgs) -> Result<()> {
    let passphrase = prompt_secret("Passphrase")?;
    let account = nep2::decrypt_key(&args.record, &passphrase, KdfParams::default())
        .context("decryption failed (check passphrase)")?;
    println!("Address: {}", account.address());
    println!("WIF:     {}", account.wif());
    Ok(())
}

/// Log in, print state on every update, stop on Ctrl-C.
async fn session(args: SessionArgs) -> Result<()> {
    let controller = login(args.credentials, args.network).await?;
    let mut events = controller.subscribe();
    let handle = controller.handle();

    println!("Logged in. Streaming updates; Ctrl-C to stop.");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => {
                let Ok(event) = event else { break };
                match event {
                    SessionEvent::BalanceUpdated => {
                        let (neo, gas) = handle.with(|s| (s.neo_balance, s.gas_balance));
                        println!("balance: {neo} NEO, {gas} GAS");
                    }
                    SessionEvent::PriceUpdated => {
                        println!("price: ${:.2}", handle.with(|s| s.price_usd));
                    }
                    SessionEvent::ClaimAmountsUpdated => {
                        let (a, u) = handle.with(|s| (s.claim_available, s.claim_unspendable));
                        println!("claimable: {a} GAS now, {u} GAS pending");
                    }
                    SessionEvent::HistoryUpdated => {
                        println!("history: {} transactions", handle.with(|s| s.transaction_history.len()));
                    }
                    other => println!("{other:?}"),
                }
            }
        }
    }
    controller.logout().await;
    println!("Logged out.");
    Ok(())
}

async fn send(args: SendArgs) -> Result<()> {
    let asset = match args.asset.to_ascii_lowercase().as_str() {
        "neo" => Asset::Neo,
        "gas" => Asset::Gas,
        other => bail!("unknown asset: {other} (expected neo or gas)"),
    };
    let amount = Fixed8::from_decimal_str(&args.amount)
        .with_context(|| format!("invalid amount: {}", args.amount))?;

    let controller = login(args.credentials, args.network).await?;
    let result = controller
        .send_asset(&args.to, asset, amount)
        .await
        .context("send failed");
    controller.logout().await;
    result?;

    println!("Sent {amount} {asset} to {}", args.to);
    Ok(())
}

async fn claim(args: SessionArgs) -> Result<()> {
    let controller = login(args.credentials, args.network).await?;
    let mut events = controller.subscribe();

    // the claim amounts come from the first sync cycle
    println!("Waiting for claim amounts...");
    loop {
        match events.recv().await {
            Ok(SessionEvent::ClaimAmountsUpdated) => break,
            Ok(_) => continue,
            Err(_) => bail!("session ended before claim amounts arrived"),
        }
    }

    let result = controller.claim_gas().await.context("claim failed");
    controller.logout().await;
    result?;

    println!("Claim confirmed.");
    Ok(())
}

async fn login(
    credentials: CredentialArgs,
    network: Network,
) -> Result<Arc<SessionController<HttpLedgerClient>>> {
    let creds = if let Some(record) = credentials.encrypted {
        let passphrase = prompt_secret("Passphrase")?;
        Credentials::Encrypted { record, passphrase }
    } else if let Some(wif) = credentials.wif {
        Credentials::Wif(wif)
    } else {
        Credentials::Wif(prompt_secret("WIF key")?)
    };

    let controller = Arc::new(SessionController::new(
        HttpLedgerClient::new(),
        network,
        SessionConfig::default(),
    ));
    controller.login(creds).await.context("login failed")?;
    Ok(controller)
}

fn prompt_secret(label: &str) -> Result<String> {
    rpassword::prompt_password(format!("{label}: ")).context("failed to read input")
}

fn prompt_new_passphrase() -> Result<String> {
    let passphrase = prompt_secret("Enter passphrase")?;
    let confirm = prompt_secret("Confirm passphrase")?;
    if passphrase != confirm {
        bail!("Passphrases do not match");
    }
    Ok(passphrase)
}
