//! chainsig - transfers, deployments and contract calls signed by a remote
//! threshold signer
//!
//! Keys never exist locally: the signer returns bare `(r, s)` pairs, the
//! recovery parameter is resolved against the sender address, and the signed
//! legacy transaction is broadcast once.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ethers::types::{Address, Bytes, U256};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

mod address;
mod chain;
mod config;
mod contract;
mod error;
mod signer;
mod tx;

#[cfg(test)]
mod test_utils;

use address::{AddressResolver, ConfiguredAddressResolver, DerivationRequest};
use chain::{ChainProvider, ContractReader};
use config::{ChainConfig, Settings};
use contract::{format_token, ContractCall};
use signer::{sign_with_timeout, HttpSignerClient};
use tx::{
    display_units, BroadcastOutcome, FeeOracle, GasNowOracle, PreparedTransaction,
    RecoveryEncoding, RecoveryResolver, SendReceipt, SendRequest, SigningDigest,
    TransactionSender,
};

#[derive(Parser, Debug)]
#[command(name = "chainsig")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file; defaults to $CHAINSIG_CONFIG or config/default.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the derived sender address for a chain
    Address {
        #[arg(short, long)]
        chain: String,
    },

    /// Sign a random 32-byte digest to check signer connectivity
    SignSample {
        /// Also check that the signature recovers this chain's address
        #[arg(short, long)]
        chain: Option<String>,
    },

    /// Send native currency
    Send {
        #[arg(short, long)]
        chain: String,

        /// Recipient address
        #[arg(long)]
        to: String,

        /// Decimal amount in the chain's currency
        #[arg(long)]
        amount: String,

        #[arg(long)]
        gas_limit: Option<u64>,

        /// Hex calldata
        #[arg(long)]
        data: Option<String>,

        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,

        /// Do not wait for the post-broadcast balance check
        #[arg(long)]
        no_wait: bool,
    },

    /// Deploy contract bytecode from a hex file
    Deploy {
        #[arg(short, long)]
        chain: String,

        #[arg(long)]
        bytecode: PathBuf,

        #[arg(short, long)]
        yes: bool,

        #[arg(long)]
        no_wait: bool,
    },

    /// Send a state-changing contract call
    Call {
        #[arg(short, long)]
        chain: String,

        /// Contract address
        #[arg(long)]
        to: String,

        /// Function signature, e.g. "transfer(address,uint256)"
        #[arg(short, long)]
        function: String,

        /// Function argument, repeated in order
        #[arg(long = "arg")]
        args: Vec<String>,

        /// Decimal amount of native currency to attach
        #[arg(long, default_value = "0")]
        amount: String,

        #[arg(long)]
        gas_limit: Option<u64>,

        #[arg(short, long)]
        yes: bool,

        #[arg(long)]
        no_wait: bool,
    },

    /// Read from a contract without sending a transaction
    View {
        #[arg(short, long)]
        chain: String,

        #[arg(long)]
        to: String,

        #[arg(short, long)]
        function: String,

        /// Comma-separated return types, e.g. "uint256,address"
        #[arg(long, value_delimiter = ',')]
        returns: Vec<String>,

        #[arg(long = "arg")]
        args: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.json_logs);

    let settings = match &cli.config {
        Some(path) => Settings::load_from(path)?,
        None => Settings::load()?,
    };
    info!(
        "Loaded configuration for {} chains",
        settings.enabled_chains().len()
    );

    if let Err(e) = run(cli.command, &settings).await {
        error!("{:#}", e);
        if let Some(err) = e.downcast_ref::<error::ChainSigError>() {
            if err.is_validation() {
                info!("Nothing was signed or sent");
            } else if err.is_retryable() {
                info!("Failure looks transient; running the command again may succeed");
            }
        }
        std::process::exit(1);
    }

    Ok(())
}

async fn run(command: Commands, settings: &Settings) -> Result<()> {
    match command {
        Commands::Address { chain } => {
            let chain_config = settings.chain(&chain)?;
            let derived = ConfiguredAddressResolver::from_settings(settings)
                .resolve(&DerivationRequest::for_chain(settings, &chain))
                .await?;

            let address = format!("{:?}", derived.address);
            println!("{}", address);
            if let Some(public_key) = &derived.public_key {
                println!("Public key: 0x{}", hex::encode(public_key));
            }
            println!("{}", chain_config.address_link(&address));
        }
        Commands::SignSample { chain } => {
            sign_sample(settings, chain.as_deref()).await?;
        }
        Commands::Send {
            chain,
            to,
            amount,
            gas_limit,
            data,
            yes,
            no_wait,
        } => {
            let to = parse_address(&to)?;
            let from = resolve_sender(settings, &chain).await?;
            let mut request = SendRequest::transfer(Some(from), to, amount);
            if let Some(gas_limit) = gas_limit {
                request = request.with_gas_limit(U256::from(gas_limit));
            }
            if let Some(data) = data {
                request = request.with_data(parse_hex(&data).context("Invalid --data")?);
            }

            submit(settings, &chain, request, yes, no_wait).await?;
        }
        Commands::Deploy {
            chain,
            bytecode,
            yes,
            no_wait,
        } => {
            let chain_config = settings.chain(&chain)?;
            let raw = std::fs::read_to_string(&bytecode)
                .with_context(|| format!("Failed to read bytecode file: {:?}", bytecode))?;
            let code = parse_hex(&raw).context("Bytecode file is not hex")?;
            if code.is_empty() {
                anyhow::bail!("Bytecode file {:?} is empty", bytecode);
            }

            let from = resolve_sender(settings, &chain).await?;
            let request =
                SendRequest::deploy(Some(from), code, U256::from(chain_config.deploy_gas_limit));

            submit(settings, &chain, request, yes, no_wait).await?;
        }
        Commands::Call {
            chain,
            to,
            function,
            args,
            amount,
            gas_limit,
            yes,
            no_wait,
        } => {
            let chain_config = settings.chain(&chain)?;
            let contract = parse_address(&to)?;
            let call = ContractCall::parse(&function, &[], &args)?;
            let gas_limit = gas_limit.unwrap_or(chain_config.call_gas_limit);

            let from = resolve_sender(settings, &chain).await?;
            info!("Calling {} on {:?}", call.name(), contract);
            let request = SendRequest::call(
                Some(from),
                contract,
                call.calldata()?,
                amount,
                U256::from(gas_limit),
            );

            submit(settings, &chain, request, yes, no_wait).await?;
        }
        Commands::View {
            chain,
            to,
            function,
            returns,
            args,
        } => {
            let chain_config = settings.chain(&chain)?;
            let contract = parse_address(&to)?;
            let call = ContractCall::parse(&function, &returns, &args)?;

            let provider = ChainProvider::new(chain_config.clone())?;
            let output = provider.call(contract, call.calldata()?).await?;

            if returns.is_empty() {
                println!("0x{}", hex::encode(&output));
            } else {
                for token in call.decode_output(&output)? {
                    println!("{}", format_token(&token));
                }
            }
        }
    }

    Ok(())
}

async fn resolve_sender(settings: &Settings, chain: &str) -> Result<Address> {
    let derived = ConfiguredAddressResolver::from_settings(settings)
        .resolve(&DerivationRequest::for_chain(settings, chain))
        .await?;
    Ok(derived.address)
}

fn build_sender(settings: &Settings, chain: &ChainConfig) -> Result<TransactionSender> {
    let provider = Arc::new(ChainProvider::new(chain.clone())?);

    let fee_oracle: Option<Arc<dyn FeeOracle>> = match &chain.fee_oracle_url {
        Some(url) => Some(Arc::new(GasNowOracle::new(url.clone())?)),
        None => None,
    };

    let signer = Arc::new(HttpSignerClient::new(&settings.signer));
    info!(
        "Signer at {} with {:?} payload order",
        settings.signer.url,
        signer.payload_order()
    );

    Ok(TransactionSender::new(
        chain,
        &settings.signer,
        provider.clone(),
        fee_oracle,
        signer,
        provider,
    ))
}

async fn submit(
    settings: &Settings,
    chain_name: &str,
    request: SendRequest,
    yes: bool,
    no_wait: bool,
) -> Result<()> {
    let chain = settings.chain(chain_name)?;
    let sender = build_sender(settings, chain)?;

    let receipt = if yes {
        sender.send(request).await?
    } else {
        let prepared = sender.prepare(request).await?;
        print_summary(chain, &prepared);

        if !confirm().await? {
            println!("Cancelled.");
            return Ok(());
        }
        sender.execute(prepared).await?
    };

    report(chain, receipt, no_wait).await;

    Ok(())
}

fn print_summary(chain: &ChainConfig, prepared: &PreparedTransaction) {
    let tx = &prepared.tx;
    let amount = |value: U256| format!("{} {}", display_units(value, chain.decimals), chain.currency);

    println!("Chain:     {} ({})", chain.name, tx.chain_id());
    println!("From:      {:?}", prepared.from);
    match tx.to() {
        Some(to) => println!("To:        {:?}", to),
        None => println!("To:        (contract creation)"),
    }
    println!("Value:     {}", amount(tx.value()));
    if !tx.data().is_empty() {
        println!("Data:      {} bytes", tx.data().len());
    }
    println!("Nonce:     {}", tx.nonce());
    println!("Gas limit: {}", tx.gas_limit());
    println!("Gas price: {} gwei", display_units(tx.gas_price(), 9));
    println!("Max cost:  {}", amount(tx.max_cost()));
    println!("Balance:   {}", amount(prepared.balance));
    if let Some(address) = prepared.contract_address() {
        println!("Contract:  {:?}", address);
    }
    println!("Digest:    {}", prepared.digest);
}

async fn confirm() -> Result<bool> {
    tokio::task::spawn_blocking(|| -> Result<bool> {
        print!("Type 'yes' to sign and broadcast: ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        Ok(input.trim().eq_ignore_ascii_case("yes"))
    })
    .await?
}

async fn report(chain: &ChainConfig, receipt: SendReceipt, no_wait: bool) {
    let SendReceipt {
        outcome,
        signed,
        contract_address,
        balance_check,
    } = receipt;

    for line in describe_outcome(chain, &outcome) {
        println!("{}", line);
    }
    let tx = signed.transaction();
    println!(
        "Nonce {} at {} gwei, v = {}",
        tx.nonce(),
        display_units(tx.gas_price(), 9),
        signed.signature().v()
    );

    if let Some(address) = contract_address {
        let address = format!("{:?}", address);
        println!("Contract address: {}", address);
        println!("{}", chain.address_link(&address));
    }

    let Some(mut check) = balance_check else {
        return;
    };

    if no_wait {
        check.cancel();
        return;
    }

    let interrupted = tokio::select! {
        balance = check.wait() => {
            if let Some(balance) = balance {
                println!(
                    "Updated balance: {} {}",
                    display_units(balance, chain.decimals),
                    chain.currency
                );
            }
            false
        }
        _ = signal::ctrl_c() => true,
    };

    if interrupted {
        warn!("Interrupted, balance check cancelled");
        check.cancel();
    }
}

fn describe_outcome(chain: &ChainConfig, outcome: &BroadcastOutcome) -> Vec<String> {
    let hash = format!("{:?}", outcome.tx_hash());
    match outcome {
        BroadcastOutcome::Submitted(_) => vec![
            format!("Transaction sent: {}", hash),
            chain.tx_link(&hash),
        ],
        BroadcastOutcome::AlreadySubmitted { message, .. } => vec![
            format!("Nonce already used on chain ({})", message),
            format!(
                "If this transaction is the one that landed, its hash is {}",
                hash
            ),
            format!("Check: {}", chain.tx_link(&hash)),
        ],
    }
}

async fn sign_sample(settings: &Settings, chain: Option<&str>) -> Result<()> {
    let digest = SigningDigest::from(rand::random::<[u8; 32]>());
    let signer = HttpSignerClient::new(&settings.signer);

    println!("Digest:  {}", digest);
    println!(
        "Payload: 0x{}",
        hex::encode(signer.payload_order().encode(&digest))
    );

    let raw = sign_with_timeout(
        &signer,
        digest,
        &settings.signer.derivation_path,
        settings.signer.timeout(),
    )
    .await?;

    println!("r:       {:#x}", raw.r);
    println!("s:       {:#x}", raw.s);

    if let Some(chain) = chain {
        let expected = resolve_sender(settings, chain).await?;
        let recovered = RecoveryResolver::new(RecoveryEncoding::Legacy)
            .recover(&digest, &raw, expected)?;
        let normalized = recovered.raw();
        if normalized.s != raw.s {
            println!("s (low): {:#x}", normalized.s);
        }
        println!("v:       {} ({:?} parity)", recovered.v(), recovered.parity());
        println!("Signer controls {:?}", expected);
    }

    Ok(())
}

fn parse_address(input: &str) -> Result<Address> {
    input
        .trim()
        .parse::<Address>()
        .map_err(|e| anyhow::anyhow!("Invalid address {:?}: {}", input, e))
}

fn parse_hex(input: &str) -> Result<Bytes> {
    let trimmed = input.trim();
    let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    Ok(Bytes::from(hex::decode(digits)?))
}

fn init_logging(json: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,chainsig=debug,hyper=warn,reqwest=warn"));

    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(fmt::layer().json().with_target(true).with_writer(io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_writer(io::stderr))
            .init();
    }
}
