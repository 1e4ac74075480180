//! Router sync CLI binary
//!
//! Run with:
//! ```bash
//! cargo run -p router-updater --bin router-sync -- --env beta update-router --logic community,profile
//! ```

use std::path::{Path, PathBuf};

use alloy_primitives::{Address, B256};
use clap::{Args, Parser, Subcommand};
use router_core::{parse_hex_bytes, JsonFileStore};
use router_updater::{
    CastSaltSearch, DeployOutcome, DeployRequest, ForgeVerifier, RpcChainClient, SyncConfig,
    SyncService,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "router-sync")]
#[command(about = "Deploy logic modules and keep the router table in sync")]
struct Cli {
    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Command,
}

/// Values taking precedence over the config file
#[derive(Args, Debug)]
struct Overrides {
    /// JSON config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(long, global = true)]
    rpc_url: Option<String>,

    /// Sending account (defaults to the node's first account)
    #[arg(long, global = true)]
    sender: Option<Address>,

    #[arg(long, global = true)]
    chain_id: Option<u64>,

    /// Deployment environment (dev, beta, prod)
    #[arg(long, global = true)]
    env: Option<String>,

    #[arg(long, global = true)]
    network: Option<String>,

    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[arg(long, global = true)]
    records_dir: Option<PathBuf>,

    #[arg(long, global = true)]
    artifacts_dir: Option<PathBuf>,

    /// CREATE2 factory address
    #[arg(long, global = true)]
    factory: Option<Address>,

    #[arg(long, global = true)]
    vanity_prefix: Option<String>,

    /// Verify sources after fresh deployments
    #[arg(long, global = true)]
    verify: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Deploy logic modules and route their functions in one multicall
    UpdateRouter {
        /// Comma-separated logic names, e.g. community,profile
        #[arg(long, value_delimiter = ',', required = true)]
        logic: Vec<String>,
    },
    /// Print the edits update-router would submit, without sending anything
    Plan {
        #[arg(long, value_delimiter = ',', required = true)]
        logic: Vec<String>,
    },
    /// Deterministically deploy one role
    Deploy(RoleArgs),
    /// Replace a role's deploy record with new init code
    Redeploy(RoleArgs),
    /// Derive the CREATE2 address of init code and salt
    Address {
        #[arg(long)]
        init_code: PathBuf,
        #[arg(long)]
        salt: B256,
    },
}

#[derive(Args, Debug)]
struct RoleArgs {
    /// Address book key, e.g. fixedFeeCommunityCond
    #[arg(long)]
    role: String,

    /// File holding hex creation code
    #[arg(long)]
    init_code: PathBuf,

    /// Hex ABI-encoded constructor arguments
    #[arg(long)]
    constructor_args: Option<String>,

    /// Contract identifier passed to the verifier
    #[arg(long)]
    contract: Option<String>,
}

impl Overrides {
    fn into_config(self) -> anyhow::Result<SyncConfig> {
        let mut config = match &self.config {
            Some(path) => SyncConfig::load(path)?,
            None => SyncConfig::default(),
        };

        if let Some(v) = self.rpc_url {
            config.rpc_url = v;
        }
        if let Some(v) = self.sender {
            config.sender = Some(v);
        }
        if let Some(v) = self.chain_id {
            config.chain_id = v;
        }
        if let Some(v) = self.env {
            config.env = v;
        }
        if let Some(v) = self.network {
            config.network = v;
        }
        if let Some(v) = self.data_dir {
            config.data_dir = v;
        }
        if let Some(v) = self.records_dir {
            config.records_dir = v;
        }
        if let Some(v) = self.artifacts_dir {
            config.artifacts_dir = v;
        }
        if let Some(v) = self.factory {
            config.factory = v;
        }
        if let Some(v) = self.vanity_prefix {
            config.vanity_prefix = v;
        }
        config.verify |= self.verify;
        Ok(config)
    }
}

type Service = SyncService<RpcChainClient, CastSaltSearch, JsonFileStore>;

async fn connect(config: SyncConfig) -> anyhow::Result<Service> {
    let chain = RpcChainClient::new(&config.rpc_url, config.chain_id, config.gas_limit)
        .await?
        .with_sender(config.sender)
        .with_confirmation(config.poll_interval(), config.confirmation_timeout());
    let store = JsonFileStore::new(&config.data_dir, &config.records_dir);
    let verifier = ForgeVerifier::new(config.chain_id);
    Ok(SyncService::new(config, chain, CastSaltSearch::default(), store).with_verifier(verifier))
}

fn read_code(path: &Path) -> anyhow::Result<alloy_primitives::Bytes> {
    let hex = std::fs::read_to_string(path)?;
    Ok(parse_hex_bytes(&path.display().to_string(), &hex)?)
}

fn role_request(args: RoleArgs) -> anyhow::Result<DeployRequest> {
    let mut request = DeployRequest::new(args.role, read_code(&args.init_code)?);
    request.constructor_args = args
        .constructor_args
        .map(|hex| parse_hex_bytes("constructor args", &hex))
        .transpose()?;
    request.contract = args.contract;
    Ok(request)
}

fn describe(outcome: &DeployOutcome) -> String {
    match outcome {
        DeployOutcome::Deployed(receipt) => {
            format!("deployed in tx {} (block {})", receipt.tx_hash, receipt.block_number)
        }
        DeployOutcome::Skipped => "already deployed".to_string(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("router_updater=info".parse()?))
        .init();

    let cli = Cli::parse();
    let config = cli.overrides.into_config()?;

    match cli.command {
        Command::Address { init_code, salt } => {
            let code = read_code(&init_code)?;
            let address = config.factory().derive(salt, &code);
            println!("{}", address.to_checksum(None));
        }
        Command::Plan { logic } => {
            let service = connect(config).await?;
            let plan = service.plan(&logic).await?;
            for role in &plan.roles {
                println!(
                    "{}: {:?} -> {} ({} remove, {} update, {} add)",
                    role.role,
                    role.previous,
                    role.record.address,
                    role.edits.removes,
                    role.edits.updates,
                    role.edits.adds
                );
            }
            for edit in plan.batch.iter() {
                println!("  {:<6} {} {}", edit.kind(), edit.selector(), edit.signature());
            }
            println!("multicall calldata: {}", plan.calldata());
        }
        Command::UpdateRouter { logic } => {
            let service = connect(config).await?;
            let report = service.update_router(&logic).await?;
            for (role, outcome) in &report.deployments {
                println!("[OK] {role}: {}", describe(outcome));
            }
            match report.tx {
                Some(tx) => println!("[OK] {} edits applied in tx {tx}", report.plan.batch.len()),
                None => println!("[OK] router already in sync"),
            }
        }
        Command::Deploy(args) => {
            let service = connect(config).await?;
            let report = service.deploy_role(&role_request(args)?).await?;
            println!("[OK] {} at {}: {}", report.role, report.address, describe(&report.outcome));
        }
        Command::Redeploy(args) => {
            let service = connect(config).await?;
            let report = service.redeploy_role(&role_request(args)?).await?;
            println!(
                "[OK] {} moved from {:?} to {}: {}",
                report.role,
                report.previous,
                report.address,
                describe(&report.outcome)
            );
        }
    }

    Ok(())
}
