//! Deployment and router synchronization service
//!
//! This crate drives the on-chain side of a modular application:
//! 1. Resolves each role's deploy record (stored, or a fresh vanity salt search)
//! 2. Deploys through the CREATE2 factory only when no code exists yet
//! 3. Reads the router table and diffs it against each module's interface
//! 4. Submits every edit in one atomic `multicall`
//! 5. Records the new role addresses once the batch is confirmed
//!
//! ## Usage
//!
//! ```no_run
//! use router_core::JsonFileStore;
//! use router_updater::{CastSaltSearch, RpcChainClient, SyncConfig, SyncService};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = SyncConfig::default();
//!     let chain = RpcChainClient::new(&config.rpc_url, config.chain_id, config.gas_limit)
//!         .await?
//!         .with_sender(config.sender);
//!     let store = JsonFileStore::new(&config.data_dir, &config.records_dir);
//!     let service = SyncService::new(config, chain, CastSaltSearch::default(), store);
//!     service.update_router(&["community".to_string()]).await?;
//!     Ok(())
//! }
//! ```

mod config;
mod deployer;
mod error;
mod router;
mod rpc;
mod salt;
mod service;
mod verify;

pub use config::{Backoff, RetryPolicy, SyncConfig};
pub use deployer::{compute_target, ensure_deployed, DeployOutcome};
pub use error::PipelineError;
pub use router::{submit_batch, RouterSnapshot};
pub use rpc::{ChainClient, RpcChainClient, TxReceipt};
pub use salt::{parse_cast_output, CastSaltSearch, SaltHit, SaltSearch};
pub use service::{
    DeployRequest, RecordSource, RolePlan, RoleReport, SyncPlan, SyncReport, SyncService,
    SyncStage,
};
pub use verify::{verify_with_retry, ContractVerifier, ForgeVerifier, VerifyOutcome, VerifyRequest};
