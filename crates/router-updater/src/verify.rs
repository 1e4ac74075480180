//! Source verification with a bounded retry loop

use std::path::PathBuf;

use alloy_primitives::{Address, Bytes};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{info, warn};

use crate::config::RetryPolicy;

/// A contract to verify on the block explorer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyRequest {
    pub address: Address,
    /// Contract name or `path:Name` identifier
    pub contract: String,
    pub constructor_args: Option<Bytes>,
}

#[async_trait]
pub trait ContractVerifier: Send + Sync {
    async fn verify(&self, request: &VerifyRequest) -> anyhow::Result<()>;
}

/// `forge verify-contract`
#[derive(Debug, Clone)]
pub struct ForgeVerifier {
    program: PathBuf,
    chain_id: u64,
}

impl ForgeVerifier {
    pub fn new(chain_id: u64) -> Self {
        Self {
            program: PathBuf::from("forge"),
            chain_id,
        }
    }

    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }
}

#[async_trait]
impl ContractVerifier for ForgeVerifier {
    async fn verify(&self, request: &VerifyRequest) -> anyhow::Result<()> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("verify-contract")
            .arg(request.address.to_string())
            .arg(&request.contract)
            .arg("--chain-id")
            .arg(self.chain_id.to_string())
            .arg("--watch");
        if let Some(args) = &request.constructor_args {
            cmd.arg("--constructor-args").arg(args.to_string());
        }

        let output = cmd.output().await?;
        if !output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("{} {}", stdout.trim(), stderr.trim());
        }
        Ok(())
    }
}

/// How a verification loop ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    Verified { attempts: u32 },
    AlreadyVerified { attempts: u32 },
    GaveUp { attempts: u32, last_error: String },
}

impl VerifyOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::GaveUp { .. })
    }
}

fn is_already_verified(error: &anyhow::Error) -> bool {
    error.to_string().to_ascii_lowercase().contains("already verified")
}

/// Run `verifier` until it succeeds, reports already-verified, or the policy
/// runs out of attempts. Never fails the caller: giving up is only logged.
pub async fn verify_with_retry<V: ContractVerifier + ?Sized>(
    verifier: &V,
    request: &VerifyRequest,
    policy: &RetryPolicy,
) -> VerifyOutcome {
    let max_attempts = policy.max_attempts.max(1);
    let mut last_error = String::new();

    for attempt in 1..=max_attempts {
        tokio::time::sleep(policy.delay_for(attempt)).await;
        info!(address = %request.address, contract = %request.contract, attempt, "Verifying contract");

        match verifier.verify(request).await {
            Ok(()) => return VerifyOutcome::Verified { attempts: attempt },
            Err(e) if is_already_verified(&e) => {
                info!(address = %request.address, "Contract already verified");
                return VerifyOutcome::AlreadyVerified { attempts: attempt };
            }
            Err(e) => {
                warn!(address = %request.address, attempt, error = %e, "Verification failed, retrying");
                last_error = e.to_string();
            }
        }
    }

    warn!(
        address = %request.address,
        contract = %request.contract,
        attempts = max_attempts,
        error = %last_error,
        "Giving up on verification"
    );
    VerifyOutcome::GaveUp {
        attempts: max_attempts,
        last_error,
    }
}
