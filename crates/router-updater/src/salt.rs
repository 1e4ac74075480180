//! Vanity salt search through an external tool

use std::path::PathBuf;

use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use router_core::DerivationError;
use tokio::process::Command;
use tracing::debug;

/// What a salt search reports back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaltHit {
    pub salt: B256,
    pub address: Address,
}

/// Finds a salt whose CREATE2 address starts with a hex prefix
#[async_trait]
pub trait SaltSearch: Send + Sync {
    async fn search(
        &self,
        factory: Address,
        init_code: &Bytes,
        prefix: &str,
    ) -> anyhow::Result<SaltHit>;
}

/// `cast create2 --starts-with <prefix> -i <initcode> --deployer <factory>`
#[derive(Debug, Clone)]
pub struct CastSaltSearch {
    program: PathBuf,
}

impl CastSaltSearch {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for CastSaltSearch {
    fn default() -> Self {
        Self::new("cast")
    }
}

#[async_trait]
impl SaltSearch for CastSaltSearch {
    async fn search(
        &self,
        factory: Address,
        init_code: &Bytes,
        prefix: &str,
    ) -> anyhow::Result<SaltHit> {
        debug!(program = %self.program.display(), prefix, "Running salt search");
        let output = Command::new(&self.program)
            .arg("create2")
            .arg("--starts-with")
            .arg(prefix)
            .arg("-i")
            .arg(init_code.to_string())
            .arg("--deployer")
            .arg(factory.to_string())
            .output()
            .await?;

        if !output.status.success() {
            anyhow::bail!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(parse_cast_output(&String::from_utf8_lossy(&output.stdout))?)
    }
}

/// Extract `Address:` and `Salt:` lines from cast output.
///
/// The salt is printed either as hex or as `decimal (0xhex)`.
pub fn parse_cast_output(output: &str) -> Result<SaltHit, DerivationError> {
    let mut address = None;
    let mut salt = None;

    for line in output.lines() {
        let line = line.trim();
        if let Some(value) = line.strip_prefix("Address:") {
            let value = value.trim();
            address = Some(
                value
                    .parse::<Address>()
                    .map_err(|_| DerivationError::Unparseable(format!("address {value}")))?,
            );
        } else if let Some(value) = line.strip_prefix("Salt:") {
            salt = Some(parse_salt(value.trim())?);
        }
    }

    match (salt, address) {
        (Some(salt), Some(address)) => Ok(SaltHit { salt, address }),
        _ => Err(DerivationError::Unparseable(output.trim().to_string())),
    }
}

fn parse_salt(value: &str) -> Result<B256, DerivationError> {
    let unparseable = || DerivationError::Unparseable(format!("salt {value}"));

    // "123 (0x7b)" -> prefer the hex inside the parentheses
    let hex_part = value
        .split_once('(')
        .and_then(|(_, rest)| rest.strip_suffix(')'))
        .map(str::trim)
        .or_else(|| value.starts_with("0x").then_some(value));

    let number = match hex_part {
        Some(hex) => {
            let digits = hex.strip_prefix("0x").ok_or_else(unparseable)?;
            U256::from_str_radix(digits, 16).map_err(|_| unparseable())?
        }
        None => U256::from_str_radix(value, 10).map_err(|_| unparseable())?,
    };
    Ok(B256::from(number.to_be_bytes::<32>()))
}
