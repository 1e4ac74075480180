//! Deterministic deployment: target computation and idempotent deploy

use alloy_primitives::{Address, Bytes};
use router_core::{matches_prefix, Create2Factory, DeployRecord, DerivationError};
use tracing::{info, warn};

use crate::error::PipelineError;
use crate::rpc::{ChainClient, TxReceipt};
use crate::salt::SaltSearch;

/// Result of [`ensure_deployed`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployOutcome {
    /// The factory deployed the code in this transaction
    Deployed(TxReceipt),
    /// Code was already present at the target address
    Skipped,
}

impl DeployOutcome {
    pub fn is_deployed(&self) -> bool {
        matches!(self, Self::Deployed(_))
    }
}

/// Search a vanity salt for `init_code` and derive its address.
///
/// The reported address is never trusted: it must match our own derivation
/// and carry the prefix.
pub async fn compute_target<S: SaltSearch + ?Sized>(
    search: &S,
    factory: &Create2Factory,
    init_code: &Bytes,
    prefix: &str,
) -> Result<DeployRecord, PipelineError> {
    let hit = search
        .search(factory.address, init_code, prefix)
        .await
        .map_err(|e| match e.downcast::<DerivationError>() {
            Ok(derivation) => PipelineError::Derivation(derivation),
            Err(other) => PipelineError::DerivationUnavailable(other),
        })?;

    let derived = factory.derive(hit.salt, init_code);
    if derived != hit.address {
        return Err(DerivationError::Inconsistent {
            reported: hit.address,
            derived,
        }
        .into());
    }
    if !matches_prefix(&derived, prefix) {
        return Err(DerivationError::PrefixMismatch {
            address: derived,
            prefix: prefix.to_string(),
        }
        .into());
    }

    Ok(DeployRecord {
        init_code: init_code.clone(),
        salt: hit.salt,
        address: derived,
    })
}

/// Deploy `record` through the factory unless code already lives at its address.
///
/// Safe to call any number of times: at most one deployment is ever sent.
pub async fn ensure_deployed<C: ChainClient + ?Sized>(
    chain: &C,
    factory: &Create2Factory,
    record: &DeployRecord,
) -> Result<DeployOutcome, PipelineError> {
    if has_code(chain, record.address).await? {
        info!(address = %record.address, "Code already deployed, skipping");
        return Ok(DeployOutcome::Skipped);
    }

    let calldata = factory.deploy_calldata(record.salt, &record.init_code);
    let tx = chain
        .send_transaction(factory.address, calldata)
        .await
        .map_err(|e| PipelineError::Submission {
            tx: None,
            reason: e.to_string(),
        })?;
    info!(address = %record.address, tx = %tx, factory = %factory.address, "Deployment sent");

    let receipt = chain.wait_for_receipt(tx).await.map_err(PipelineError::Rpc)?;
    if !receipt.success {
        warn!(tx = %tx, "Deployment transaction reverted");
    }

    if !has_code(chain, record.address).await? {
        return Err(PipelineError::DeploymentVerificationFailed {
            address: record.address,
            tx,
        });
    }

    info!(
        address = %record.address,
        block = receipt.block_number,
        "Deployment confirmed"
    );
    Ok(DeployOutcome::Deployed(receipt))
}

async fn has_code<C: ChainClient + ?Sized>(chain: &C, address: Address) -> Result<bool, PipelineError> {
    let code = chain.get_code(address).await.map_err(PipelineError::Rpc)?;
    Ok(!code.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::salt::SaltHit;
    use alloy_primitives::{bytes, B256};
    use async_trait::async_trait;

    struct FixedSalt(B256);

    #[async_trait]
    impl SaltSearch for FixedSalt {
        async fn search(
            &self,
            factory: Address,
            init_code: &Bytes,
            _prefix: &str,
        ) -> anyhow::Result<SaltHit> {
            Ok(SaltHit {
                salt: self.0,
                address: router_core::derive_address(factory, self.0, init_code),
            })
        }
    }

    struct LyingSalt;

    #[async_trait]
    impl SaltSearch for LyingSalt {
        async fn search(&self, _: Address, _: &Bytes, _: &str) -> anyhow::Result<SaltHit> {
            Ok(SaltHit {
                salt: B256::ZERO,
                address: Address::repeat_byte(0x00),
            })
        }
    }

    struct Offline;

    #[async_trait]
    impl SaltSearch for Offline {
        async fn search(&self, _: Address, _: &Bytes, _: &str) -> anyhow::Result<SaltHit> {
            anyhow::bail!("No such file or directory (os error 2)")
        }
    }

    #[tokio::test]
    async fn test_compute_target_is_deterministic() {
        let factory = Create2Factory::default();
        let code = bytes!("6080604052");
        let search = FixedSalt(B256::repeat_byte(0x42));

        let first = compute_target(&search, &factory, &code, "").await.unwrap();
        let second = compute_target(&search, &factory, &code, "").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.address, factory.derive(first.salt, &code));
    }

    #[tokio::test]
    async fn test_inconsistent_report_rejected() {
        let err = compute_target(&LyingSalt, &Create2Factory::default(), &bytes!("60"), "")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Derivation(DerivationError::Inconsistent { .. })
        ));
    }

    #[tokio::test]
    async fn test_prefix_enforced() {
        let search = FixedSalt(B256::repeat_byte(0x42));
        let factory = Create2Factory::default();
        let code = bytes!("6080604052");
        let address = factory.derive(B256::repeat_byte(0x42), &code);
        let impossible = if alloy_primitives::hex::encode(address.as_slice()).starts_with('f') { "0" } else { "f" };

        let err = compute_target(&search, &factory, &code, impossible).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Derivation(DerivationError::PrefixMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_unreachable_search() {
        let err = compute_target(&Offline, &Create2Factory::default(), &bytes!("60"), "000000")
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::DerivationUnavailable(_)));
        assert!(err.is_retryable());
    }
}
