//! Reading the router table and submitting edit batches

use alloy_primitives::{Address, Selector};
use alloy_sol_types::{SolCall, SolValue};
use router_core::abi::{IRouter, Router};
use router_core::{EditBatch, ModuleInterface, RouterEntry, RouterTable};
use tracing::{error, info};

use crate::error::PipelineError;
use crate::rpc::{ChainClient, TxReceipt};

/// Live router table, read once per run
#[derive(Debug, Clone)]
pub struct RouterSnapshot {
    pub router: Address,
    pub entries: Vec<RouterEntry>,
}

impl RouterSnapshot {
    /// `getAllRouters()`
    pub async fn read<C: ChainClient + ?Sized>(chain: &C, router: Address) -> Result<Self, PipelineError> {
        let data = chain
            .call(router, IRouter::getAllRoutersCall {}.abi_encode().into())
            .await
            .map_err(|source| PipelineError::RouterUnreachable { router, source })?;
        let (rows,) = <(Vec<Router>,)>::abi_decode_params(&data).map_err(|e| {
            PipelineError::RouterUnreachable {
                router,
                source: e.into(),
            }
        })?;

        Ok(Self {
            router,
            entries: rows.into_iter().map(RouterEntry::from).collect(),
        })
    }

    /// Whether every declared function is already routed to `module` under
    /// its declared signature
    pub fn routes_all(&self, interface: &ModuleInterface, module: Address) -> bool {
        interface.iter().all(|(signature, selector)| {
            self.entries.iter().any(|e| {
                e.selector == selector && e.signature == signature && e.address == module
            })
        })
    }

    /// Rows currently routed to `module`, joined with their stored signatures.
    ///
    /// A role that was never deployed has nothing routed to it.
    pub async fn table_of<C: ChainClient + ?Sized>(
        &self,
        chain: &C,
        module: Option<Address>,
    ) -> Result<RouterTable, PipelineError> {
        let Some(module) = module else {
            return Ok(RouterTable::empty());
        };

        let router = self.router;
        let call = IRouter::getAllFunctionsOfRouterCall {
            routerAddress: module,
        };
        let data = chain
            .call(router, call.abi_encode().into())
            .await
            .map_err(|source| PipelineError::RouterUnreachable { router, source })?;
        let (selectors,) = <(Vec<Selector>,)>::abi_decode_params(&data).map_err(|e| {
            PipelineError::RouterUnreachable {
                router,
                source: e.into(),
            }
        })?;

        Ok(RouterTable::for_module(module, &selectors, &self.entries)?)
    }
}

/// Send the whole batch as one `multicall` and wait for it to be mined.
///
/// A reverted multicall leaves the router untouched.
pub async fn submit_batch<C: ChainClient + ?Sized>(
    chain: &C,
    router: Address,
    batch: &EditBatch,
) -> Result<TxReceipt, PipelineError> {
    let tx = chain
        .send_transaction(router, batch.encode_multicall())
        .await
        .map_err(|e| PipelineError::Submission {
            tx: None,
            reason: e.to_string(),
        })?;
    info!(router = %router, tx = %tx, edits = batch.len(), "Multicall sent");

    let receipt = chain.wait_for_receipt(tx).await.map_err(PipelineError::Rpc)?;
    if !receipt.success {
        error!(tx = %tx, block = receipt.block_number, "Multicall reverted");
        return Err(PipelineError::Submission {
            tx: Some(tx),
            reason: "multicall reverted".into(),
        });
    }

    info!(tx = %tx, block = receipt.block_number, "Multicall confirmed");
    Ok(receipt)
}
