use std::time::Duration;

use alloy_primitives::{Address, Bytes, B256, U64};
use alloy_rpc_client::{ClientBuilder, RpcClient};
use alloy_rpc_types::{BlockNumberOrTag, TransactionInput, TransactionRequest};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::sync::OnceCell;
use tokio::time::Instant;
use tracing::debug;

/// Outcome of a mined transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx_hash: B256,
    pub block_number: u64,
    pub success: bool,
}

/// Receipt as returned by eth_getTransactionReceipt (only the fields we use)
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawReceipt {
    #[serde(rename = "transactionHash")]
    transaction_hash: B256,
    #[serde(rename = "blockNumber")]
    block_number: Option<U64>,
    #[serde(default)]
    status: Option<U64>,
}

/// The chain operations the pipeline depends on
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Runtime code at `address`, empty when nothing is deployed
    async fn get_code(&self, address: Address) -> anyhow::Result<Bytes>;

    /// Read-only call against the latest block
    async fn call(&self, to: Address, data: Bytes) -> anyhow::Result<Bytes>;

    /// Submit a transaction, returning its hash without waiting
    async fn send_transaction(&self, to: Address, data: Bytes) -> anyhow::Result<B256>;

    /// Block until `tx` is mined
    async fn wait_for_receipt(&self, tx: B256) -> anyhow::Result<TxReceipt>;
}

/// JSON-RPC client sending from a node-managed account.
///
/// Connecting makes no request; the chain id is checked and the sender
/// resolved right before the first transaction.
pub struct RpcChainClient {
    client: RpcClient,
    chain_id: u64,
    configured_sender: Option<Address>,
    sender: OnceCell<Address>,
    gas_limit: u64,
    poll_interval: Duration,
    confirmation_timeout: Duration,
}

impl RpcChainClient {
    pub async fn new(rpc_url: &str, chain_id: u64, gas_limit: u64) -> anyhow::Result<Self> {
        let client = ClientBuilder::default().connect(rpc_url).await?;
        Ok(Self {
            client,
            chain_id,
            configured_sender: None,
            sender: OnceCell::new(),
            gas_limit,
            poll_interval: Duration::from_secs(1),
            confirmation_timeout: Duration::from_secs(300),
        })
    }

    /// Send from `sender` instead of the node's first account
    pub fn with_sender(mut self, sender: Option<Address>) -> Self {
        self.configured_sender = sender;
        self
    }

    pub fn with_confirmation(mut self, poll_interval: Duration, timeout: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.confirmation_timeout = timeout;
        self
    }

    async fn rpc_call<Params, Resp>(&self, method: &str, params: Params) -> anyhow::Result<Resp>
    where
        Params: Serialize + Clone + std::fmt::Debug + Send + Sync + Unpin + 'static,
        Resp: DeserializeOwned + std::fmt::Debug + Send + Sync + Unpin + 'static,
    {
        Ok(self.client.request(method.to_string(), params).await?)
    }

    async fn sender(&self) -> anyhow::Result<Address> {
        let sender = self
            .sender
            .get_or_try_init(|| async {
                let id: U64 = self.client.request_noparams("eth_chainId").await?;
                if id.to::<u64>() != self.chain_id {
                    anyhow::bail!("node reports chain id {id}, expected {}", self.chain_id);
                }
                if let Some(sender) = self.configured_sender {
                    return Ok(sender);
                }
                let accounts: Vec<Address> = self.client.request_noparams("eth_accounts").await?;
                let first = accounts
                    .first()
                    .copied()
                    .ok_or_else(|| anyhow::anyhow!("node manages no accounts"))?;
                Ok::<_, anyhow::Error>(first)
            })
            .await?;
        Ok(*sender)
    }
}

fn tx_request(to: Address, data: Bytes) -> TransactionRequest {
    TransactionRequest::default()
        .to(to)
        .input(TransactionInput::new(data))
}

#[async_trait]
impl ChainClient for RpcChainClient {
    async fn get_code(&self, address: Address) -> anyhow::Result<Bytes> {
        self.rpc_call("eth_getCode", (address, BlockNumberOrTag::Latest))
            .await
    }

    async fn call(&self, to: Address, data: Bytes) -> anyhow::Result<Bytes> {
        self.rpc_call("eth_call", (tx_request(to, data), BlockNumberOrTag::Latest))
            .await
    }

    async fn send_transaction(&self, to: Address, data: Bytes) -> anyhow::Result<B256> {
        let request = tx_request(to, data)
            .from(self.sender().await?)
            .gas_limit(self.gas_limit);
        self.rpc_call("eth_sendTransaction", (request,)).await
    }

    async fn wait_for_receipt(&self, tx: B256) -> anyhow::Result<TxReceipt> {
        let deadline = Instant::now() + self.confirmation_timeout;
        loop {
            let receipt: Option<RawReceipt> =
                self.rpc_call("eth_getTransactionReceipt", (tx,)).await?;

            if let Some(receipt) = receipt {
                if let Some(block) = receipt.block_number {
                    return Ok(TxReceipt {
                        tx_hash: receipt.transaction_hash,
                        block_number: block.to::<u64>(),
                        success: receipt.status.map(|s| s == U64::from(1)).unwrap_or(true),
                    });
                }
            }

            if Instant::now() >= deadline {
                anyhow::bail!(
                    "tx {tx} not mined after {}s",
                    self.confirmation_timeout.as_secs()
                );
            }
            debug!(tx = %tx, "Waiting for receipt");
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
