//! In-process chain with a CREATE2 factory and a router, for driving the
//! full pipeline without a node.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use alloy_primitives::{keccak256, Address, Bytes, Selector, B256};
use alloy_sol_types::{SolCall, SolValue};
use async_trait::async_trait;
use router_core::abi::{ICreate2Factory, IRouter, Router};
use router_core::{
    matches_prefix, Create2Factory, Edit, EditBatch, FactoryVariant, JsonFileStore, RouterEntry,
    RouterState,
};
use router_updater::{ChainClient, SaltHit, SaltSearch, SyncConfig, TxReceipt};
use serde_json::json;
use tempfile::TempDir;

pub const ROUTER: Address = Address::new([0x0e; 20]);

#[derive(Default)]
struct ChainState {
    code: HashMap<Address, Bytes>,
    router: RouterState,
    receipts: HashMap<B256, TxReceipt>,
    block: u64,
    revert_next_multicall: bool,
    swallow_deployments: bool,
}

/// Simulated chain: factory deployments, an atomic router and call counters
pub struct SimulatedChain {
    factory: Create2Factory,
    state: Mutex<ChainState>,
    requests: AtomicUsize,
    deploy_txs: AtomicUsize,
    router_txs: AtomicUsize,
}

impl SimulatedChain {
    pub fn new(factory: Create2Factory, rows: Vec<RouterEntry>) -> Self {
        let mut state = ChainState {
            router: RouterState::new(rows),
            ..Default::default()
        };
        state.code.insert(ROUTER, Bytes::from_static(&[0x60, 0x80]));
        state.code.insert(factory.address, Bytes::from_static(&[0x60, 0x80]));
        Self {
            factory,
            state: Mutex::new(state),
            requests: AtomicUsize::new(0),
            deploy_txs: AtomicUsize::new(0),
            router_txs: AtomicUsize::new(0),
        }
    }

    /// Put code at `address` as if it had been deployed earlier
    pub fn with_code(self, address: Address) -> Self {
        self.state
            .lock()
            .unwrap()
            .code
            .insert(address, Bytes::from_static(&[0xfe]));
        self
    }

    /// Make the next router multicall revert
    pub fn revert_next_multicall(&self) {
        self.state.lock().unwrap().revert_next_multicall = true;
    }

    /// Factory transactions get mined but create nothing
    pub fn swallow_deployments(&self) {
        self.state.lock().unwrap().swallow_deployments = true;
    }

    pub fn router_rows(&self) -> Vec<RouterEntry> {
        self.state.lock().unwrap().router.rows().cloned().collect()
    }

    pub fn routed_to(&self, selector: Selector) -> Option<Address> {
        self.state
            .lock()
            .unwrap()
            .router
            .get(&selector)
            .map(|e| e.address)
    }

    pub fn has_code(&self, address: Address) -> bool {
        self.state.lock().unwrap().code.contains_key(&address)
    }

    /// Every ChainClient call made so far
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn deploy_txs(&self) -> usize {
        self.deploy_txs.load(Ordering::SeqCst)
    }

    pub fn router_txs(&self) -> usize {
        self.router_txs.load(Ordering::SeqCst)
    }

    fn deploy(&self, state: &mut ChainState, data: &[u8]) -> bool {
        let (salt, init_code): (B256, Bytes) = match self.factory.variant {
            FactoryVariant::Bare => {
                if data.len() < 32 {
                    return false;
                }
                (B256::from_slice(&data[..32]), Bytes::copy_from_slice(&data[32..]))
            }
            FactoryVariant::DeployCall => match ICreate2Factory::deployCall::abi_decode(data) {
                Ok(call) => (call.salt, call.initCode),
                Err(_) => return false,
            },
        };
        let address = self.factory.derive(salt, &init_code);
        if state.code.contains_key(&address) {
            return false;
        }
        if !state.swallow_deployments {
            state.code.insert(address, init_code);
        }
        true
    }

    fn multicall(state: &mut ChainState, data: &[u8]) -> bool {
        if std::mem::take(&mut state.revert_next_multicall) {
            return false;
        }
        let Ok(call) = IRouter::multicallCall::abi_decode(data) else {
            return false;
        };
        let mut edits = Vec::with_capacity(call.data.len());
        for sub in &call.data {
            match decode_edit(sub) {
                Some(edit) => edits.push(edit),
                None => return false,
            }
        }
        state.router.apply_batch(&EditBatch::from(edits)).is_ok()
    }
}

fn decode_edit(data: &[u8]) -> Option<Edit> {
    if data.starts_with(&IRouter::addRouterCall::SELECTOR) {
        let r = IRouter::addRouterCall::abi_decode(data).ok()?.router;
        Some(Edit::Add {
            selector: r.functionSelector,
            signature: r.functionSignature,
            address: r.routerAddress,
        })
    } else if data.starts_with(&IRouter::updateRouterCall::SELECTOR) {
        let r = IRouter::updateRouterCall::abi_decode(data).ok()?.router;
        Some(Edit::Update {
            selector: r.functionSelector,
            signature: r.functionSignature,
            address: r.routerAddress,
        })
    } else if data.starts_with(&IRouter::removeRouterCall::SELECTOR) {
        let call = IRouter::removeRouterCall::abi_decode(data).ok()?;
        Some(Edit::Remove {
            selector: call.selector,
            signature: call.functionSignature,
        })
    } else {
        None
    }
}

#[async_trait]
impl ChainClient for SimulatedChain {
    async fn get_code(&self, address: Address) -> anyhow::Result<Bytes> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().unwrap();
        Ok(state.code.get(&address).cloned().unwrap_or_default())
    }

    async fn call(&self, to: Address, data: Bytes) -> anyhow::Result<Bytes> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if to != ROUTER {
            anyhow::bail!("execution reverted: no contract at {to}");
        }
        let state = self.state.lock().unwrap();
        let rows: Vec<Router> = state.router.rows().map(Router::from).collect();

        if data.starts_with(&IRouter::getAllRoutersCall::SELECTOR) {
            return Ok((rows,).abi_encode_params().into());
        }
        if data.starts_with(&IRouter::getAllFunctionsOfRouterCall::SELECTOR) {
            let module = IRouter::getAllFunctionsOfRouterCall::abi_decode(&data)?.routerAddress;
            return Ok((state.router.functions_of(module),).abi_encode_params().into());
        }
        anyhow::bail!("execution reverted: unknown selector")
    }

    async fn send_transaction(&self, to: Address, data: Bytes) -> anyhow::Result<B256> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();

        let success = if to == self.factory.address {
            self.deploy_txs.fetch_add(1, Ordering::SeqCst);
            self.deploy(&mut state, &data)
        } else if to == ROUTER {
            self.router_txs.fetch_add(1, Ordering::SeqCst);
            Self::multicall(&mut state, &data)
        } else {
            anyhow::bail!("unexpected transaction to {to}");
        };

        state.block += 1;
        let tx_hash = keccak256(state.block.to_be_bytes());
        let receipt = TxReceipt {
            tx_hash,
            block_number: state.block,
            success,
        };
        state.receipts.insert(tx_hash, receipt);
        Ok(tx_hash)
    }

    async fn wait_for_receipt(&self, tx: B256) -> anyhow::Result<TxReceipt> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().unwrap();
        state
            .receipts
            .get(&tx)
            .copied()
            .ok_or_else(|| anyhow::anyhow!("unknown tx {tx}"))
    }
}

/// Brute-force salt search, deterministic for a given input
#[derive(Default)]
pub struct GrindingSalt {
    searches: AtomicUsize,
}

impl GrindingSalt {
    pub fn searches(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SaltSearch for GrindingSalt {
    async fn search(
        &self,
        factory: Address,
        init_code: &Bytes,
        prefix: &str,
    ) -> anyhow::Result<SaltHit> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        let factory = Create2Factory::new(factory);
        for n in 0u64..1_000_000 {
            let salt = B256::left_padding_from(&n.to_be_bytes());
            let address = factory.derive(salt, init_code);
            if matches_prefix(&address, prefix) {
                return Ok(SaltHit { salt, address });
            }
        }
        anyhow::bail!("no salt found for prefix {prefix}")
    }
}

/// A router row
pub fn row(selector: Selector, signature: &str, address: Address) -> RouterEntry {
    RouterEntry {
        selector,
        signature: signature.into(),
        address,
    }
}

/// Temporary workspace with build artifacts and stores
pub struct Fixture {
    pub dir: TempDir,
    pub config: SyncConfig,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = SyncConfig {
            env: "dev".into(),
            network: "local".into(),
            data_dir: dir.path().to_path_buf(),
            records_dir: dir.path().join("create2"),
            artifacts_dir: dir.path().join("target"),
            vanity_prefix: "00".into(),
            ..Default::default()
        };
        Self { dir, config }
    }

    pub fn store(&self) -> JsonFileStore {
        JsonFileStore::new(&self.config.data_dir, &self.config.records_dir)
    }

    pub fn book_path(&self) -> std::path::PathBuf {
        self.store().address_book_path(&self.config.scope())
    }

    pub fn write_book(&self, json: &str) {
        std::fs::write(self.book_path(), json).unwrap();
    }

    /// Address book holding the router and the given logic roles
    pub fn write_roles(&self, roles: &[(&str, Address)]) {
        let mut book = serde_json::Map::new();
        book.insert("routerProxy".into(), json!(ROUTER.to_string()));
        for (role, address) in roles {
            book.insert(role.to_string(), json!(address.to_string()));
        }
        self.write_book(&serde_json::to_string(&book).unwrap());
    }

    /// Write `fun-sig/I{Logic}Logic.json` and `bytecode/{Logic}Logic.hex`
    pub fn write_logic(&self, logic: &str, functions: &[(&str, Selector)], code: &str) {
        let artifacts = &self.config.artifacts_dir;
        write_file(
            &router_core::interface_path(artifacts, logic),
            &interface_json(functions),
        );
        write_file(&router_core::bytecode_path(artifacts, logic), code);
    }
}

fn interface_json(functions: &[(&str, Selector)]) -> String {
    let map: serde_json::Map<String, serde_json::Value> = functions
        .iter()
        .map(|(signature, selector)| (signature.to_string(), json!(selector.to_string())))
        .collect();
    serde_json::to_string(&map).unwrap()
}

fn write_file(path: &Path, content: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}
