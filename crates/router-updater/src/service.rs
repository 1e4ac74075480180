use std::fmt;
use std::sync::Arc;

use alloy_primitives::{Address, Bytes, B256};
use router_core::{
    bytecode_path, capitalize, diff, interface_path, logic_role, parse_hex_bytes, AddressBook,
    AddressBookStore, ConfigError, DeployRecord, DeployRecordStore, DeployRecords,
    DerivationError, DiffError, EditBatch, EditCounts, ModuleInterface, RouterState,
};
use tracing::{info, warn};

use crate::config::SyncConfig;
use crate::deployer::{compute_target, ensure_deployed, DeployOutcome};
use crate::error::PipelineError;
use crate::router::{submit_batch, RouterSnapshot};
use crate::rpc::ChainClient;
use crate::salt::SaltSearch;
use crate::verify::{verify_with_retry, ContractVerifier, VerifyOutcome, VerifyRequest};

/// Pipeline stages, as they appear in logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStage {
    LoadStores,
    ComputeTarget,
    EnsureDeployed,
    ReadCurrentTable,
    ComputeDiff,
    EncodeBatch,
    SubmitAtomic,
    PersistNewRoleAddress,
}

impl fmt::Display for SyncStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::LoadStores => "load-stores",
            Self::ComputeTarget => "compute-target",
            Self::EnsureDeployed => "ensure-deployed",
            Self::ReadCurrentTable => "read-current-table",
            Self::ComputeDiff => "compute-diff",
            Self::EncodeBatch => "encode-batch",
            Self::SubmitAtomic => "submit-atomic",
            Self::PersistNewRoleAddress => "persist-new-role-address",
        };
        f.write_str(name)
    }
}

/// Where a role's deploy record came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordSource {
    /// Stored record with the same init payload
    Reused,
    /// First record for the role
    New,
    /// Replaces a stored record with a different init payload
    Superseded,
}

/// One logic role resolved for synchronization
#[derive(Debug, Clone)]
pub struct RolePlan {
    pub logic: String,
    pub role: String,
    /// Address the book held before this run
    pub previous: Option<Address>,
    pub record: DeployRecord,
    pub source: RecordSource,
    pub edits: EditCounts,
}

/// The merged edit batch for a set of logic roles, before submission
#[derive(Debug, Clone)]
pub struct SyncPlan {
    pub router: Address,
    pub roles: Vec<RolePlan>,
    pub batch: EditBatch,
}

impl SyncPlan {
    /// `multicall` calldata that would be sent to the router
    pub fn calldata(&self) -> Bytes {
        self.batch.encode_multicall()
    }
}

/// Result of a completed `update_router` run
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub plan: SyncPlan,
    pub deployments: Vec<(String, DeployOutcome)>,
    /// Multicall transaction, `None` when the router was already in sync
    pub tx: Option<B256>,
}

/// A single role deployment through the factory
#[derive(Debug, Clone)]
pub struct DeployRequest {
    pub role: String,
    pub init_code: Bytes,
    /// ABI-encoded constructor arguments appended to `init_code`
    pub constructor_args: Option<Bytes>,
    /// Contract identifier for source verification
    pub contract: Option<String>,
}

impl DeployRequest {
    pub fn new(role: impl Into<String>, init_code: Bytes) -> Self {
        Self {
            role: role.into(),
            init_code,
            constructor_args: None,
            contract: None,
        }
    }

    /// Full init payload: creation code followed by constructor arguments
    pub fn payload(&self) -> Bytes {
        match &self.constructor_args {
            Some(args) => [&self.init_code[..], &args[..]].concat().into(),
            None => self.init_code.clone(),
        }
    }
}

/// Result of `deploy_role` / `redeploy_role`
#[derive(Debug, Clone)]
pub struct RoleReport {
    pub role: String,
    pub address: Address,
    /// Address the role pointed to before a supersede
    pub previous: Option<Address>,
    pub outcome: DeployOutcome,
    pub verification: Option<VerifyOutcome>,
}

/// Interface and init payload of a logic module, read from build artifacts
struct LogicArtifacts {
    logic: String,
    role: String,
    interface: ModuleInterface,
    init_code: Bytes,
}

/// Deployment and router synchronization pipeline
pub struct SyncService<C, S, St> {
    config: SyncConfig,
    chain: C,
    salts: S,
    store: St,
    verifier: Option<Arc<dyn ContractVerifier>>,
}

impl<C, S, St> SyncService<C, S, St>
where
    C: ChainClient,
    S: SaltSearch,
    St: AddressBookStore + DeployRecordStore,
{
    pub fn new(config: SyncConfig, chain: C, salts: S, store: St) -> Self {
        Self {
            config,
            chain,
            salts,
            store,
            verifier: None,
        }
    }

    pub fn with_verifier(mut self, verifier: impl ContractVerifier + 'static) -> Self {
        self.verifier = Some(Arc::new(verifier));
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn chain(&self) -> &C {
        &self.chain
    }

    pub fn store(&self) -> &St {
        &self.store
    }

    /// Deploy the current build of each logic module and route its
    /// functions to it in one atomic multicall.
    ///
    /// The batch is planned and dry-run before anything is deployed, so bad
    /// interfaces or a stale table fail without side effects. The address
    /// book is rewritten only once the router is known to route every role.
    pub async fn update_router(&self, logics: &[String]) -> Result<SyncReport, PipelineError> {
        let (mut book, mut records, artifacts) = self.load_logic_inputs(logics)?;
        let router = book.require(&self.config.router_key)?;

        let resolved = self.resolve_logic_records(&records, &artifacts).await?;
        let plan = self.build_plan(router, &book, artifacts, resolved).await?;

        let mut deployments = Vec::with_capacity(plan.roles.len());
        for role in &plan.roles {
            let outcome = self.deploy_record(&role.record).await?;
            match role.source {
                RecordSource::Reused => {}
                RecordSource::New => {
                    records.insert_new(&role.role, role.record.clone())?;
                    self.store.save_records(&self.config.env, &mut records)?;
                }
                RecordSource::Superseded => {
                    records.supersede(&role.role, role.record.clone())?;
                    self.store.save_records(&self.config.env, &mut records)?;
                }
            }
            if outcome.is_deployed() {
                let contract = format!("{}Logic", capitalize(&role.logic));
                self.maybe_verify(role.record.address, contract, None).await;
            }
            deployments.push((role.role.clone(), outcome));
        }

        let tx = if plan.batch.is_empty() {
            info!(router = %router, "Router already in sync, nothing to submit");
            None
        } else {
            info!(
                stage = %SyncStage::SubmitAtomic,
                router = %router,
                edits = plan.batch.len(),
                "Submitting edit batch"
            );
            let receipt = submit_batch(&self.chain, router, &plan.batch).await?;
            Some(receipt.tx_hash)
        };

        let moved: Vec<&RolePlan> = plan
            .roles
            .iter()
            .filter(|role| role.previous != Some(role.record.address))
            .collect();
        if !moved.is_empty() {
            info!(stage = %SyncStage::PersistNewRoleAddress, roles = moved.len(), "Recording new role addresses");
            for role in &moved {
                book.set(role.role.clone(), role.record.address);
            }
            self.store.save_addresses(&self.config.scope(), &mut book)?;
        }

        for role in &plan.roles {
            info!(
                role = %role.role,
                previous = ?role.previous,
                address = %role.record.address,
                removes = role.edits.removes,
                updates = role.edits.updates,
                adds = role.edits.adds,
                "Role synchronized"
            );
        }

        Ok(SyncReport {
            plan,
            deployments,
            tx,
        })
    }

    /// Everything `update_router` does up to submission, without deploying,
    /// submitting or persisting anything.
    pub async fn plan(&self, logics: &[String]) -> Result<SyncPlan, PipelineError> {
        let (book, records, artifacts) = self.load_logic_inputs(logics)?;
        let router = book.require(&self.config.router_key)?;
        let resolved = self.resolve_logic_records(&records, &artifacts).await?;
        self.build_plan(router, &book, artifacts, resolved).await
    }

    /// Deploy a role through the factory, reusing its stored record when the
    /// init payload is unchanged. A different payload for a recorded role is
    /// rejected; use [`Self::redeploy_role`] to replace it.
    pub async fn deploy_role(&self, request: &DeployRequest) -> Result<RoleReport, PipelineError> {
        let (mut book, mut records) = self.load_stores()?;
        let previous = book.get(&request.role)?;
        let payload = request.payload();

        let (record, source) = self
            .resolve_record(&records, &request.role, &payload, false)
            .await?;
        let outcome = self.deploy_record(&record).await?;

        if source != RecordSource::Reused {
            records.insert_new(&request.role, record.clone())?;
            self.store.save_records(&self.config.env, &mut records)?;
        }

        let verification = match (&request.contract, outcome.is_deployed()) {
            (Some(contract), true) => {
                self.maybe_verify(record.address, contract.clone(), request.constructor_args.clone())
                    .await
            }
            _ => None,
        };

        if previous != Some(record.address) {
            book.set(request.role.clone(), record.address);
            self.store.save_addresses(&self.config.scope(), &mut book)?;
        }

        info!(role = %request.role, address = %record.address, deployed = outcome.is_deployed(), "Role deployed");
        Ok(RoleReport {
            role: request.role.clone(),
            address: record.address,
            previous: None,
            outcome,
            verification,
        })
    }

    /// Explicitly supersede a role's record with a new init payload
    pub async fn redeploy_role(&self, request: &DeployRequest) -> Result<RoleReport, PipelineError> {
        let (mut book, mut records) = self.load_stores()?;
        book.get(&request.role)?;
        let payload = request.payload();

        let stored = records
            .get(&request.role)
            .ok_or_else(|| ConfigError::MissingRecord(request.role.clone()))?;
        if stored.init_code == payload {
            return Err(ConfigError::UnchangedInitCode(request.role.clone()).into());
        }

        let (record, _) = self
            .resolve_record(&records, &request.role, &payload, true)
            .await?;
        let outcome = self.deploy_record(&record).await?;

        let previous = records.supersede(&request.role, record.clone())?;
        self.store.save_records(&self.config.env, &mut records)?;

        let verification = match (&request.contract, outcome.is_deployed()) {
            (Some(contract), true) => {
                self.maybe_verify(record.address, contract.clone(), request.constructor_args.clone())
                    .await
            }
            _ => None,
        };

        book.set(request.role.clone(), record.address);
        self.store.save_addresses(&self.config.scope(), &mut book)?;

        info!(
            role = %request.role,
            previous = %previous.address,
            address = %record.address,
            "Role superseded"
        );
        Ok(RoleReport {
            role: request.role.clone(),
            address: record.address,
            previous: Some(previous.address),
            outcome,
            verification,
        })
    }

    fn load_stores(&self) -> Result<(AddressBook, DeployRecords), ConfigError> {
        let scope = self.config.scope();
        info!(stage = %SyncStage::LoadStores, env = %scope.env, network = %scope.network, "Loading stores");
        let book = self.store.load_addresses(&scope)?;
        let records = self.store.load_records(&self.config.env)?;
        Ok((book, records))
    }

    /// All file reads of a run, done before anything touches the network
    fn load_logic_inputs(
        &self,
        logics: &[String],
    ) -> Result<(AddressBook, DeployRecords, Vec<LogicArtifacts>), ConfigError> {
        let (book, records) = self.load_stores()?;
        let mut artifacts = Vec::with_capacity(logics.len());
        for logic in logics {
            let role = logic_role(logic);
            let interface = ModuleInterface::load(interface_path(&self.config.artifacts_dir, logic))?;

            let code_path = bytecode_path(&self.config.artifacts_dir, logic);
            let hex = std::fs::read_to_string(&code_path).map_err(|source| ConfigError::Io {
                path: code_path.clone(),
                source,
            })?;
            let init_code = parse_hex_bytes(&code_path.display().to_string(), &hex)?;

            // An empty book entry is a broken file, not a fresh role
            book.get(&role)?;

            artifacts.push(LogicArtifacts {
                logic: logic.clone(),
                role,
                interface,
                init_code,
            });
        }
        Ok((book, records, artifacts))
    }

    async fn resolve_logic_records(
        &self,
        records: &DeployRecords,
        artifacts: &[LogicArtifacts],
    ) -> Result<Vec<(DeployRecord, RecordSource)>, PipelineError> {
        let mut resolved = Vec::with_capacity(artifacts.len());
        for art in artifacts {
            resolved.push(
                self.resolve_record(records, &art.role, &art.init_code, true)
                    .await?,
            );
        }
        Ok(resolved)
    }

    /// Stored record when the payload matches, otherwise a fresh salt search
    async fn resolve_record(
        &self,
        records: &DeployRecords,
        role: &str,
        init_code: &Bytes,
        allow_supersede: bool,
    ) -> Result<(DeployRecord, RecordSource), PipelineError> {
        let source = match records.get(role) {
            Some(stored) if stored.init_code == *init_code => {
                info!(role, address = %stored.address, "Reusing deploy record");
                return Ok((stored.clone(), RecordSource::Reused));
            }
            Some(stored) if !allow_supersede => {
                return Err(ConfigError::RecordConflict {
                    role: role.to_string(),
                    stored: stored.address,
                }
                .into());
            }
            Some(_) => RecordSource::Superseded,
            None => RecordSource::New,
        };

        info!(stage = %SyncStage::ComputeTarget, role, prefix = %self.config.vanity_prefix, "Searching salt");
        let record = compute_target(
            &self.salts,
            &self.config.factory(),
            init_code,
            &self.config.vanity_prefix,
        )
        .await?;

        if let Some(owner) = records.role_of(record.address) {
            if owner != role {
                return Err(DerivationError::AddressCollision {
                    address: record.address,
                    role: owner.to_string(),
                }
                .into());
            }
        }

        info!(role, salt = %record.salt, address = %record.address, "Target computed");
        Ok((record, source))
    }

    async fn deploy_record(&self, record: &DeployRecord) -> Result<DeployOutcome, PipelineError> {
        info!(stage = %SyncStage::EnsureDeployed, address = %record.address, "Ensuring deployment");
        ensure_deployed(&self.chain, &self.config.factory(), record).await
    }

    async fn build_plan(
        &self,
        router: Address,
        book: &AddressBook,
        artifacts: Vec<LogicArtifacts>,
        resolved: Vec<(DeployRecord, RecordSource)>,
    ) -> Result<SyncPlan, PipelineError> {
        info!(stage = %SyncStage::ReadCurrentTable, router = %router, "Reading router table");
        let snapshot = RouterSnapshot::read(&self.chain, router).await?;

        let mut roles = Vec::with_capacity(artifacts.len());
        let mut batches = Vec::with_capacity(artifacts.len());
        for (art, (record, source)) in artifacts.into_iter().zip(resolved) {
            let previous = book.get(&art.role)?;
            if art.interface.is_empty() {
                return Err(DiffError::EmptyInterface.into());
            }

            let batch = if previous == Some(record.address) {
                info!(role = %art.role, address = %record.address, "Role already current");
                EditBatch::new()
            } else {
                let current = snapshot.table_of(&self.chain, previous).await?;
                if current.is_empty() && snapshot.routes_all(&art.interface, record.address) {
                    // An earlier batch landed but its address was never recorded
                    info!(
                        role = %art.role,
                        previous = ?previous,
                        address = %record.address,
                        "Router already routes role, address book is behind"
                    );
                    EditBatch::new()
                } else {
                    info!(
                        stage = %SyncStage::ComputeDiff,
                        role = %art.role,
                        routed = current.len(),
                        declared = art.interface.len(),
                        "Computing diff"
                    );
                    diff(&current, &art.interface, record.address)?
                }
            };

            roles.push(RolePlan {
                logic: art.logic,
                role: art.role,
                previous,
                record,
                source,
                edits: batch.counts(),
            });
            batches.push(batch);
        }

        let batch = EditBatch::merge(batches)?;
        info!(stage = %SyncStage::EncodeBatch, edits = batch.len(), "Checking batch against snapshot");
        RouterState::new(snapshot.entries).apply_batch(&batch)?;

        Ok(SyncPlan {
            router,
            roles,
            batch,
        })
    }

    async fn maybe_verify(
        &self,
        address: Address,
        contract: String,
        constructor_args: Option<Bytes>,
    ) -> Option<VerifyOutcome> {
        if !self.config.verify {
            return None;
        }
        let verifier = self.verifier.as_ref()?;
        let request = VerifyRequest {
            address,
            contract,
            constructor_args,
        };
        let outcome = verify_with_retry(&**verifier, &request, &self.config.verify_retry).await;
        if !outcome.is_success() {
            warn!(address = %address, "Continuing without source verification");
        }
        Some(outcome)
    }
}
