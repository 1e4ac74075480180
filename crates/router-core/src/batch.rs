//! Router edits and their multicall encoding

use std::collections::BTreeMap;

use alloy_primitives::{Address, Bytes, Selector};
use alloy_sol_types::SolCall;
use serde::{Deserialize, Serialize};

use crate::abi::{IRouter, Router};
use crate::error::DiffError;

/// A single router table mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Edit {
    Remove {
        selector: Selector,
        signature: String,
    },
    Update {
        selector: Selector,
        signature: String,
        address: Address,
    },
    Add {
        selector: Selector,
        signature: String,
        address: Address,
    },
}

impl Edit {
    pub fn selector(&self) -> Selector {
        match self {
            Self::Remove { selector, .. }
            | Self::Update { selector, .. }
            | Self::Add { selector, .. } => *selector,
        }
    }

    pub fn signature(&self) -> &str {
        match self {
            Self::Remove { signature, .. }
            | Self::Update { signature, .. }
            | Self::Add { signature, .. } => signature,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Remove { .. } => "remove",
            Self::Update { .. } => "update",
            Self::Add { .. } => "add",
        }
    }

    /// `removeRouter` / `updateRouter` / `addRouter` calldata
    pub fn encode(&self) -> Bytes {
        match self {
            Self::Remove {
                selector,
                signature,
            } => IRouter::removeRouterCall {
                selector: *selector,
                functionSignature: signature.clone(),
            }
            .abi_encode(),
            Self::Update {
                selector,
                signature,
                address,
            } => IRouter::updateRouterCall {
                router: Router {
                    functionSignature: signature.clone(),
                    functionSelector: *selector,
                    routerAddress: *address,
                },
            }
            .abi_encode(),
            Self::Add {
                selector,
                signature,
                address,
            } => IRouter::addRouterCall {
                router: Router {
                    functionSignature: signature.clone(),
                    functionSelector: *selector,
                    routerAddress: *address,
                },
            }
            .abi_encode(),
        }
        .into()
    }
}

/// Counts of each edit kind in a batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EditCounts {
    pub removes: usize,
    pub updates: usize,
    pub adds: usize,
}

/// Ordered, selector-disjoint router edits applied as one unit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EditBatch {
    edits: Vec<Edit>,
}

impl EditBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, edit: Edit) {
        self.edits.push(edit);
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Edit> {
        self.edits.iter()
    }

    pub fn counts(&self) -> EditCounts {
        let mut counts = EditCounts::default();
        for edit in &self.edits {
            match edit {
                Edit::Remove { .. } => counts.removes += 1,
                Edit::Update { .. } => counts.updates += 1,
                Edit::Add { .. } => counts.adds += 1,
            }
        }
        counts
    }

    /// One sub-call per edit, in batch order
    pub fn encode_calls(&self) -> Vec<Bytes> {
        self.edits.iter().map(Edit::encode).collect()
    }

    /// The whole batch as a single `multicall(bytes[])`
    pub fn encode_multicall(&self) -> Bytes {
        multicall_calldata(self.encode_calls())
    }

    /// Concatenate per-role batches into one.
    ///
    /// A selector removed by one role and added by another is a function
    /// moving between modules and coalesces into a single `Update` at the
    /// position of the `Add`. Any other selector seen twice is a conflict.
    pub fn merge(batches: impl IntoIterator<Item = EditBatch>) -> Result<Self, DiffError> {
        let all: Vec<Edit> = batches.into_iter().flat_map(|b| b.edits).collect();

        let mut added: BTreeMap<Selector, &str> = BTreeMap::new();
        let mut removed: BTreeMap<Selector, &str> = BTreeMap::new();
        for edit in &all {
            match edit {
                Edit::Add { selector, signature, .. } => {
                    added.insert(*selector, signature);
                }
                Edit::Remove { selector, signature } => {
                    removed.insert(*selector, signature);
                }
                Edit::Update { .. } => {}
            }
        }

        let mut owner: BTreeMap<Selector, String> = BTreeMap::new();
        let mut edits = Vec::with_capacity(all.len());
        for edit in &all {
            let edit = match edit {
                Edit::Remove { selector, .. } if added.contains_key(selector) => continue,
                Edit::Add {
                    selector,
                    signature,
                    address,
                } => match removed.get(selector) {
                    Some(stored) if *stored != signature.as_str() => {
                        return Err(DiffError::SignatureMismatch {
                            selector: *selector,
                            expected: signature.clone(),
                            stored: Some(stored.to_string()),
                        });
                    }
                    Some(_) => Edit::Update {
                        selector: *selector,
                        signature: signature.clone(),
                        address: *address,
                    },
                    None => edit.clone(),
                },
                _ => edit.clone(),
            };
            if let Some(first) = owner.insert(edit.selector(), edit.signature().to_string()) {
                return Err(DiffError::DuplicateSelector {
                    selector: edit.selector(),
                    first,
                    second: edit.signature().to_string(),
                });
            }
            edits.push(edit);
        }

        Ok(Self { edits })
    }
}

impl From<Vec<Edit>> for EditBatch {
    fn from(edits: Vec<Edit>) -> Self {
        Self { edits }
    }
}

impl IntoIterator for EditBatch {
    type Item = Edit;
    type IntoIter = std::vec::IntoIter<Edit>;

    fn into_iter(self) -> Self::IntoIter {
        self.edits.into_iter()
    }
}

impl<'a> IntoIterator for &'a EditBatch {
    type Item = &'a Edit;
    type IntoIter = std::slice::Iter<'a, Edit>;

    fn into_iter(self) -> Self::IntoIter {
        self.edits.iter()
    }
}

/// Wrap opaque sub-calls into the router's atomic `multicall`
pub fn multicall_calldata(calls: Vec<Bytes>) -> Bytes {
    IRouter::multicallCall { data: calls }.abi_encode().into()
}
