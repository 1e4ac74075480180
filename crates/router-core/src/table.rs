//! Router table snapshots and an in-memory model of the router's mutation rules

use std::collections::BTreeMap;

use alloy_primitives::{Address, Selector};
use serde::{Deserialize, Serialize};

use crate::abi::Router;
use crate::batch::{Edit, EditBatch};
use crate::error::DiffError;

/// One row of the router table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterEntry {
    pub selector: Selector,
    pub signature: String,
    pub address: Address,
}

impl From<Router> for RouterEntry {
    fn from(router: Router) -> Self {
        Self {
            selector: router.functionSelector,
            signature: router.functionSignature,
            address: router.routerAddress,
        }
    }
}

impl From<&RouterEntry> for Router {
    fn from(entry: &RouterEntry) -> Self {
        Self {
            functionSignature: entry.signature.clone(),
            functionSelector: entry.selector,
            routerAddress: entry.address,
        }
    }
}

/// The part of the router table currently routed to one module instance
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouterTable {
    module: Option<Address>,
    entries: BTreeMap<Selector, RouterEntry>,
}

impl RouterTable {
    /// Table for a role that has never been routed
    pub fn empty() -> Self {
        Self::default()
    }

    /// Join the selectors the router reports for `module` with the full table.
    ///
    /// Signatures are looked up in `all`, never assumed: a selector routed to
    /// the module without a stored row is a [`DiffError::SignatureMismatch`],
    /// and a row owned by another module means the two reads disagree.
    pub fn for_module(
        module: Address,
        selectors: &[Selector],
        all: &[RouterEntry],
    ) -> Result<Self, DiffError> {
        let mut entries = BTreeMap::new();
        for selector in selectors {
            let stored = all.iter().find(|e| e.selector == *selector).ok_or_else(|| {
                DiffError::SignatureMismatch {
                    selector: *selector,
                    expected: format!("row routed to {module}"),
                    stored: None,
                }
            })?;
            if stored.address != module {
                return Err(DiffError::StaleRouterRow {
                    selector: *selector,
                    module,
                    routed: stored.address,
                });
            }
            entries.insert(*selector, stored.clone());
        }
        Ok(Self {
            module: Some(module),
            entries,
        })
    }

    /// Build directly from rows; every row must belong to the same module
    pub fn from_entries(module: Address, rows: impl IntoIterator<Item = RouterEntry>) -> Self {
        let entries = rows
            .into_iter()
            .filter(|e| e.address == module)
            .map(|e| (e.selector, e))
            .collect();
        Self {
            module: Some(module),
            entries,
        }
    }

    pub fn module(&self) -> Option<Address> {
        self.module
    }

    pub fn get(&self, selector: &Selector) -> Option<&RouterEntry> {
        self.entries.get(selector)
    }

    pub fn contains(&self, selector: &Selector) -> bool {
        self.entries.contains_key(selector)
    }

    pub fn selectors(&self) -> impl Iterator<Item = &Selector> {
        self.entries.keys()
    }

    /// Rows in selector order
    pub fn entries(&self) -> impl Iterator<Item = &RouterEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Why the router would reject an edit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyError {
    AlreadyRouted(Selector),
    NotRouted(Selector),
    SignatureMismatch(Selector),
}

impl std::fmt::Display for ApplyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyRouted(s) => write!(f, "selector {s} already routed"),
            Self::NotRouted(s) => write!(f, "selector {s} not routed"),
            Self::SignatureMismatch(s) => write!(f, "signature mismatch for selector {s}"),
        }
    }
}

impl std::error::Error for ApplyError {}

/// Full router table with the same add/update/remove rules as the contract.
///
/// Used to dry-run a batch against a snapshot before submitting it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouterState {
    rows: BTreeMap<Selector, RouterEntry>,
}

impl RouterState {
    pub fn new(rows: impl IntoIterator<Item = RouterEntry>) -> Self {
        Self {
            rows: rows.into_iter().map(|r| (r.selector, r)).collect(),
        }
    }

    pub fn get(&self, selector: &Selector) -> Option<&RouterEntry> {
        self.rows.get(selector)
    }

    pub fn rows(&self) -> impl Iterator<Item = &RouterEntry> {
        self.rows.values()
    }

    /// Selectors currently routed to `module`
    pub fn functions_of(&self, module: Address) -> Vec<Selector> {
        self.rows
            .values()
            .filter(|r| r.address == module)
            .map(|r| r.selector)
            .collect()
    }

    pub fn apply(&mut self, edit: &Edit) -> Result<(), ApplyError> {
        match edit {
            Edit::Add {
                selector,
                signature,
                address,
            } => {
                if self.rows.contains_key(selector) {
                    return Err(ApplyError::AlreadyRouted(*selector));
                }
                self.rows.insert(
                    *selector,
                    RouterEntry {
                        selector: *selector,
                        signature: signature.clone(),
                        address: *address,
                    },
                );
            }
            Edit::Update {
                selector,
                signature,
                address,
            } => {
                let row = self
                    .rows
                    .get_mut(selector)
                    .ok_or(ApplyError::NotRouted(*selector))?;
                if row.signature != *signature {
                    return Err(ApplyError::SignatureMismatch(*selector));
                }
                row.address = *address;
            }
            Edit::Remove {
                selector,
                signature,
            } => {
                let row = self
                    .rows
                    .get(selector)
                    .ok_or(ApplyError::NotRouted(*selector))?;
                if row.signature != *signature {
                    return Err(ApplyError::SignatureMismatch(*selector));
                }
                self.rows.remove(selector);
            }
        }
        Ok(())
    }

    /// All-or-nothing: on error `self` is left untouched
    pub fn apply_batch(&mut self, batch: &EditBatch) -> Result<(), ApplyError> {
        let mut next = self.clone();
        for edit in batch.iter() {
            next.apply(edit)?;
        }
        *self = next;
        Ok(())
    }
}
