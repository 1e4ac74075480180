//! Three-way selector diff between a router table and a declared interface

use std::collections::{BTreeMap, BTreeSet};

use alloy_primitives::{Address, Selector};

use crate::batch::{Edit, EditBatch};
use crate::error::DiffError;
use crate::interface::ModuleInterface;
use crate::table::RouterTable;

/// Compute the edits that route every function of `declared` to `new_address`.
///
/// `current` holds the rows routed to the module instance being replaced.
/// Declared selectors already in `current` become `Update`, the others `Add`
/// (both in signature order); selectors left over become `Remove` with the
/// signature the router stored, in selector order.
pub fn diff(
    current: &RouterTable,
    declared: &ModuleInterface,
    new_address: Address,
) -> Result<EditBatch, DiffError> {
    if declared.is_empty() {
        return Err(DiffError::EmptyInterface);
    }

    let mut seen: BTreeMap<Selector, &str> = BTreeMap::new();
    let mut leftover: BTreeSet<Selector> = current.selectors().copied().collect();
    let mut batch = EditBatch::new();

    for (signature, selector) in declared.iter() {
        if let Some(first) = seen.insert(selector, signature) {
            return Err(DiffError::DuplicateSelector {
                selector,
                first: first.to_string(),
                second: signature.to_string(),
            });
        }

        match current.get(&selector) {
            Some(stored) => {
                if stored.signature != signature {
                    return Err(DiffError::SignatureMismatch {
                        selector,
                        expected: signature.to_string(),
                        stored: Some(stored.signature.clone()),
                    });
                }
                leftover.remove(&selector);
                batch.push(Edit::Update {
                    selector,
                    signature: signature.to_string(),
                    address: new_address,
                });
            }
            None => batch.push(Edit::Add {
                selector,
                signature: signature.to_string(),
                address: new_address,
            }),
        }
    }

    for stored in current.entries().filter(|e| leftover.contains(&e.selector)) {
        batch.push(Edit::Remove {
            selector: stored.selector,
            signature: stored.signature.clone(),
        });
    }

    Ok(batch)
}
