//! router-core: pure logic for keeping a function router in sync with its modules
//!
//! A modular application dispatches every call through one router that maps
//! function selectors to the logic module implementing them. This crate holds
//! the parts of the deployment pipeline that never touch the network:
//!
//! - CREATE2 address derivation and factory calldata ([`Create2Factory`])
//! - Declared module interfaces ([`ModuleInterface`])
//! - Router table snapshots and a model of the router's mutation rules
//! - The selector diff producing [`EditBatch`]es, and their multicall encoding
//! - Address books and deploy records behind injectable stores
//!
//! ## Flow
//!
//! ```text
//! init code --(salt search)--> DeployRecord --(deploy)--> module address
//!                                                          |
//! router table (old module) + ModuleInterface ---------> diff -> EditBatch -> multicall
//! ```

pub mod abi;
mod batch;
mod create2;
mod diff;
mod error;
mod interface;
mod store;
mod table;

pub use batch::{multicall_calldata, Edit, EditBatch, EditCounts};
pub use create2::{
    derive_address, init_code_hash, matches_prefix, Create2Factory, FactoryVariant,
    CANONICAL_FACTORY, DEFAULT_FACTORY, DEFAULT_VANITY_PREFIX,
};
pub use diff::diff;
pub use error::{ConfigError, DerivationError, DiffError};
pub use interface::{bytecode_path, capitalize, interface_path, logic_role, ModuleInterface};
pub use store::{
    AddressBook, AddressBookStore, DeployRecord, DeployRecordStore, DeployRecords, JsonFileStore,
    MemoryStore, RoleSlot, StoreScope,
};
pub use table::{ApplyError, RouterEntry, RouterState, RouterTable};

/// Address book key under which the router proxy is stored by default
pub const ROUTER_ROLE: &str = "routerProxy";

/// Decode a hex artifact (`0x`-prefixed or not, surrounding whitespace ignored)
pub fn parse_hex_bytes(what: &str, s: &str) -> Result<alloy_primitives::Bytes, ConfigError> {
    let s = s.trim();
    let s = s.strip_prefix("0x").unwrap_or(s);
    hex::decode(s)
        .map(Into::into)
        .map_err(|e| ConfigError::InvalidHex {
            what: what.to_string(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_bytes() {
        assert_eq!(parse_hex_bytes("code", " 0x6001\n").unwrap()[..], [0x60, 0x01]);
        assert_eq!(parse_hex_bytes("code", "6001").unwrap().len(), 2);
        assert!(matches!(
            parse_hex_bytes("code", "0x6g"),
            Err(ConfigError::InvalidHex { .. })
        ));
    }
}
