//! CREATE2 address derivation and factory calldata
//!
//! `address = keccak256(0xff ++ factory ++ salt ++ keccak256(init_code))[12..]`

use alloy_primitives::{address, Address, Bytes, B256};
use alloy_sol_types::SolCall;
use tiny_keccak::{Hasher, Keccak};

use crate::abi::ICreate2Factory;

/// Canonical deterministic-deployment proxy. Takes raw `salt ++ init_code` calldata.
pub const CANONICAL_FACTORY: Address = address!("4e59b44847b379578588920cA78FbF26c0B4956C");

/// Factory used by default, exposing `deploy(bytes,bytes32)`.
pub const DEFAULT_FACTORY: Address = address!("ce0042b868300000d44a59004da54a005ffdcf9f");

/// Leading hex digits every derived address must carry by default.
pub const DEFAULT_VANITY_PREFIX: &str = "000000";

/// keccak256 over the concatenation of `parts`
pub(crate) fn keccak(parts: &[&[u8]]) -> B256 {
    let mut hasher = Keccak::v256();
    for part in parts {
        hasher.update(part);
    }
    let mut out = [0u8; 32];
    hasher.finalize(&mut out);
    B256::from(out)
}

/// keccak256 of the init payload
pub fn init_code_hash(init_code: &[u8]) -> B256 {
    keccak(&[init_code])
}

/// Derive the CREATE2 address for `init_code` deployed by `factory` with `salt`
pub fn derive_address(factory: Address, salt: B256, init_code: &[u8]) -> Address {
    let code_hash = init_code_hash(init_code);
    let digest = keccak(&[&[0xff], factory.as_slice(), salt.as_slice(), code_hash.as_slice()]);
    Address::from_slice(&digest[12..])
}

/// Whether `address` (lowercase hex, no `0x`) starts with `prefix`
pub fn matches_prefix(address: &Address, prefix: &str) -> bool {
    hex::encode(address.as_slice()).starts_with(&prefix.to_ascii_lowercase())
}

/// Calldata layout accepted by a CREATE2 factory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactoryVariant {
    /// `salt ++ init_code`
    Bare,
    /// `deploy(bytes initCode, bytes32 salt)`
    DeployCall,
}

/// A configured CREATE2 factory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Create2Factory {
    pub address: Address,
    pub variant: FactoryVariant,
}

impl Create2Factory {
    /// The calldata variant is chosen from the configured address alone.
    pub fn new(address: Address) -> Self {
        let variant = if address == CANONICAL_FACTORY {
            FactoryVariant::Bare
        } else {
            FactoryVariant::DeployCall
        };
        Self { address, variant }
    }

    pub fn derive(&self, salt: B256, init_code: &[u8]) -> Address {
        derive_address(self.address, salt, init_code)
    }

    /// Calldata for the factory's deploy entrypoint
    pub fn deploy_calldata(&self, salt: B256, init_code: &Bytes) -> Bytes {
        match self.variant {
            FactoryVariant::Bare => {
                let mut data = Vec::with_capacity(32 + init_code.len());
                data.extend_from_slice(salt.as_slice());
                data.extend_from_slice(init_code);
                data.into()
            }
            FactoryVariant::DeployCall => ICreate2Factory::deployCall {
                initCode: init_code.clone(),
                salt,
            }
            .abi_encode()
            .into(),
        }
    }
}

impl Default for Create2Factory {
    fn default() -> Self {
        Self::new(DEFAULT_FACTORY)
    }
}
