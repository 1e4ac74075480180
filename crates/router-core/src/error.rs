//! Error types for router-core

use std::path::PathBuf;

use alloy_primitives::{Address, Selector};
use thiserror::Error;

/// Address book, deploy-record and artifact problems.
///
/// Always raised before any chain interaction.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed JSON in {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Role not found in address book: {0}")]
    MissingRole(String),

    #[error("Role {0} is present in the address book but has an empty address")]
    EmptyAddress(String),

    #[error("Invalid address for role {role}: {value}")]
    InvalidAddress { role: String, value: String },

    #[error("Invalid hex in {what}: {reason}")]
    InvalidHex { what: String, reason: String },

    #[error("Deploy record for {role} already exists with a different init code (stored address {stored})")]
    RecordConflict { role: String, stored: Address },

    #[error("Deploy record for {0} already has this init code, nothing to supersede")]
    UnchangedInitCode(String),

    #[error("No deploy record for {0}")]
    MissingRecord(String),

    #[error("{path} changed on disk since it was loaded")]
    ConcurrentModification { path: PathBuf },
}

/// Salt search and address derivation failures, fatal for the role concerned.
#[derive(Error, Debug)]
pub enum DerivationError {
    #[error("Salt search returned {reported} but salt derives {derived}")]
    Inconsistent { reported: Address, derived: Address },

    #[error("Derived address {address} does not start with vanity prefix {prefix}")]
    PrefixMismatch { address: Address, prefix: String },

    #[error("Derived address {address} is already used by role {role}")]
    AddressCollision { address: Address, role: String },

    #[error("Unparseable salt search output: {0}")]
    Unparseable(String),
}

/// Stale or wrong module metadata fed into the router diff.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum DiffError {
    #[error("Declared interface is empty")]
    EmptyInterface,

    #[error("Signature mismatch for selector {selector}: router has {stored:?}, expected {expected}")]
    SignatureMismatch {
        selector: Selector,
        expected: String,
        stored: Option<String>,
    },

    #[error("Selector {selector} reported for {module} but the router table routes it to {routed}")]
    StaleRouterRow {
        selector: Selector,
        module: Address,
        routed: Address,
    },

    #[error("Selector {selector} claimed by both {first} and {second}")]
    DuplicateSelector {
        selector: Selector,
        first: String,
        second: String,
    },
}
