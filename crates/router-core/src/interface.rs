//! Declared module interfaces: `signature -> selector` maps emitted by the build

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use alloy_primitives::Selector;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Functions a freshly compiled module declares.
///
/// Selectors are trusted input and are not recomputed here. Iteration is
/// ordered by signature so the derived edit batch is reproducible.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleInterface {
    functions: BTreeMap<String, Selector>,
}

impl ModuleInterface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, signature: impl Into<String>, selector: Selector) {
        self.functions.insert(signature.into(), selector);
    }

    pub fn with(mut self, signature: impl Into<String>, selector: Selector) -> Self {
        self.insert(signature, selector);
        self
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// `(signature, selector)` pairs in signature order
    pub fn iter(&self) -> impl Iterator<Item = (&str, Selector)> {
        self.functions.iter().map(|(sig, sel)| (sig.as_str(), *sel))
    }

    /// Load a `{ "f(uint256)": "0x12345678", ... }` file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Malformed {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl FromIterator<(String, Selector)> for ModuleInterface {
    fn from_iter<I: IntoIterator<Item = (String, Selector)>>(iter: I) -> Self {
        Self {
            functions: iter.into_iter().collect(),
        }
    }
}

/// `community` -> `Community`
pub fn capitalize(logic: &str) -> String {
    let mut chars = logic.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Address book key of a logic module: `community` -> `communityLogic`
pub fn logic_role(logic: &str) -> String {
    format!("{logic}Logic")
}

/// Where the build drops the interface of a logic module
///
/// ```text
/// artifacts/
///   fun-sig/ICommunityLogic.json
///   bytecode/CommunityLogic.hex
/// ```
pub fn interface_path(artifacts_dir: &Path, logic: &str) -> PathBuf {
    artifacts_dir
        .join("fun-sig")
        .join(format!("I{}Logic.json", capitalize(logic)))
}

/// Where the build drops the init code of a logic module
pub fn bytecode_path(artifacts_dir: &Path, logic: &str) -> PathBuf {
    artifacts_dir
        .join("bytecode")
        .join(format!("{}Logic.hex", capitalize(logic)))
}
