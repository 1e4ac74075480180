//! Address books and deploy records, with file and in-memory stores
//!
//! Both documents are read once at the start of a run and fully rewritten on
//! save. A missing file is an empty document; malformed JSON is an error.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use alloy_primitives::{Address, Bytes, B256};
use serde::{Deserialize, Serialize};

use crate::create2::keccak;
use crate::error::ConfigError;

/// `(environment, network)` pair an address book belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoreScope {
    pub env: String,
    pub network: String,
}

impl StoreScope {
    pub fn new(env: impl Into<String>, network: impl Into<String>) -> Self {
        Self {
            env: env.into(),
            network: network.into(),
        }
    }
}

/// What the address book knows about a role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleSlot {
    Missing,
    Empty,
    Deployed(Address),
}

/// Logical role name -> deployed address
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressBook {
    roles: BTreeMap<String, Option<Address>>,
    version: Option<B256>,
}

impl AddressBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, role: &str) -> RoleSlot {
        match self.roles.get(role) {
            None => RoleSlot::Missing,
            Some(None) => RoleSlot::Empty,
            Some(Some(address)) => RoleSlot::Deployed(*address),
        }
    }

    /// Address of a role that has been deployed, `None` when missing
    pub fn get(&self, role: &str) -> Result<Option<Address>, ConfigError> {
        match self.lookup(role) {
            RoleSlot::Missing => Ok(None),
            RoleSlot::Empty => Err(ConfigError::EmptyAddress(role.to_string())),
            RoleSlot::Deployed(address) => Ok(Some(address)),
        }
    }

    pub fn require(&self, role: &str) -> Result<Address, ConfigError> {
        self.get(role)?
            .ok_or_else(|| ConfigError::MissingRole(role.to_string()))
    }

    pub fn set(&mut self, role: impl Into<String>, address: Address) -> Option<Address> {
        self.roles.insert(role.into(), Some(address)).flatten()
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    pub fn roles(&self) -> impl Iterator<Item = (&str, Option<Address>)> {
        self.roles.iter().map(|(k, v)| (k.as_str(), *v))
    }

    fn from_json(path: &Path, content: &[u8]) -> Result<Self, ConfigError> {
        let raw: BTreeMap<String, String> =
            serde_json::from_slice(content).map_err(|source| ConfigError::Malformed {
                path: path.to_path_buf(),
                source,
            })?;
        let mut roles = BTreeMap::new();
        for (role, value) in raw {
            let address = if value.is_empty() {
                None
            } else {
                Some(value.parse::<Address>().map_err(|_| ConfigError::InvalidAddress {
                    role: role.clone(),
                    value: value.clone(),
                })?)
            };
            roles.insert(role, address);
        }
        Ok(Self {
            roles,
            version: Some(keccak(&[content])),
        })
    }

    fn to_json(&self) -> Result<String, serde_json::Error> {
        let raw: BTreeMap<&str, String> = self
            .roles
            .iter()
            .map(|(role, address)| {
                let value = address.map(|a| a.to_checksum(None)).unwrap_or_default();
                (role.as_str(), value)
            })
            .collect();
        serde_json::to_string_pretty(&raw)
    }
}

/// Init payload, salt and resulting CREATE2 address of one role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployRecord {
    pub init_code: Bytes,
    #[serde(with = "hex_salt")]
    pub salt: B256,
    pub address: Address,
}

/// Role name -> immutable deploy record, for one environment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeployRecords {
    records: BTreeMap<String, DeployRecord>,
    version: Option<B256>,
}

impl DeployRecords {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, role: &str) -> Option<&DeployRecord> {
        self.records.get(role)
    }

    /// Role already using `address`, if any
    pub fn role_of(&self, address: Address) -> Option<&str> {
        self.records
            .iter()
            .find(|(_, r)| r.address == address)
            .map(|(role, _)| role.as_str())
    }

    /// Store the first record of a role. Re-inserting an identical record is
    /// a no-op; a different one for the same role is a conflict.
    pub fn insert_new(&mut self, role: &str, record: DeployRecord) -> Result<(), ConfigError> {
        match self.records.get(role) {
            Some(existing) if *existing == record => Ok(()),
            Some(existing) => Err(ConfigError::RecordConflict {
                role: role.to_string(),
                stored: existing.address,
            }),
            None => {
                self.records.insert(role.to_string(), record);
                Ok(())
            }
        }
    }

    /// Explicitly replace a role's record, returning the previous one
    pub fn supersede(
        &mut self,
        role: &str,
        record: DeployRecord,
    ) -> Result<DeployRecord, ConfigError> {
        let existing = self
            .records
            .get_mut(role)
            .ok_or_else(|| ConfigError::MissingRecord(role.to_string()))?;
        if existing.init_code == record.init_code {
            return Err(ConfigError::UnchangedInitCode(role.to_string()));
        }
        Ok(std::mem::replace(existing, record))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn from_json(path: &Path, content: &[u8]) -> Result<Self, ConfigError> {
        let records = serde_json::from_slice(content).map_err(|source| ConfigError::Malformed {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            records,
            version: Some(keccak(&[content])),
        })
    }
}

/// Address book persistence
pub trait AddressBookStore: Send + Sync {
    fn load_addresses(&self, scope: &StoreScope) -> Result<AddressBook, ConfigError>;
    fn save_addresses(&self, scope: &StoreScope, book: &mut AddressBook)
        -> Result<(), ConfigError>;
}

/// Deploy record persistence, keyed by environment
pub trait DeployRecordStore: Send + Sync {
    fn load_records(&self, env: &str) -> Result<DeployRecords, ConfigError>;
    fn save_records(&self, env: &str, records: &mut DeployRecords) -> Result<(), ConfigError>;
}

/// JSON files on disk
///
/// ```text
/// data_dir/addresses-{env}-{network}.json
/// records_dir/{env}.json
/// ```
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    data_dir: PathBuf,
    records_dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(data_dir: impl Into<PathBuf>, records_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            records_dir: records_dir.into(),
        }
    }

    pub fn address_book_path(&self, scope: &StoreScope) -> PathBuf {
        self.data_dir
            .join(format!("addresses-{}-{}.json", scope.env, scope.network))
    }

    pub fn records_path(&self, env: &str) -> PathBuf {
        self.records_dir.join(format!("{env}.json"))
    }

    fn read(path: &Path) -> Result<Option<Vec<u8>>, ConfigError> {
        match std::fs::read(path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Replace `path` with `content` unless someone else changed it since `loaded`
    fn write(path: &Path, loaded: Option<B256>, content: &str) -> Result<B256, ConfigError> {
        let on_disk = Self::read(path)?.map(|bytes| keccak(&[bytes.as_slice()]));
        if on_disk != loaded {
            return Err(ConfigError::ConcurrentModification {
                path: path.to_path_buf(),
            });
        }

        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, content).map_err(io_err)?;
        std::fs::rename(&tmp, path).map_err(io_err)?;

        Ok(keccak(&[content.as_bytes()]))
    }
}

impl AddressBookStore for JsonFileStore {
    fn load_addresses(&self, scope: &StoreScope) -> Result<AddressBook, ConfigError> {
        let path = self.address_book_path(scope);
        match Self::read(&path)? {
            Some(content) => AddressBook::from_json(&path, &content),
            None => Ok(AddressBook::new()),
        }
    }

    fn save_addresses(
        &self,
        scope: &StoreScope,
        book: &mut AddressBook,
    ) -> Result<(), ConfigError> {
        let path = self.address_book_path(scope);
        let content = book.to_json().map_err(|source| ConfigError::Malformed {
            path: path.clone(),
            source,
        })?;
        book.version = Some(Self::write(&path, book.version, &content)?);
        Ok(())
    }
}

impl DeployRecordStore for JsonFileStore {
    fn load_records(&self, env: &str) -> Result<DeployRecords, ConfigError> {
        let path = self.records_path(env);
        match Self::read(&path)? {
            Some(content) => DeployRecords::from_json(&path, &content),
            None => Ok(DeployRecords::new()),
        }
    }

    fn save_records(&self, env: &str, records: &mut DeployRecords) -> Result<(), ConfigError> {
        let path = self.records_path(env);
        let content =
            serde_json::to_string_pretty(&records.records).map_err(|source| {
                ConfigError::Malformed {
                    path: path.clone(),
                    source,
                }
            })?;
        records.version = Some(Self::write(&path, records.version, &content)?);
        Ok(())
    }
}

/// In-process store, mostly for tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryStore {
    books: Mutex<HashMap<StoreScope, AddressBook>>,
    records: Mutex<HashMap<String, DeployRecords>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_book(self, scope: StoreScope, book: AddressBook) -> Self {
        self.books
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(scope, book);
        self
    }
}

impl AddressBookStore for MemoryStore {
    fn load_addresses(&self, scope: &StoreScope) -> Result<AddressBook, ConfigError> {
        let books = self.books.lock().unwrap_or_else(|e| e.into_inner());
        Ok(books.get(scope).cloned().unwrap_or_default())
    }

    fn save_addresses(
        &self,
        scope: &StoreScope,
        book: &mut AddressBook,
    ) -> Result<(), ConfigError> {
        let mut books = self.books.lock().unwrap_or_else(|e| e.into_inner());
        books.insert(scope.clone(), book.clone());
        Ok(())
    }
}

impl DeployRecordStore for MemoryStore {
    fn load_records(&self, env: &str) -> Result<DeployRecords, ConfigError> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        Ok(records.get(env).cloned().unwrap_or_default())
    }

    fn save_records(&self, env: &str, records: &mut DeployRecords) -> Result<(), ConfigError> {
        let mut stored = self.records.lock().unwrap_or_else(|e| e.into_inner());
        stored.insert(env.to_string(), records.clone());
        Ok(())
    }
}

/// Salts are written as full 32-byte hex but older files hold minimal hex
mod hex_salt {
    use alloy_primitives::B256;
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(salt: &B256, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("0x{}", hex::encode(salt)))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<B256, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let s = s.strip_prefix("0x").unwrap_or(&s);
        let padded = if s.len() % 2 == 1 { format!("0{s}") } else { s.to_string() };
        let bytes = hex::decode(&padded).map_err(serde::de::Error::custom)?;
        if bytes.len() > 32 {
            return Err(serde::de::Error::custom("salt longer than 32 bytes"));
        }
        let mut out = [0u8; 32];
        out[32 - bytes.len()..].copy_from_slice(&bytes);
        Ok(B256::from(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{address, bytes};

    fn record(init: Bytes, byte: u8) -> DeployRecord {
        DeployRecord {
            init_code: init,
            salt: B256::repeat_byte(byte),
            address: Address::repeat_byte(byte),
        }
    }

    #[test]
    fn test_missing_file_is_empty_book() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path(), dir.path().join("create2"));
        let book = store.load_addresses(&StoreScope::new("dev", "sepolia")).unwrap();
        assert!(book.is_empty());
        assert!(store.load_records("dev").unwrap().is_empty());
    }

    #[test]
    fn test_malformed_book_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path(), dir.path());
        let scope = StoreScope::new("dev", "sepolia");
        std::fs::write(store.address_book_path(&scope), "{ not json").unwrap();

        assert!(matches!(
            store.load_addresses(&scope),
            Err(ConfigError::Malformed { .. })
        ));
    }

    #[test]
    fn test_missing_and_empty_roles_are_distinct() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path(), dir.path());
        let scope = StoreScope::new("dev", "sepolia");
        std::fs::write(
            store.address_book_path(&scope),
            r#"{"routerProxy": "0x1111111111111111111111111111111111111111", "profileLogic": ""}"#,
        )
        .unwrap();

        let book = store.load_addresses(&scope).unwrap();
        assert_eq!(
            book.lookup("routerProxy"),
            RoleSlot::Deployed(Address::repeat_byte(0x11))
        );
        assert_eq!(book.lookup("profileLogic"), RoleSlot::Empty);
        assert_eq!(book.lookup("communityLogic"), RoleSlot::Missing);
        assert!(matches!(book.get("communityLogic"), Ok(None)));
        assert!(matches!(book.get("profileLogic"), Err(ConfigError::EmptyAddress(_))));
        assert!(matches!(book.require("communityLogic"), Err(ConfigError::MissingRole(_))));
    }

    #[test]
    fn test_invalid_address_rejected_at_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path(), dir.path());
        let scope = StoreScope::new("dev", "sepolia");
        std::fs::write(store.address_book_path(&scope), r#"{"routerProxy": "0x12"}"#).unwrap();

        assert!(matches!(
            store.load_addresses(&scope),
            Err(ConfigError::InvalidAddress { .. })
        ));
    }

    #[test]
    fn test_book_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path(), dir.path());
        let scope = StoreScope::new("beta", "base");

        let mut book = store.load_addresses(&scope).unwrap();
        book.set("routerProxy", address!("000000a1b2c3d4e5f60718293a4b5c6d7e8f9012"));
        store.save_addresses(&scope, &mut book).unwrap();
        book.set("communityLogic", Address::repeat_byte(0x22));
        store.save_addresses(&scope, &mut book).unwrap();

        let reloaded = store.load_addresses(&scope).unwrap();
        assert_eq!(reloaded.roles().count(), 2);
        assert_eq!(
            reloaded.require("communityLogic").unwrap(),
            Address::repeat_byte(0x22)
        );
    }

    #[test]
    fn test_concurrent_rewrite_detected() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path(), dir.path());
        let scope = StoreScope::new("dev", "sepolia");

        let mut first = store.load_addresses(&scope).unwrap();
        let mut second = store.load_addresses(&scope).unwrap();
        first.set("aLogic", Address::repeat_byte(0x01));
        second.set("bLogic", Address::repeat_byte(0x02));

        store.save_addresses(&scope, &mut first).unwrap();
        assert!(matches!(
            store.save_addresses(&scope, &mut second),
            Err(ConfigError::ConcurrentModification { .. })
        ));
    }

    #[test]
    fn test_record_insert_and_supersede() {
        let mut records = DeployRecords::new();
        let original = record(bytes!("6001"), 0x01);
        records.insert_new("fixedFeeCommunityCond", original.clone()).unwrap();
        records.insert_new("fixedFeeCommunityCond", original.clone()).unwrap();

        let changed = record(bytes!("6002"), 0x02);
        assert!(matches!(
            records.insert_new("fixedFeeCommunityCond", changed.clone()),
            Err(ConfigError::RecordConflict { .. })
        ));
        assert!(matches!(
            records.supersede("fixedFeeCommunityCond", original.clone()),
            Err(ConfigError::UnchangedInitCode(_))
        ));

        let previous = records.supersede("fixedFeeCommunityCond", changed.clone()).unwrap();
        assert_eq!(previous, original);
        assert_eq!(records.get("fixedFeeCommunityCond"), Some(&changed));
        assert_eq!(records.role_of(changed.address), Some("fixedFeeCommunityCond"));
    }

    #[test]
    fn test_records_accept_short_salts() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path(), dir.path());
        std::fs::write(
            store.records_path("dev"),
            r#"{"whitelistAddressCommunityCond": {
                "initCode": "0x6001",
                "salt": "0x1b3c",
                "address": "0x0000001111111111111111111111111111111111"
            }}"#,
        )
        .unwrap();

        let mut records = store.load_records("dev").unwrap();
        let rec = records.get("whitelistAddressCommunityCond").unwrap();
        assert_eq!(rec.salt.as_slice()[30..], [0x1b, 0x3c]);
        assert_eq!(rec.salt.as_slice()[..30], [0u8; 30]);

        store.save_records("dev", &mut records).unwrap();
        let saved = std::fs::read_to_string(store.records_path("dev")).unwrap();
        assert!(saved.contains("initCode"));
        assert!(saved.contains(&format!("0x{}1b3c", "0".repeat(60))));
    }

    #[test]
    fn test_memory_store_roundtrip() {
        let scope = StoreScope::new("dev", "local");
        let store = MemoryStore::new();
        let mut book = store.load_addresses(&scope).unwrap();
        book.set("routerProxy", Address::repeat_byte(0x33));
        store.save_addresses(&scope, &mut book).unwrap();
        assert_eq!(store.load_addresses(&scope).unwrap(), book);
    }
}
