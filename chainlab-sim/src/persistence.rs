//! Versioned session records and the storage they live in.
//!
//! Loading never fails from the caller's point of view: an unreadable,
//! unversioned or inconsistent record is logged and replaced by a fresh
//! session.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::commands::CommandRegistry;
use crate::generator::Entropy;
use crate::ledger::{
    ChainState, ClientConfig, Commitment, ProgramAccount, TokenMint, TransactionRecord, Wallet,
};
use crate::path;
use crate::reducer::SimState;
use crate::session::Session;
use crate::vfs::{Vfs, VfsError};

/// Current record layout. Records carrying any other version are discarded.
pub const SESSION_VERSION: u32 = 1;

/// Errors from a storage backend.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Why a stored record was rejected.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("Malformed session record: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Session record has no version")]
    MissingVersion,

    #[error("Unsupported session version {found} (expected {expected})")]
    Version { found: u64, expected: u32 },

    #[error("Invalid workspace snapshot: {0}")]
    Vfs(#[from] VfsError),

    #[error("Inconsistent session record: {0}")]
    Inconsistent(String),
}

/// Where the serialized record is kept.
pub trait SessionStorage: Send + Sync {
    /// The stored record, if any.
    fn load(&self) -> Result<Option<String>, StorageError>;

    fn save(&self, record: &str) -> Result<(), StorageError>;

    fn clear(&self) -> Result<(), StorageError>;
}

/// Storage that lives as long as the process.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    slot: Mutex<Option<String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage pre-filled with `record`.
    pub fn with_record(record: impl Into<String>) -> Self {
        Self {
            slot: Mutex::new(Some(record.into())),
        }
    }
}

impl SessionStorage for MemoryStorage {
    fn load(&self) -> Result<Option<String>, StorageError> {
        let slot = self
            .slot
            .lock()
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        Ok(slot.clone())
    }

    fn save(&self, record: &str) -> Result<(), StorageError> {
        let mut slot = self
            .slot
            .lock()
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        *slot = Some(record.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        let mut slot = self
            .slot
            .lock()
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        *slot = None;
        Ok(())
    }
}

/// The persisted form of a [`Session`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub version: u32,
    pub seed: String,
    pub started_at: DateTime<Utc>,
    pub command_history: Vec<String>,
    pub cwd: String,
    pub env: BTreeMap<String, String>,
    /// RPC URL
    pub endpoint: String,
    pub websocket_url: String,
    pub commitment: Commitment,
    /// Keypair path → public key
    pub keypairs: BTreeMap<String, String>,
    pub active_keypair_path: String,
    #[serde(default)]
    pub default_wallet: Option<String>,
    pub known_addresses: Vec<String>,
    /// Address → lamports
    pub simulated_balances: BTreeMap<String, u64>,
    pub token_mints: BTreeMap<String, TokenMint>,
    #[serde(default)]
    pub programs: BTreeMap<String, ProgramAccount>,
    #[serde(default)]
    pub transactions: Vec<TransactionRecord>,
    /// Next generator counter value
    pub counter: u64,
    pub vfs: serde_json::Value,
}

impl SessionRecord {
    /// Capture everything needed to resume `session`.
    pub fn capture(session: &Session) -> Self {
        let chain = session.chain();
        let keypairs = chain
            .wallets
            .iter()
            .filter_map(|(address, wallet)| {
                wallet
                    .keypair_path
                    .as_ref()
                    .map(|path| (path.clone(), address.clone()))
            })
            .collect();

        Self {
            version: SESSION_VERSION,
            seed: session.seed().to_string(),
            started_at: session.started_at(),
            command_history: session.history(),
            cwd: session.cwd().to_string(),
            env: session.env().clone(),
            endpoint: chain.config.json_rpc_url.clone(),
            websocket_url: chain.config.websocket_url.clone(),
            commitment: chain.config.commitment,
            keypairs,
            active_keypair_path: chain.config.keypair_path.clone(),
            default_wallet: chain.default_wallet.clone(),
            known_addresses: chain.wallets.keys().cloned().collect(),
            simulated_balances: chain
                .wallets
                .iter()
                .map(|(address, wallet)| (address.clone(), wallet.balance))
                .collect(),
            token_mints: chain.token_mints.clone(),
            programs: chain.programs.clone(),
            transactions: chain.transactions.clone(),
            counter: session.counter(),
            vfs: session.vfs().snapshot(),
        }
    }

    /// Rebuild a session, checking the record's internal consistency.
    pub fn into_session(self, registry: Arc<CommandRegistry>) -> Result<Session, RecordError> {
        let vfs = Vfs::restore(self.vfs)?;

        let mut wallets: BTreeMap<String, Wallet> = BTreeMap::new();
        for address in &self.known_addresses {
            wallets.entry(address.clone()).or_default();
        }
        for (address, balance) in &self.simulated_balances {
            wallets.entry(address.clone()).or_default().balance = *balance;
        }
        for (keypair_path, address) in &self.keypairs {
            let wallet = wallets.entry(address.clone()).or_default();
            if wallet.keypair_path.is_some() {
                return Err(RecordError::Inconsistent(format!(
                    "address {} has more than one keypair",
                    address
                )));
            }
            wallet.keypair_path = Some(keypair_path.clone());
        }

        if let Some(default) = &self.default_wallet {
            if !wallets.contains_key(default) {
                return Err(RecordError::Inconsistent(format!(
                    "default wallet {} is unknown",
                    default
                )));
            }
        }
        for (mint, token) in &self.token_mints {
            if token.holder_total() != token.supply {
                return Err(RecordError::Inconsistent(format!(
                    "supply of {} does not match its holders",
                    mint
                )));
            }
        }

        let cwd = path::join(&path::normalize(&self.cwd));
        if !vfs.is_dir(&cwd) {
            return Err(RecordError::Inconsistent(format!("cwd {} is not a directory", self.cwd)));
        }

        let chain = ChainState {
            wallets,
            default_wallet: self.default_wallet,
            config: ClientConfig {
                json_rpc_url: self.endpoint,
                websocket_url: self.websocket_url,
                keypair_path: self.active_keypair_path,
                commitment: self.commitment,
            },
            programs: self.programs,
            transactions: self.transactions,
            token_mints: self.token_mints,
        };

        Ok(Session::from_parts(
            Entropy::new(self.seed, self.counter),
            self.started_at,
            self.command_history,
            SimState {
                chain,
                vfs,
                cwd,
                env: self.env,
            },
            registry,
        ))
    }
}

/// Serialize a session to its JSON record.
pub fn encode(session: &Session) -> Result<String, serde_json::Error> {
    serde_json::to_string(&SessionRecord::capture(session))
}

/// Parse and validate a stored record.
pub fn decode(raw: &str, registry: Arc<CommandRegistry>) -> Result<Session, RecordError> {
    let value: serde_json::Value = serde_json::from_str(raw)?;
    let found = value
        .get("version")
        .and_then(serde_json::Value::as_u64)
        .ok_or(RecordError::MissingVersion)?;
    if found != u64::from(SESSION_VERSION) {
        return Err(RecordError::Version {
            found,
            expected: SESSION_VERSION,
        });
    }

    let record: SessionRecord = serde_json::from_value(value)?;
    record.into_session(registry)
}

/// Load the stored session, or build a fresh one with `fresh` when nothing
/// usable is stored.
pub fn load_or_default<S, F>(storage: &S, registry: Arc<CommandRegistry>, fresh: F) -> Session
where
    S: SessionStorage + ?Sized,
    F: FnOnce(Arc<CommandRegistry>) -> Session,
{
    let raw = match storage.load() {
        Ok(Some(raw)) => raw,
        Ok(None) => {
            debug!("No stored session, starting fresh");
            return fresh(registry);
        }
        Err(e) => {
            warn!(error = %e, "Session storage unreadable, starting fresh");
            return fresh(registry);
        }
    };

    match decode(&raw, Arc::clone(&registry)) {
        Ok(session) => {
            debug!(seed = session.seed(), history = session.history().len(), "Restored session");
            session
        }
        Err(e) => {
            warn!(error = %e, "Discarding stored session, starting fresh");
            fresh(registry)
        }
    }
}

/// Persist `session` to `storage`.
pub fn save<S>(storage: &S, session: &Session) -> Result<(), StorageError>
where
    S: SessionStorage + ?Sized,
{
    let record = encode(session).map_err(|e| StorageError::Unavailable(e.to_string()))?;
    storage.save(&record)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Arc<CommandRegistry> {
        Arc::new(CommandRegistry::new())
    }

    fn fresh(registry: Arc<CommandRegistry>) -> Session {
        Session::new("fresh", Utc::now(), registry)
    }

    fn busy_session() -> Session {
        let mut session = Session::with_seed("persist");
        for line in [
            "keygen new",
            "airdrop 3",
            "keygen new --outfile ~/friend.json",
            "config set --url testnet --commitment finalized",
            "spl-token create-token --decimals 2",
            "mkdir -p notes",
            "echo hi > notes/a.txt",
            "cd notes",
            "export CLUSTER=testnet",
        ] {
            assert!(session.run(line).is_success(), "{}", line);
        }
        session
    }

    #[test]
    fn test_round_trip_restores_everything() {
        let session = busy_session();
        let storage = MemoryStorage::new();
        save(&storage, &session).unwrap();

        let restored = load_or_default(&storage, registry(), fresh);
        assert_eq!(restored.seed(), "persist");
        assert_eq!(restored.chain(), session.chain());
        assert_eq!(restored.vfs(), session.vfs());
        assert_eq!(restored.cwd(), "notes");
        assert_eq!(restored.env(), session.env());
        assert_eq!(restored.history(), session.history());
        assert_eq!(restored.counter(), session.counter());
    }

    #[test]
    fn test_restored_session_keeps_generating_new_values() {
        let mut session = busy_session();
        let storage = MemoryStorage::new();
        save(&storage, &session).unwrap();

        let mut restored = load_or_default(&storage, registry(), fresh);
        let line = "keygen new --outfile ~/c.json";
        assert_eq!(restored.run(line), session.run(line));
        let addresses: Vec<_> = restored.chain().wallets.keys().collect();
        assert_eq!(addresses.len(), 3);
    }

    #[test]
    fn test_corrupt_records_fall_back_silently() {
        let good = encode(&busy_session()).unwrap();
        let mut wrong_version: serde_json::Value = serde_json::from_str(&good).unwrap();
        wrong_version["version"] = 99.into();
        let mut no_version = wrong_version.clone();
        no_version.as_object_mut().unwrap().remove("version");
        let mut negative = serde_json::from_str::<serde_json::Value>(&good).unwrap();
        negative["simulatedBalances"] = serde_json::json!({ "abc": -5 });
        let mut bad_vfs = serde_json::from_str::<serde_json::Value>(&good).unwrap();
        bad_vfs["vfs"] = serde_json::json!({ "type": "file", "name": "x", "content": "" });

        for raw in [
            "not json".to_string(),
            "{}".to_string(),
            wrong_version.to_string(),
            no_version.to_string(),
            negative.to_string(),
            bad_vfs.to_string(),
            good.chars().take(good.len() / 2).collect::<String>(),
        ] {
            let storage = MemoryStorage::with_record(raw);
            let session = load_or_default(&storage, registry(), fresh);
            assert_eq!(session.seed(), "fresh");
            assert!(session.chain().wallets.is_empty());
            assert!(session.history().is_empty());
        }
    }

    #[test]
    fn test_inconsistent_supply_is_rejected() {
        let mut session = busy_session();
        let mint = session.chain().token_mints.keys().next().unwrap().clone();
        session.run(&format!("token mint {} 4", mint));

        let mut value: serde_json::Value = serde_json::from_str(&encode(&session).unwrap()).unwrap();
        value["tokenMints"][&mint]["supply"] = 1.into();
        assert!(matches!(
            decode(&value.to_string(), registry()),
            Err(RecordError::Inconsistent(_))
        ));
    }

    #[test]
    fn test_empty_storage_starts_fresh() {
        let storage = MemoryStorage::new();
        let session = load_or_default(&storage, registry(), fresh);
        assert_eq!(session.seed(), "fresh");
        storage.save("x").unwrap();
        storage.clear().unwrap();
        assert_eq!(storage.load().unwrap(), None);
    }

    #[test]
    fn test_record_uses_camel_case_fields() {
        let value: serde_json::Value = serde_json::from_str(&encode(&busy_session()).unwrap()).unwrap();
        for key in [
            "version",
            "seed",
            "startedAt",
            "commandHistory",
            "cwd",
            "env",
            "endpoint",
            "keypairs",
            "activeKeypairPath",
            "knownAddresses",
            "simulatedBalances",
            "tokenMints",
        ] {
            assert!(value.get(key).is_some(), "missing {}", key);
        }
        assert_eq!(value["endpoint"], "https://api.testnet.solana.com");
    }
}
