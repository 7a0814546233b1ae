//! Simulated ledger state.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::scaffold::DEFAULT_KEYPAIR_PATH;

/// Loader that owns every deployed program account.
pub const UPGRADEABLE_LOADER_ID: &str = "BPFLoaderUpgradeab1e11111111111111111111111";

/// Confirmation depth carried in client configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Commitment {
    Processed,
    #[default]
    Confirmed,
    Finalized,
}

impl Commitment {
    /// Status word `confirm` prints for a known signature.
    pub fn status_label(self) -> &'static str {
        match self {
            Commitment::Processed => "Processed",
            Commitment::Confirmed => "Confirmed",
            Commitment::Finalized => "Finalized",
        }
    }
}

impl fmt::Display for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Commitment::Processed => "processed",
            Commitment::Confirmed => "confirmed",
            Commitment::Finalized => "finalized",
        };
        f.write_str(s)
    }
}

impl FromStr for Commitment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processed" => Ok(Commitment::Processed),
            "confirmed" => Ok(Commitment::Confirmed),
            "finalized" => Ok(Commitment::Finalized),
            other => Err(format!("unknown commitment level '{}'", other)),
        }
    }
}

/// RPC and websocket endpoints for a cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub rpc_url: String,
    pub websocket_url: String,
}

/// Map a cluster moniker or raw http(s) URL to its endpoint pair.
///
/// The websocket URL swaps the scheme (`http`→`ws`, `https`→`wss`).
pub fn resolve_endpoint(input: &str) -> Option<Endpoint> {
    let rpc_url = match input {
        "devnet" => "https://api.devnet.solana.com".to_string(),
        "testnet" => "https://api.testnet.solana.com".to_string(),
        "mainnet-beta" => "https://api.mainnet-beta.solana.com".to_string(),
        "localhost" => "http://localhost:8899".to_string(),
        url if url.starts_with("http://") || url.starts_with("https://") => url.to_string(),
        _ => return None,
    };
    let websocket_url = websocket_for(&rpc_url);
    Some(Endpoint {
        rpc_url,
        websocket_url,
    })
}

fn websocket_for(rpc_url: &str) -> String {
    if let Some(rest) = rpc_url.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = rpc_url.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        rpc_url.to_string()
    }
}

/// CLI client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    pub json_rpc_url: String,
    pub websocket_url: String,
    pub keypair_path: String,
    pub commitment: Commitment,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let devnet = "https://api.devnet.solana.com".to_string();
        Self {
            websocket_url: websocket_for(&devnet),
            json_rpc_url: devnet,
            keypair_path: DEFAULT_KEYPAIR_PATH.to_string(),
            commitment: Commitment::default(),
        }
    }
}

/// A native-currency account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wallet {
    /// Lamports
    pub balance: u64,
    /// Keypair file backing this address, if it was generated locally
    pub keypair_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramAccount {
    pub authority: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub signature: String,
    pub description: String,
}

/// A token mint and its holder ledger.
///
/// `supply` always equals the sum of `holders`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenMint {
    pub symbol: Option<String>,
    pub decimals: u8,
    pub supply: u64,
    pub authority: String,
    #[serde(default)]
    pub holders: BTreeMap<String, u64>,
}

impl TokenMint {
    pub fn balance_of(&self, holder: &str) -> u64 {
        self.holders.get(holder).copied().unwrap_or(0)
    }

    pub fn holder_total(&self) -> u64 {
        self.holders.values().sum()
    }
}

/// The whole simulated ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainState {
    pub wallets: BTreeMap<String, Wallet>,
    pub default_wallet: Option<String>,
    pub config: ClientConfig,
    pub programs: BTreeMap<String, ProgramAccount>,
    pub transactions: Vec<TransactionRecord>,
    pub token_mints: BTreeMap<String, TokenMint>,
}

impl ChainState {
    /// Lamport balance, zero for unknown addresses.
    pub fn balance(&self, address: &str) -> u64 {
        self.wallets.get(address).map(|w| w.balance).unwrap_or(0)
    }

    pub fn default_wallet(&self) -> Option<&str> {
        self.default_wallet.as_deref()
    }

    /// Address whose keypair file lives at `path`.
    pub fn wallet_for_keypair(&self, path: &str) -> Option<&str> {
        let wanted = crate::path::normalize(path);
        self.wallets
            .iter()
            .find(|(_, wallet)| {
                wallet
                    .keypair_path
                    .as_deref()
                    .map(|p| crate::path::normalize(p) == wanted)
                    .unwrap_or(false)
            })
            .map(|(address, _)| address.as_str())
    }

    pub fn find_transaction(&self, signature: &str) -> Option<&TransactionRecord> {
        self.transactions.iter().find(|tx| tx.signature == signature)
    }

    pub fn token_balance(&self, mint: &str, holder: &str) -> u64 {
        self.token_mints
            .get(mint)
            .map(|m| m.balance_of(holder))
            .unwrap_or(0)
    }
}
