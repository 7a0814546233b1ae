//! Applies ordered effect lists to produce the next simulation snapshot.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::effects::SideEffect;
use crate::ledger::{ChainState, Commitment, ProgramAccount, TokenMint, TransactionRecord};
use crate::path;
use crate::vfs::Vfs;

/// Everything a command can change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimState {
    pub chain: ChainState,
    pub vfs: Vfs,
    /// Root-relative working directory
    pub cwd: String,
    pub env: BTreeMap<String, String>,
}

impl Default for SimState {
    fn default() -> Self {
        Self {
            chain: ChainState::default(),
            vfs: crate::scaffold::project_template(),
            cwd: String::new(),
            env: BTreeMap::new(),
        }
    }
}

/// Fold `effects` over `state` in order, returning the new snapshot.
///
/// An effect that cannot apply is skipped with a warning; the fold itself
/// never fails.
pub fn reduce(state: &SimState, effects: &[SideEffect]) -> SimState {
    let mut next = state.clone();
    for effect in effects {
        apply(&mut next, effect);
    }
    next
}

fn apply(state: &mut SimState, effect: &SideEffect) {
    match effect {
        SideEffect::UpdateBalance { address, amount } => {
            let current = state.chain.balance(address);
            match current.checked_add_signed(*amount) {
                Some(balance) => {
                    state.chain.wallets.entry(address.clone()).or_default().balance = balance;
                }
                None => warn!(%address, amount, current, "Skipping balance update that would underflow"),
            }
        }

        SideEffect::CreateKeypair { pubkey, path: keypair_path } => {
            let chain = &mut state.chain;
            let target = path::normalize(keypair_path);
            for wallet in chain.wallets.values_mut() {
                if wallet.keypair_path.as_deref().map(path::normalize) == Some(target.clone()) {
                    wallet.keypair_path = None;
                }
            }
            chain.wallets.entry(pubkey.clone()).or_default().keypair_path = Some(keypair_path.clone());

            if chain.default_wallet.is_none() || path::normalize(&chain.config.keypair_path) == target {
                chain.default_wallet = Some(pubkey.clone());
            }
        }

        SideEffect::CreateFile { path: file_path, content } => match state.vfs.set_file(file_path, content) {
            Ok(vfs) => state.vfs = vfs,
            Err(e) => warn!(path = %file_path, error = %e, "Skipping file write"),
        },

        SideEffect::SetConfig { key, value } => set_config(&mut state.chain, key, value),

        SideEffect::RecordTx { signature, description } => {
            state.chain.transactions.push(TransactionRecord {
                signature: signature.clone(),
                description: description.clone(),
            });
        }

        SideEffect::DeployProgram { program_id, authority } => {
            state.chain.programs.insert(
                program_id.clone(),
                ProgramAccount {
                    authority: authority.clone(),
                },
            );
        }

        SideEffect::CreateMint {
            mint,
            symbol,
            decimals,
            authority,
        } => {
            state
                .chain
                .token_mints
                .entry(mint.clone())
                .or_insert_with(|| TokenMint {
                    symbol: symbol.clone(),
                    decimals: *decimals,
                    supply: 0,
                    authority: authority.clone(),
                    holders: BTreeMap::new(),
                });
        }

        SideEffect::MintTokens { mint, holder, amount } => {
            let Some(token) = state.chain.token_mints.get_mut(mint) else {
                warn!(%mint, "Skipping mint to unknown token");
                return;
            };
            let held = token.balance_of(holder);
            match (token.supply.checked_add(*amount), held.checked_add(*amount)) {
                (Some(supply), Some(held)) => {
                    token.supply = supply;
                    token.holders.insert(holder.clone(), held);
                }
                _ => warn!(%mint, amount, "Skipping mint that would overflow supply"),
            }
        }

        SideEffect::TransferTokens { mint, from, to, amount } => {
            let Some(token) = state.chain.token_mints.get_mut(mint) else {
                warn!(%mint, "Skipping transfer of unknown token");
                return;
            };
            let from_balance = token.balance_of(from);
            if from_balance < *amount {
                warn!(%mint, %from, amount, "Skipping token transfer beyond holder balance");
                return;
            }
            token.holders.insert(from.clone(), from_balance - amount);
            let to_balance = token.balance_of(to) + amount;
            token.holders.insert(to.clone(), to_balance);
        }

        SideEffect::CreateDir { path: dir } => match state.vfs.create_dir(dir) {
            Ok(vfs) => state.vfs = vfs,
            Err(e) => warn!(path = %dir, error = %e, "Skipping mkdir"),
        },

        SideEffect::DeletePath { path: target } => match state.vfs.delete_node(target) {
            Ok(vfs) => state.vfs = vfs,
            Err(e) => warn!(path = %target, error = %e, "Skipping delete"),
        },

        SideEffect::ChangeDir { path: dir } => {
            if state.vfs.is_dir(dir) {
                state.cwd = path::join(&path::normalize(dir));
            } else {
                warn!(path = %dir, "Skipping cd into missing directory");
            }
        }

        SideEffect::SetEnv { key, value } => {
            state.env.insert(key.clone(), value.clone());
        }

        SideEffect::Unknown => debug!("Ignoring unknown effect"),
    }
}

fn set_config(chain: &mut ChainState, key: &str, value: &str) {
    match key {
        "json_rpc_url" => chain.config.json_rpc_url = value.to_string(),
        "websocket_url" => chain.config.websocket_url = value.to_string(),
        "commitment" => match value.parse::<Commitment>() {
            Ok(level) => chain.config.commitment = level,
            Err(e) => warn!(error = %e, "Skipping commitment update"),
        },
        "keypair_path" => {
            chain.config.keypair_path = value.to_string();
            chain.default_wallet = chain.wallet_for_keypair(value).map(str::to_string);
        }
        other => debug!(key = other, "Ignoring unknown config key"),
    }
}
