//! Ledger state store and amount arithmetic.

pub mod amount;
pub mod state;

pub use amount::{format_sol, format_units, parse_sol, parse_units, LAMPORTS_PER_SOL, SOL_DECIMALS};
pub use state::{
    resolve_endpoint, ChainState, ClientConfig, Commitment, Endpoint, ProgramAccount,
    TokenMint, TransactionRecord, Wallet, UPGRADEABLE_LOADER_ID,
};
