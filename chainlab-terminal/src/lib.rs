//! Chainlab Terminal - the interactive front end
//!
//! Owns exactly one [`chainlab_sim::Session`] and passes it to every command.
//! Sessions are saved to `<data dir>/session.json` after each command and
//! restored on start; an unreadable or inconsistent record is discarded in
//! favour of a fresh session.
//!
//! Build-class commands go to a remote runner when `RUNNER_URL` is set and
//! to an allow-listed local toolchain otherwise.

pub mod config;
pub mod storage;
pub mod terminal;

pub use config::Args;
pub use storage::FileStorage;
pub use terminal::{run_repl, Reply, Terminal};
