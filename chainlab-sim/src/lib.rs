//! Chainlab simulation core.
//!
//! A deterministic, network-free rendition of a ledger development CLI:
//!
//! - [`tokenizer`] turns a typed line into an [`Invocation`]
//! - [`commands`] routes it through the [`CommandRegistry`] to a pure handler
//! - handlers describe changes as [`SideEffect`]s which [`reducer::reduce`]
//!   folds into the next [`SimState`]
//! - [`session::Session`] owns that loop and [`persistence`] saves it
//!
//! Build and deploy verbs do not run here. [`Session::execute`] hands them
//! back as a [`RemoteRequest`] for a runner, and the runner's output comes
//! back in through [`Session::complete_remote`].

pub mod commands;
pub mod effects;
pub mod generator;
pub mod ledger;
pub mod mission;
pub mod path;
pub mod persistence;
pub mod reducer;
pub mod scaffold;
pub mod session;
pub mod tokenizer;
pub mod vfs;

pub use commands::{CommandRegistry, JobKind};
pub use effects::{CommandResult, SideEffect};
pub use generator::{generate, Entropy, ValueKind};
pub use ledger::ChainState;
pub use mission::{Mission, MissionTracker, ObjectiveCompleted};
pub use persistence::{MemoryStorage, SessionRecord, SessionStorage, StorageError};
pub use reducer::SimState;
pub use session::{Execution, RemoteCompletion, RemoteRequest, Session};
pub use tokenizer::{tokenize, Invocation};
pub use vfs::{Vfs, VfsError, VfsNode};
