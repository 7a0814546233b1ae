//! Command handlers and the table that routes verbs to them.
//!
//! Every handler is a plain function of the invocation and a read-only view
//! of the session; it reports what should change through
//! [`SideEffect`](crate::effects::SideEffect)s instead of mutating anything.
//! Build and deploy verbs are registered as remote entries and never reach a
//! local handler.

pub mod config;
pub mod program;
pub mod shell;
pub mod token;
pub mod wallet;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::effects::CommandResult;
use crate::generator::Entropy;
use crate::ledger::ChainState;
use crate::path;
use crate::tokenizer::Invocation;
use crate::vfs::Vfs;

pub use wallet::{AIRDROP_CAP_LAMPORTS, TRANSFER_FEE_LAMPORTS};

/// Read-only session view handed to a handler, plus the entropy cursor.
pub struct HandlerContext<'a> {
    pub chain: &'a ChainState,
    pub vfs: &'a Vfs,
    pub cwd: &'a str,
    pub env: &'a BTreeMap<String, String>,
    pub history: &'a [String],
    pub catalog: &'a [(&'static str, &'static str)],
    pub entropy: &'a mut Entropy,
}

impl HandlerContext<'_> {
    /// Resolve a user path against the working directory.
    pub fn resolve(&self, input: &str) -> String {
        path::resolve(self.cwd, input)
    }

    /// The default wallet, or the standard "no signer" failure.
    pub fn signer(&self) -> Result<String, CommandResult> {
        self.chain
            .default_wallet()
            .map(str::to_string)
            .ok_or_else(no_signer)
    }
}

/// Signature every local handler has.
pub type Handler = fn(&Invocation, &mut HandlerContext<'_>) -> CommandResult;

/// Category of work shipped to a runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Build,
    Test,
    Deploy,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobKind::Build => "build",
            JobKind::Test => "test",
            JobKind::Deploy => "deploy",
        };
        f.write_str(s)
    }
}

/// How a registered verb executes.
#[derive(Clone, Copy)]
pub enum Entry {
    Local(Handler),
    Remote(JobKind),
}

struct CommandSpec {
    summary: &'static str,
    entry: Entry,
}

/// A line routed to its entry.
pub enum Resolved {
    Local(Handler, Invocation),
    Remote(JobKind, Invocation),
    Unknown(String),
}

/// Verb table built once at startup.
///
/// Keys are either a single verb (`balance`) or a verb and sub-verb
/// (`anchor build`). The `solana`, `solana-keygen` and `spl-token` prefixes
/// are folded onto the bare verbs before lookup.
pub struct CommandRegistry {
    entries: BTreeMap<&'static str, CommandSpec>,
    catalog: Vec<(&'static str, &'static str)>,
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            entries: BTreeMap::new(),
            catalog: Vec::new(),
        };

        registry.local("config", "get or set CLI configuration", config::handle);
        registry.local("keygen", "create or inspect keypairs", wallet::keygen);
        registry.local("address", "print the default wallet address", wallet::address);
        registry.local("balance", "print a SOL balance", wallet::balance);
        registry.local("airdrop", "request test SOL (capped)", wallet::airdrop);
        registry.local("transfer", "send SOL to another address", wallet::transfer);
        registry.local("confirm", "look up a transaction signature", wallet::confirm);
        registry.local("program", "deploy or show an on-chain program", program::handle);
        registry.local("token", "create, mint and move SPL tokens", token::handle);

        registry.local("ls", "list directory contents", shell::ls);
        registry.local("cd", "change directory", shell::cd);
        registry.local("pwd", "print working directory", shell::pwd);
        registry.local("cat", "print file contents", shell::cat);
        registry.local("mkdir", "create directories", shell::mkdir);
        registry.local("touch", "create empty files", shell::touch);
        registry.local("rm", "remove files or directories", shell::rm);
        registry.local("echo", "print text or write it to a file", shell::echo);
        registry.local("export", "set an environment variable", shell::export);
        registry.local("env", "print environment variables", shell::env);
        registry.local("history", "show command history", shell::history);
        registry.local("clear", "clear the screen", shell::clear);
        registry.local("help", "list available commands", shell::help);

        registry.remote("anchor build", "compile the workspace programs", JobKind::Build);
        registry.remote("anchor test", "run the workspace test suite", JobKind::Test);
        registry.remote("anchor deploy", "deploy built programs", JobKind::Deploy);
        registry.remote("cargo build-sbf", "compile programs to SBF", JobKind::Build);

        registry
    }

    fn local(&mut self, name: &'static str, summary: &'static str, handler: Handler) {
        self.insert(name, summary, Entry::Local(handler));
    }

    fn remote(&mut self, name: &'static str, summary: &'static str, kind: JobKind) {
        self.insert(name, summary, Entry::Remote(kind));
    }

    fn insert(&mut self, name: &'static str, summary: &'static str, entry: Entry) {
        self.entries.insert(name, CommandSpec { summary, entry });
        self.catalog = self
            .entries
            .iter()
            .map(|(name, spec)| (*name, spec.summary))
            .collect();
    }

    /// `(name, summary)` for every registered verb, sorted by name.
    pub fn catalog(&self) -> &[(&'static str, &'static str)] {
        &self.catalog
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Route an invocation to its entry.
    pub fn resolve(&self, invocation: &Invocation) -> Resolved {
        let invocation = fold_prefix(invocation);

        if let Some(sub) = invocation.positional(0) {
            let key = format!("{} {}", invocation.command, sub);
            if let Some(spec) = self.entries.get(key.as_str()) {
                if let Entry::Remote(kind) = spec.entry {
                    return Resolved::Remote(kind, invocation);
                }
            }
        }

        match self.entries.get(invocation.command.as_str()) {
            Some(CommandSpec {
                entry: Entry::Local(handler),
                ..
            }) => Resolved::Local(*handler, invocation),
            Some(CommandSpec {
                entry: Entry::Remote(kind),
                ..
            }) => Resolved::Remote(*kind, invocation),
            None => Resolved::Unknown(invocation.command.clone()),
        }
    }
}

/// Map the `solana`, `solana-keygen` and `spl-token` spellings onto the bare
/// verbs.
pub fn fold_prefix(invocation: &Invocation) -> Invocation {
    match invocation.command.as_str() {
        "solana" => invocation.shift(),
        "solana-keygen" => invocation.renamed("keygen"),
        "spl-token" => invocation.renamed("token"),
        _ => invocation.clone(),
    }
}

/// Standard failure when no default wallet exists.
pub fn no_signer() -> CommandResult {
    CommandResult::fail(
        "Error: No default signer found, run \"solana-keygen new -o ~/.config/solana/id.json\" to create a new one\n",
    )
}

/// Standard failure for bad argument shapes.
pub fn usage(message: &str, usage: &str) -> CommandResult {
    CommandResult::fail(format!("error: {}\n\nUsage: {}\n", message, usage))
}
