//! The interactive session: one owned value driving tokenize → handle →
//! reduce for each line.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::commands::{CommandRegistry, HandlerContext, JobKind, Resolved};
use crate::effects::{CommandResult, SideEffect, EXIT_FAILURE, EXIT_OK};
use crate::generator::Entropy;
use crate::ledger::ChainState;
use crate::path;
use crate::reducer::{reduce, SimState};
use crate::tokenizer::{tokenize, Invocation};
use crate::vfs::Vfs;

/// Lines kept in the command history.
pub const HISTORY_LIMIT: usize = 100;

/// What executing a line produced.
#[derive(Debug)]
pub enum Execution {
    /// Simulated locally; effects are already applied.
    Completed(CommandResult),
    /// Needs a runner. Hand the result back through
    /// [`Session::complete_remote`].
    Remote(RemoteRequest),
}

/// A build-class verb waiting for a runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRequest {
    pub kind: JobKind,
    pub invocation: Invocation,
}

impl RemoteRequest {
    /// Full toolchain argv, e.g. `["anchor", "build", "--verbose"]`.
    pub fn args(&self) -> Vec<String> {
        self.invocation.argv.clone()
    }
}

/// Outcome of a remote job as the session sees it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteCompletion {
    pub kind: Option<JobKind>,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    /// Validated, VFS-relative output files
    pub files: Vec<(String, String)>,
    /// Set when the job never reached a result (transport error, timeout,
    /// runner-side failure)
    pub error: Option<String>,
}

/// One learner's simulated environment.
pub struct Session {
    started_at: DateTime<Utc>,
    state: SimState,
    history: VecDeque<String>,
    entropy: Entropy,
    registry: Arc<CommandRegistry>,
}

impl Session {
    /// A fresh session: template VFS, empty ledger.
    pub fn new(seed: impl Into<String>, started_at: DateTime<Utc>, registry: Arc<CommandRegistry>) -> Self {
        Self {
            started_at,
            state: SimState::default(),
            history: VecDeque::new(),
            entropy: Entropy::new(seed, 0),
            registry,
        }
    }

    /// Fresh session under a random seed, started now.
    pub fn fresh(registry: Arc<CommandRegistry>) -> Self {
        Self::new(uuid::Uuid::new_v4().simple().to_string(), Utc::now(), registry)
    }

    /// Fresh session with its own registry, started now.
    pub fn with_seed(seed: impl Into<String>) -> Self {
        Self::new(seed, Utc::now(), Arc::new(CommandRegistry::new()))
    }

    /// Reassemble a session from persisted parts.
    pub fn from_parts(
        entropy: Entropy,
        started_at: DateTime<Utc>,
        history: Vec<String>,
        state: SimState,
        registry: Arc<CommandRegistry>,
    ) -> Self {
        let skip = history.len().saturating_sub(HISTORY_LIMIT);
        Self {
            started_at,
            state,
            history: history.into_iter().skip(skip).collect(),
            entropy,
            registry,
        }
    }

    pub fn seed(&self) -> &str {
        self.entropy.seed()
    }

    /// Next generator counter value.
    pub fn counter(&self) -> u64 {
        self.entropy.counter()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn state(&self) -> &SimState {
        &self.state
    }

    pub fn chain(&self) -> &ChainState {
        &self.state.chain
    }

    pub fn vfs(&self) -> &Vfs {
        &self.state.vfs
    }

    /// Root-relative working directory.
    pub fn cwd(&self) -> &str {
        &self.state.cwd
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.state.env
    }

    pub fn history(&self) -> Vec<String> {
        self.history.iter().cloned().collect()
    }

    pub fn registry(&self) -> &Arc<CommandRegistry> {
        &self.registry
    }

    /// Prompt text, e.g. `~/hello_anchor $ `.
    pub fn prompt(&self) -> String {
        format!("{} $ ", path::display(&self.state.cwd))
    }

    /// Environment handed to a remote toolchain run.
    pub fn job_env(&self) -> BTreeMap<String, String> {
        let mut env = self.state.env.clone();
        env.insert(
            "ANCHOR_PROVIDER_URL".to_string(),
            self.state.chain.config.json_rpc_url.clone(),
        );
        env.insert(
            "ANCHOR_WALLET".to_string(),
            self.state.chain.config.keypair_path.clone(),
        );
        env
    }

    /// Execute one line.
    ///
    /// Blank lines do nothing and are not recorded. Every other line enters
    /// the history before it runs.
    pub fn execute(&mut self, line: &str) -> Execution {
        let line = line.trim();
        if line.is_empty() {
            return Execution::Completed(CommandResult::default());
        }
        self.remember(line);

        let invocation = tokenize(line);
        let registry = Arc::clone(&self.registry);
        match registry.resolve(&invocation) {
            Resolved::Local(handler, invocation) => {
                let history: Vec<String> = self.history.iter().cloned().collect();
                let result = {
                    let mut ctx = HandlerContext {
                        chain: &self.state.chain,
                        vfs: &self.state.vfs,
                        cwd: &self.state.cwd,
                        env: &self.state.env,
                        history: &history,
                        catalog: registry.catalog(),
                        entropy: &mut self.entropy,
                    };
                    handler(&invocation, &mut ctx)
                };
                debug!(
                    command = %invocation.command,
                    exit_code = result.exit_code,
                    effects = result.side_effects.len(),
                    "Executed command"
                );
                self.apply(&result.side_effects);
                Execution::Completed(result)
            }
            Resolved::Remote(kind, invocation) => {
                debug!(command = %invocation.command, %kind, "Routing command to runner");
                Execution::Remote(RemoteRequest { kind, invocation })
            }
            Resolved::Unknown(command) => {
                debug!(%command, "Unknown command");
                Execution::Completed(CommandResult::fail(format!(
                    "{}: command not found\n",
                    command
                )))
            }
        }
    }

    /// Execute a line with no runner available; remote verbs fail.
    pub fn run(&mut self, line: &str) -> CommandResult {
        match self.execute(line) {
            Execution::Completed(result) => result,
            Execution::Remote(request) => CommandResult::fail(format!(
                "{}: no runner is attached to this session\n",
                request.invocation.argv.join(" ")
            )),
        }
    }

    /// Merge a finished remote job into the session.
    ///
    /// Output files are written only when the job produced a result. A
    /// successful deploy also records a program and its transaction under
    /// the default signer.
    pub fn complete_remote(&mut self, completion: RemoteCompletion) -> CommandResult {
        if let Some(error) = completion.error {
            let mut stderr = completion.stderr;
            if !stderr.is_empty() && !stderr.ends_with('\n') {
                stderr.push('\n');
            }
            stderr.push_str(&format!("Error: {}\n", error));
            return CommandResult {
                stdout: completion.stdout,
                stderr,
                exit_code: EXIT_FAILURE,
                side_effects: Vec::new(),
            };
        }

        // Outputs land together or not at all.
        let mut staged = self.state.vfs.clone();
        for (path, content) in &completion.files {
            match staged.set_file(path, content) {
                Ok(next) => staged = next,
                Err(e) => {
                    warn!(%path, error = %e, "Rejected job outputs");
                    let mut stderr = completion.stderr;
                    if !stderr.is_empty() && !stderr.ends_with('\n') {
                        stderr.push('\n');
                    }
                    stderr.push_str(&format!("Error: cannot write {}: {}\n", path, e));
                    return CommandResult {
                        stdout: completion.stdout,
                        stderr,
                        exit_code: EXIT_FAILURE,
                        side_effects: Vec::new(),
                    };
                }
            }
        }

        let mut stdout = completion.stdout;
        let mut effects: Vec<SideEffect> = completion
            .files
            .into_iter()
            .map(|(path, content)| SideEffect::CreateFile { path, content })
            .collect();

        let succeeded = completion.exit_code == EXIT_OK;
        if succeeded && completion.kind == Some(JobKind::Deploy) {
            if let Some(authority) = self.state.chain.default_wallet().map(str::to_string) {
                let program_id = self.entropy.address();
                let signature = self.entropy.signature();
                if !stdout.is_empty() && !stdout.ends_with('\n') {
                    stdout.push('\n');
                }
                stdout.push_str(&format!("Program Id: {}\n\nSignature: {}\n", program_id, signature));
                effects.push(SideEffect::DeployProgram {
                    program_id: program_id.clone(),
                    authority,
                });
                effects.push(SideEffect::RecordTx {
                    signature,
                    description: format!("anchor deploy {}", program_id),
                });
            }
        }

        self.apply(&effects);
        CommandResult {
            stdout,
            stderr: completion.stderr,
            exit_code: if succeeded { EXIT_OK } else { EXIT_FAILURE },
            side_effects: effects,
        }
    }

    fn apply(&mut self, effects: &[SideEffect]) {
        if !effects.is_empty() {
            self.state = reduce(&self.state, effects);
        }
    }

    fn remember(&mut self, line: &str) {
        self.history.push_back(line.to_string());
        while self.history.len() > HISTORY_LIMIT {
            self.history.pop_front();
        }
    }
}
