//! The interactive loop around one session.
//!
//! Simulated commands finish before the next prompt. Build-class commands
//! start a runner job in the background; the prompt stays usable and the
//! job's output is printed, applied and saved when it finishes. A second
//! build-class command while one is running is refused.

use std::sync::Arc;

use chainlab_runner::{DispatchError, Dispatcher, JobKind, JobOutcome};
use chainlab_sim::effects::CommandResult;
use chainlab_sim::persistence::{self, SessionStorage};
use chainlab_sim::{Execution, Mission, MissionTracker, ObjectiveCompleted, Session};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, warn};

/// What the terminal prints for one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub line: String,
    pub result: CommandResult,
    pub objective: Option<ObjectiveCompleted>,
}

struct InFlight {
    line: String,
    kind: JobKind,
    handle: JoinHandle<Result<JobOutcome, DispatchError>>,
}

/// A session wired to storage, a dispatcher and an optional mission.
pub struct Terminal {
    session: Session,
    session_id: String,
    storage: Arc<dyn SessionStorage>,
    dispatcher: Arc<Dispatcher>,
    tracker: Option<MissionTracker>,
    in_flight: Option<InFlight>,
}

impl Terminal {
    pub fn new(session: Session, storage: Arc<dyn SessionStorage>, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            session_id: session.seed().to_string(),
            session,
            storage,
            dispatcher,
            tracker: None,
            in_flight: None,
        }
    }

    pub fn with_mission(mut self, mission: Mission) -> Self {
        info!(mission = %mission.id, steps = mission.steps.len(), "Tracking mission");
        self.tracker = Some(MissionTracker::new(mission));
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn tracker(&self) -> Option<&MissionTracker> {
        self.tracker.as_ref()
    }

    pub fn prompt(&self) -> String {
        self.session.prompt()
    }

    /// Whether a runner job is in flight.
    pub fn has_job(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Run one input line.
    ///
    /// Returns `None` for blank lines. A build-class command returns a
    /// notice that its job started; the real result arrives through
    /// [`Terminal::wait_for_job`].
    pub fn submit_line(&mut self, line: &str) -> Option<Reply> {
        if line.trim().is_empty() {
            return None;
        }

        let request = match self.session.execute(line) {
            Execution::Completed(result) => return Some(self.finish(line, result)),
            Execution::Remote(request) => request,
        };

        let reservation = match self.dispatcher.reserve(&self.session_id, request.kind) {
            Ok(reservation) => reservation,
            Err(e) => {
                self.persist();
                return Some(Reply {
                    line: line.to_string(),
                    result: CommandResult::fail(format!("Error: {}\n", e)),
                    objective: None,
                });
            }
        };

        let dispatcher = Arc::clone(&self.dispatcher);
        let vfs = self.session.vfs().clone();
        let args = request.args();
        let env = self.session.job_env();
        let handle = tokio::spawn(async move { dispatcher.run(reservation, &vfs, args, env).await });

        debug!(kind = %request.kind, worker = %self.dispatcher.worker_id(), "Started runner job");
        self.in_flight = Some(InFlight {
            line: line.to_string(),
            kind: request.kind,
            handle,
        });
        self.persist();

        Some(Reply {
            line: line.to_string(),
            result: CommandResult::ok(format!(
                "Running `{}` on {}...\n",
                request.invocation.argv.join(" "),
                self.dispatcher.worker_id()
            )),
            objective: None,
        })
    }

    /// Wait for the running job and apply it. `None` when nothing runs.
    ///
    /// Cancelling this future leaves the job in flight.
    pub async fn wait_for_job(&mut self) -> Option<Reply> {
        let joined = {
            let in_flight = self.in_flight.as_mut()?;
            (&mut in_flight.handle).await
        };
        let in_flight = self.in_flight.take()?;
        let result = self.complete(in_flight.kind, joined);
        Some(self.finish(&in_flight.line, result))
    }

    /// Run a line to completion, waiting for its job if it started one.
    pub async fn execute(&mut self, line: &str) -> Option<Reply> {
        let started = !self.has_job();
        let reply = self.submit_line(line)?;
        if started && self.has_job() {
            return self.wait_for_job().await;
        }
        Some(reply)
    }

    fn complete(
        &mut self,
        kind: JobKind,
        joined: Result<Result<JobOutcome, DispatchError>, JoinError>,
    ) -> CommandResult {
        match joined {
            Ok(Ok(outcome)) => {
                info!(%kind, status = ?outcome.status, exit_code = outcome.exit_code, "Runner job done");
                self.session.complete_remote(outcome.into())
            }
            Ok(Err(e)) => {
                warn!(%kind, error = %e, "Runner job aborted");
                CommandResult::fail(format!("Error: {}\n", e))
            }
            Err(e) => {
                warn!(%kind, error = %e, "Runner task did not finish");
                CommandResult::fail(format!("Error: {} job was interrupted\n", kind))
            }
        }
    }

    fn finish(&mut self, line: &str, result: CommandResult) -> Reply {
        let objective = self
            .tracker
            .as_mut()
            .and_then(|tracker| tracker.observe(line, &result));
        self.persist();
        Reply {
            line: line.to_string(),
            result,
            objective,
        }
    }

    fn persist(&self) {
        if let Err(e) = persistence::save(self.storage.as_ref(), &self.session) {
            warn!(error = %e, "Failed to save session");
        }
    }
}

async fn render<W: AsyncWrite + Unpin>(out: &mut W, terminal: &Terminal, reply: &Reply) -> std::io::Result<()> {
    out.write_all(reply.result.stdout.as_bytes()).await?;
    out.write_all(reply.result.stderr.as_bytes()).await?;
    if let Some(objective) = &reply.objective {
        let (done, total) = terminal.tracker().map(|t| t.progress()).unwrap_or((0, 0));
        out.write_all(format!("[objective] {} complete ({}/{})\n", objective.step_id, done, total).as_bytes())
            .await?;
        if objective.mission_complete {
            out.write_all(format!("[mission] {} complete\n", objective.mission_id).as_bytes())
                .await?;
        }
    }
    Ok(())
}

async fn render_hint<W: AsyncWrite + Unpin>(out: &mut W, terminal: &Terminal) -> std::io::Result<()> {
    let Some(step) = terminal.tracker().and_then(|t| t.current()) else {
        return Ok(());
    };
    if let Some(hint) = &step.hint {
        out.write_all(format!("[hint] {}\n", hint).as_bytes()).await?;
    }
    Ok(())
}

/// Read lines from `input` until EOF or `exit`, writing output to `out`.
///
/// A job still running at EOF is waited for before returning.
pub async fn run_repl<R, W>(terminal: &mut Terminal, input: R, mut out: W) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();

    if let Some(tracker) = terminal.tracker() {
        let mission = tracker.mission();
        out.write_all(format!("[mission] {}\n", mission.title).as_bytes()).await?;
        render_hint(&mut out, terminal).await?;
    }

    loop {
        out.write_all(terminal.prompt().as_bytes()).await?;
        out.flush().await?;

        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if matches!(line.trim(), "exit" | "quit") {
                    break;
                }
                if let Some(reply) = terminal.submit_line(&line) {
                    render(&mut out, terminal, &reply).await?;
                    if reply.objective.is_some() {
                        render_hint(&mut out, terminal).await?;
                    }
                }
            }
            Some(reply) = terminal.wait_for_job(), if terminal.has_job() => {
                out.write_all(b"\n").await?;
                render(&mut out, terminal, &reply).await?;
                if reply.objective.is_some() {
                    render_hint(&mut out, terminal).await?;
                }
            }
        }
    }

    if let Some(reply) = terminal.wait_for_job().await {
        render(&mut out, terminal, &reply).await?;
    }
    out.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainlab_runner::{DispatcherConfig, LocalWorker};
    use chainlab_sim::MemoryStorage;
    use std::time::Duration;

    fn terminal(seed: &str, storage: Arc<MemoryStorage>) -> Terminal {
        let worker = LocalWorker::new(vec!["true".into()], Duration::from_secs(5));
        let dispatcher = Dispatcher::new(Arc::new(worker), DispatcherConfig::default());
        Terminal::new(Session::with_seed(seed), storage, Arc::new(dispatcher))
    }

    #[tokio::test]
    async fn test_blank_line_is_ignored() {
        let storage = Arc::new(MemoryStorage::new());
        let mut t = terminal("blank", Arc::clone(&storage));
        assert!(t.submit_line("   ").is_none());
        assert!(storage.load().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_every_command_is_saved() {
        let storage = Arc::new(MemoryStorage::new());
        let mut t = terminal("saved", Arc::clone(&storage));
        let reply = t.submit_line("solana-keygen new").unwrap();
        assert_eq!(reply.result.exit_code, 0);

        let saved = storage.load().unwrap().unwrap();
        assert!(saved.contains("solana-keygen new"));
    }

    #[tokio::test]
    async fn test_disallowed_toolchain_reports_failure() {
        let storage = Arc::new(MemoryStorage::new());
        let mut t = terminal("denied", storage);
        let reply = t.execute("anchor build").await.unwrap();
        assert_eq!(reply.result.exit_code, 1);
        assert!(reply.result.stderr.contains("Toolchain not allowed: anchor"));
        assert!(!t.has_job());
    }
}
