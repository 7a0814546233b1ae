//! End-to-end terminal tests with a scripted runner.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};

use chainlab_runner::types::{JobResult, SubmitResponse};
use chainlab_runner::{
    archive, Dispatcher, DispatcherConfig, JobRequest, JobStatus, JobStatusResponse, JobWorker,
    WorkerError,
};
use chainlab_sim::persistence::SessionStorage;
use chainlab_sim::{Mission, Session};
use chainlab_terminal::{run_repl, FileStorage, Terminal};

// ============================================================================
// Scripted runner
// ============================================================================

/// Completes each job after `polls` result calls and records every call.
struct ScriptedRunner {
    polls: usize,
    jobs: AtomicUsize,
    seen: Mutex<Vec<(String, usize)>>,
    events: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    fn new(polls: usize) -> Arc<Self> {
        Arc::new(Self {
            polls,
            jobs: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
            events: Mutex::new(Vec::new()),
        })
    }

    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobWorker for ScriptedRunner {
    fn id(&self) -> &str {
        "scripted"
    }

    async fn submit(&self, request: &JobRequest) -> Result<SubmitResponse, WorkerError> {
        let n = self.jobs.fetch_add(1, Ordering::SeqCst) + 1;
        let job_id = format!("job-{}", n);
        self.events
            .lock()
            .unwrap()
            .push(format!("submit {} {}", job_id, request.job_type));
        self.seen.lock().unwrap().push((job_id.clone(), 0));
        Ok(SubmitResponse {
            job_id,
            status: JobStatus::Queued,
        })
    }

    async fn result(&self, job_id: &str) -> Result<JobStatusResponse, WorkerError> {
        let polls = {
            let mut seen = self.seen.lock().unwrap();
            let entry = seen
                .iter_mut()
                .find(|(id, _)| id == job_id)
                .ok_or_else(|| WorkerError::UnknownJob(job_id.to_string()))?;
            entry.1 += 1;
            entry.1
        };
        if polls < self.polls {
            return Ok(JobStatusResponse::pending(job_id, JobStatus::Running));
        }

        self.events.lock().unwrap().push(format!("done {}", job_id));
        let outputs = vec![(
            "hello_anchor/target/deploy/hello_anchor.so".to_string(),
            "base64:f0VMRg==".to_string(),
        )];
        let packed = general_purpose::STANDARD.encode(archive::pack(&outputs).unwrap());
        Ok(JobStatusResponse {
            status: JobStatus::Completed,
            job_id: job_id.to_string(),
            result: Some(JobResult {
                exit_code: 0,
                stdout_tail: format!("{} finished\n", job_id),
                packed_output_files: Some(packed),
                ..Default::default()
            }),
            error: None,
        })
    }
}

fn terminal_with(runner: Arc<ScriptedRunner>, storage: Arc<dyn SessionStorage>, seed: &str) -> Terminal {
    let dispatcher = Dispatcher::new(
        runner,
        DispatcherConfig {
            poll_interval: Duration::from_millis(5),
            job_timeout: Duration::from_secs(5),
            ..Default::default()
        },
    );
    Terminal::new(Session::with_seed(seed), storage, Arc::new(dispatcher))
}

async fn repl(terminal: &mut Terminal, script: &str) -> String {
    let mut out = Vec::new();
    run_repl(terminal, script.as_bytes(), &mut out).await.unwrap();
    String::from_utf8(out).unwrap()
}

// ============================================================================
// Interactive loop
// ============================================================================

#[tokio::test]
async fn test_repl_runs_simulated_commands() {
    let dir = tempfile::tempdir().unwrap();
    let storage = Arc::new(FileStorage::new(dir.path()));
    let mut terminal = terminal_with(ScriptedRunner::new(1), storage, "repl");

    let output = repl(
        &mut terminal,
        "solana-keygen new\nsolana airdrop 2\nsolana balance\nfrobnicate\nexit\nsolana airdrop 1\n",
    )
    .await;

    assert!(output.starts_with("~ $ "));
    assert!(output.contains("Requesting airdrop of 2 SOL"));
    assert!(output.contains("\n2 SOL\n"));
    assert!(output.contains("frobnicate: command not found"));
    assert!(!output.contains("airdrop of 1 SOL"));
    assert_eq!(terminal.session().history().len(), 4);
}

#[tokio::test]
async fn test_repl_waits_for_job_at_eof() {
    let storage = Arc::new(chainlab_sim::MemoryStorage::new());
    let mut terminal = terminal_with(ScriptedRunner::new(3), storage, "eof");

    let output = repl(&mut terminal, "anchor build\n").await;
    assert!(output.contains("Running `anchor build` on scripted..."));
    assert!(output.contains("job-1 finished"));
    assert!(!terminal.has_job());
    assert!(terminal
        .session()
        .vfs()
        .exists("hello_anchor/target/deploy/hello_anchor.so"));
}

#[tokio::test]
async fn test_repl_reports_mission_progress() {
    let mission = Mission::from_yaml(
        r#"
id: first-wallet
title: Create and fund a wallet
steps:
  - id: keygen
    command: solana-keygen new
    hint: Generate a keypair first
  - id: airdrop
    command: solana airdrop
    hint: Ask the faucet for SOL
    expect_stdout: "SOL"
"#,
    )
    .unwrap();

    let storage = Arc::new(chainlab_sim::MemoryStorage::new());
    let mut terminal = terminal_with(ScriptedRunner::new(1), storage, "mission").with_mission(mission);

    let output = repl(&mut terminal, "solana balance\nsolana-keygen new\nsolana airdrop 6\nsolana airdrop 1\n").await;
    assert!(output.contains("[mission] Create and fund a wallet"));
    assert!(output.contains("[hint] Generate a keypair first"));
    assert!(output.contains("[objective] keygen complete (1/2)"));
    assert!(output.contains("[hint] Ask the faucet for SOL"));
    assert!(output.contains("[objective] airdrop complete (2/2)"));
    assert!(output.contains("[mission] first-wallet complete"));
    assert!(terminal.tracker().unwrap().is_complete());
}

// ============================================================================
// Runner jobs
// ============================================================================

#[tokio::test]
async fn test_second_job_refused_while_pending() {
    let storage = Arc::new(chainlab_sim::MemoryStorage::new());
    let mut terminal = terminal_with(ScriptedRunner::new(20), storage, "busy");

    let started = terminal.submit_line("anchor build").unwrap();
    assert_eq!(started.result.exit_code, 0);
    assert!(terminal.has_job());

    let refused = terminal.submit_line("anchor deploy").unwrap();
    assert_eq!(refused.result.exit_code, 1);
    assert!(refused.result.stderr.contains("a build job is already running"));

    let pwd = terminal.submit_line("pwd").unwrap();
    assert_eq!(pwd.result.stdout, "~\n");

    let finished = terminal.wait_for_job().await.unwrap();
    assert_eq!(finished.line, "anchor build");
    assert_eq!(finished.result.exit_code, 0);
    assert!(terminal.wait_for_job().await.is_none());
}

#[tokio::test]
async fn test_sequential_builds_finish_in_order() {
    let runner = ScriptedRunner::new(2);
    let storage = Arc::new(chainlab_sim::MemoryStorage::new());
    let mut terminal = terminal_with(Arc::clone(&runner), storage, "sequential");

    let first = terminal.execute("anchor build").await.unwrap();
    let second = terminal.execute("anchor build").await.unwrap();
    assert_eq!(first.result.stdout, "job-1 finished\n");
    assert_eq!(second.result.stdout, "job-2 finished\n");
    assert_eq!(
        runner.events(),
        vec!["submit job-1 build", "done job-1", "submit job-2 build", "done job-2"]
    );
}

#[tokio::test]
async fn test_deploy_records_program_for_default_wallet() {
    let storage = Arc::new(chainlab_sim::MemoryStorage::new());
    let mut terminal = terminal_with(ScriptedRunner::new(1), storage, "deploy");
    terminal.execute("solana-keygen new").await.unwrap();

    let reply = terminal.execute("anchor deploy").await.unwrap();
    assert_eq!(reply.result.exit_code, 0);
    assert!(reply.result.stdout.contains("Program Id: "));
    assert_eq!(terminal.session().chain().programs.len(), 1);
}

// ============================================================================
// Persistence
// ============================================================================

#[tokio::test]
async fn test_session_restored_from_data_dir() {
    let dir = tempfile::tempdir().unwrap();
    {
        let storage = Arc::new(FileStorage::new(dir.path()));
        let mut terminal = terminal_with(ScriptedRunner::new(1), storage, "restore");
        repl(&mut terminal, "solana-keygen new\nmkdir notes\ncd notes\n").await;
    }

    let storage = FileStorage::new(dir.path());
    let session = chainlab_sim::persistence::load_or_default(
        &storage,
        Arc::new(chainlab_sim::CommandRegistry::new()),
        Session::fresh,
    );
    assert_eq!(session.seed(), "restore");
    assert_eq!(session.cwd(), "notes");
    assert_eq!(session.prompt(), "~/notes $ ");
    assert!(session.chain().default_wallet().is_some());
}
