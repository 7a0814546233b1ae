//! Worker that runs an allow-listed toolchain on this machine.
//!
//! Each job gets a fresh temporary directory holding the unpacked workspace.
//! The job runs in a spawned task and records its state in the worker's job
//! table, so it finishes (or hits the worker timeout) even when nobody polls
//! it any more. A finished job is handed out by one `result` call and then
//! forgotten; finished jobs nobody collects are dropped after the retention
//! period.

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, info, warn};

use super::traits::*;
use crate::archive;
use crate::types::{
    ArtifactsMeta, JobRequest, JobResult, JobStatus, JobStatusResponse, SubmitResponse,
};

/// Binaries a local worker runs unless told otherwise.
pub const DEFAULT_TOOLCHAIN: &[&str] = &["anchor", "cargo"];

/// Bytes of stdout/stderr kept per job.
pub const DEFAULT_TAIL_BYTES: usize = 16 * 1024;

/// Build output directories returned to the session.
const TARGET_OUTPUTS: &[&str] = &["deploy", "idl", "types"];

/// Directories never returned.
const SKIPPED_DIRS: &[&str] = &["node_modules", ".git", ".anchor"];

/// How long an uncollected finished job is kept.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(600);

#[derive(Debug, Clone)]
struct JobEntry {
    status: JobStatusResponse,
    finished_at: Option<Instant>,
}

impl JobEntry {
    fn pending(job_id: &str, status: JobStatus) -> Self {
        Self {
            status: JobStatusResponse::pending(job_id, status),
            finished_at: None,
        }
    }
}

type JobTable = Arc<DashMap<String, JobEntry>>;

/// Runs jobs as child processes.
pub struct LocalWorker {
    id: String,
    allow: Vec<String>,
    timeout: Duration,
    tail_bytes: usize,
    retention: Duration,
    jobs: JobTable,
}

impl LocalWorker {
    pub fn new(allow: Vec<String>, timeout: Duration) -> Self {
        Self {
            id: format!("local:{}", allow.join(",")),
            allow,
            timeout,
            tail_bytes: DEFAULT_TAIL_BYTES,
            retention: DEFAULT_RETENTION,
            jobs: Arc::new(DashMap::new()),
        }
    }

    /// Worker allowing [`DEFAULT_TOOLCHAIN`].
    pub fn with_default_toolchain(timeout: Duration) -> Self {
        Self::new(
            DEFAULT_TOOLCHAIN.iter().map(|s| s.to_string()).collect(),
            timeout,
        )
    }

    pub fn with_tail_bytes(mut self, tail_bytes: usize) -> Self {
        self.tail_bytes = tail_bytes;
        self
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Number of jobs the worker remembers.
    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    /// Drop finished jobs older than the retention period.
    fn prune(&self) {
        let before = self.jobs.len();
        self.jobs.retain(|_, entry| {
            entry
                .finished_at
                .map_or(true, |finished| finished.elapsed() < self.retention)
        });
        let dropped = before.saturating_sub(self.jobs.len());
        if dropped > 0 {
            debug!(dropped, "Dropped uncollected jobs");
        }
    }
}

#[async_trait]
impl JobWorker for LocalWorker {
    fn id(&self) -> &str {
        &self.id
    }

    async fn submit(&self, request: &JobRequest) -> Result<SubmitResponse, WorkerError> {
        let program = request
            .args
            .first()
            .ok_or_else(|| WorkerError::NotAllowed("empty command".into()))?;
        if !self.allow.iter().any(|allowed| allowed == program) {
            return Err(WorkerError::NotAllowed(program.clone()));
        }

        let packed = general_purpose::STANDARD
            .decode(&request.packed_workspace)
            .map_err(|e| WorkerError::Parse(format!("packedWorkspace: {}", e)))?;
        let files = archive::unpack(&packed).map_err(|e| WorkerError::Parse(e.to_string()))?;

        self.prune();
        let job_id = uuid::Uuid::new_v4().to_string();
        self.jobs
            .insert(job_id.clone(), JobEntry::pending(&job_id, JobStatus::Queued));

        let job = LocalJob {
            job_id: job_id.clone(),
            files,
            args: request.args.clone(),
            env: request.env.clone().unwrap_or_default(),
            timeout: self.timeout,
            tail_bytes: self.tail_bytes,
        };
        let jobs = Arc::clone(&self.jobs);
        tokio::spawn(async move {
            job.run(jobs).await;
        });

        info!(%job_id, program = %program, kind = %request.job_type, "Local job queued");
        Ok(SubmitResponse {
            job_id,
            status: JobStatus::Queued,
        })
    }

    async fn result(&self, job_id: &str) -> Result<JobStatusResponse, WorkerError> {
        match self.jobs.entry(job_id.to_string()) {
            Entry::Occupied(entry) if entry.get().status.status.is_terminal() => {
                let (_, entry) = entry.remove_entry();
                debug!(%job_id, status = ?entry.status.status, "Handed over finished job");
                Ok(entry.status)
            }
            Entry::Occupied(entry) => Ok(entry.get().status.clone()),
            Entry::Vacant(_) => Err(WorkerError::UnknownJob(job_id.to_string())),
        }
    }
}

struct LocalJob {
    job_id: String,
    files: Vec<(String, String)>,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    timeout: Duration,
    tail_bytes: usize,
}

impl LocalJob {
    async fn run(self, jobs: JobTable) {
        jobs.insert(
            self.job_id.clone(),
            JobEntry::pending(&self.job_id, JobStatus::Running),
        );

        let response = match self.execute().await {
            Ok(result) => {
                info!(job_id = %self.job_id, exit_code = result.exit_code, "Local job completed");
                JobStatusResponse {
                    status: JobStatus::Completed,
                    job_id: self.job_id.clone(),
                    result: Some(result),
                    error: None,
                }
            }
            Err(error) => {
                warn!(job_id = %self.job_id, %error, "Local job failed");
                JobStatusResponse {
                    status: JobStatus::Failed,
                    job_id: self.job_id.clone(),
                    result: None,
                    error: Some(error),
                }
            }
        };
        jobs.insert(
            self.job_id.clone(),
            JobEntry {
                status: response,
                finished_at: Some(Instant::now()),
            },
        );
    }

    async fn execute(&self) -> Result<JobResult, String> {
        let started = Instant::now();
        let dir = tempfile::tempdir().map_err(|e| format!("failed to create workspace: {}", e))?;

        for (path, content) in &self.files {
            let bytes = archive::content_bytes(path, content).map_err(|e| e.to_string())?;
            let target = dir.path().join(path);
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| format!("failed to create {}: {}", parent.display(), e))?;
            }
            tokio::fs::write(&target, bytes)
                .await
                .map_err(|e| format!("failed to write {}: {}", path, e))?;
        }

        let project = project_dir(&self.files);
        let workdir = match &project {
            Some(project) => dir.path().join(project),
            None => dir.path().to_path_buf(),
        };
        debug!(job_id = %self.job_id, workdir = %workdir.display(), args = ?self.args, "Running toolchain");

        let (program, rest) = self
            .args
            .split_first()
            .ok_or_else(|| "empty command".to_string())?;
        let mut command = tokio::process::Command::new(program);
        command
            .args(rest)
            .current_dir(&workdir)
            .envs(&self.env)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(format!("failed to start {}: {}", program, e)),
            Err(_) => {
                return Err(format!(
                    "{} timed out after {}ms",
                    program,
                    self.timeout.as_millis()
                ))
            }
        };

        let outputs = collect_outputs(dir.path(), &self.files)?;
        let output_files: Vec<String> = outputs.iter().map(|(path, _)| path.clone()).collect();
        let packed_output_files = if outputs.is_empty() {
            None
        } else {
            let packed = archive::pack(&outputs).map_err(|e| e.to_string())?;
            Some(general_purpose::STANDARD.encode(packed))
        };

        Ok(JobResult {
            exit_code: output.status.code().unwrap_or(-1),
            stdout_tail: tail(&String::from_utf8_lossy(&output.stdout), self.tail_bytes),
            stderr_tail: tail(&String::from_utf8_lossy(&output.stderr), self.tail_bytes),
            packed_output_files,
            artifacts_meta: ArtifactsMeta {
                output_files,
                duration_ms: started.elapsed().as_millis() as u64,
            },
        })
    }
}

/// Directory holding the shallowest `Anchor.toml` (or, failing that,
/// `Cargo.toml`), relative to the workspace root.
fn project_dir(files: &[(String, String)]) -> Option<String> {
    ["Anchor.toml", "Cargo.toml"].iter().find_map(|manifest| {
        files
            .iter()
            .filter_map(|(path, _)| {
                if path == manifest {
                    Some(String::new())
                } else {
                    path.strip_suffix(&format!("/{}", manifest)).map(str::to_string)
                }
            })
            .min_by_key(|dir| dir.matches('/').count() + usize::from(!dir.is_empty()))
    })
}

/// Files under `root` that are new or changed relative to `inputs`.
///
/// Inside a `target/` directory only the deploy, IDL and type outputs count.
fn collect_outputs(root: &Path, inputs: &[(String, String)]) -> Result<Vec<(String, String)>, String> {
    let before: BTreeMap<&str, &str> = inputs
        .iter()
        .map(|(path, content)| (path.as_str(), content.as_str()))
        .collect();

    let mut outputs = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let entries = std::fs::read_dir(&dir).map_err(|e| format!("failed to read {}: {}", dir.display(), e))?;
        for entry in entries {
            let entry = entry.map_err(|e| e.to_string())?;
            let path = entry.path();
            let Ok(relative) = path.strip_prefix(root) else {
                continue;
            };
            let segments: Vec<String> = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            if !wanted(&segments) {
                continue;
            }

            let file_type = entry.file_type().map_err(|e| e.to_string())?;
            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file() {
                let name = segments.join("/");
                let bytes = std::fs::read(&path).map_err(|e| format!("failed to read {}: {}", name, e))?;
                let content = archive::text_content(bytes);
                if before.get(name.as_str()) != Some(&content.as_str()) {
                    outputs.push((name, content));
                }
            }
        }
    }
    outputs.sort();
    Ok(outputs)
}

fn wanted(segments: &[String]) -> bool {
    if segments.iter().any(|s| SKIPPED_DIRS.contains(&s.as_str())) {
        return false;
    }
    match segments.iter().position(|s| s == "target") {
        Some(index) => match segments.get(index + 1) {
            Some(next) => TARGET_OUTPUTS.contains(&next.as_str()),
            None => true,
        },
        None => true,
    }
}

/// Last `max_bytes` of `text`, cut at a character boundary.
pub fn tail(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut start = text.len() - max_bytes;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    text[start..].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::JobKind;

    fn request(args: &[&str], files: &[(&str, &str)]) -> JobRequest {
        let files: Vec<(String, String)> = files
            .iter()
            .map(|(p, c)| (p.to_string(), c.to_string()))
            .collect();
        JobRequest {
            job_type: JobKind::Build,
            workspace_id: "test".into(),
            packed_workspace: general_purpose::STANDARD.encode(archive::pack(&files).unwrap()),
            args: args.iter().map(|s| s.to_string()).collect(),
            env: None,
            client_meta: None,
        }
    }

    async fn wait(worker: &LocalWorker, job_id: &str) -> JobStatusResponse {
        loop {
            let status = worker.result(job_id).await.unwrap();
            if status.status.is_terminal() {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    #[test]
    fn test_tail_keeps_end_on_char_boundary() {
        assert_eq!(tail("hello", 10), "hello");
        assert_eq!(tail("hello world", 5), "world");
        assert_eq!(tail("aé", 1), "");
        assert_eq!(tail("éa", 2), "a");
    }

    #[test]
    fn test_project_dir_prefers_shallowest_anchor_manifest() {
        let files = vec![
            ("hello/programs/x/Cargo.toml".to_string(), String::new()),
            ("hello/Anchor.toml".to_string(), String::new()),
            ("hello/Cargo.toml".to_string(), String::new()),
        ];
        assert_eq!(project_dir(&files).as_deref(), Some("hello"));
        assert_eq!(project_dir(&[("a.txt".to_string(), String::new())]), None);
    }

    #[test]
    fn test_wanted_filters_target() {
        let seg = |p: &str| p.split('/').map(str::to_string).collect::<Vec<_>>();
        assert!(wanted(&seg("p/target/deploy/x.so")));
        assert!(wanted(&seg("p/target")));
        assert!(!wanted(&seg("p/target/release/build/x")));
        assert!(!wanted(&seg("node_modules/x/index.js")));
        assert!(wanted(&seg("p/src/lib.rs")));
    }

    #[tokio::test]
    async fn test_disallowed_binary_rejected() {
        let worker = LocalWorker::with_default_toolchain(Duration::from_secs(5));
        let err = tokio_test::assert_err!(worker.submit(&request(&["rm", "-rf", "/"], &[])).await);
        assert!(matches!(err, WorkerError::NotAllowed(_)));
        assert_eq!(worker.job_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let worker = LocalWorker::with_default_toolchain(Duration::from_secs(5));
        assert!(matches!(worker.result("nope").await, Err(WorkerError::UnknownJob(_))));
    }

    #[tokio::test]
    async fn test_job_runs_in_project_dir_and_returns_outputs() {
        let worker = LocalWorker::new(vec!["sh".into()], Duration::from_secs(10));
        let submitted = worker
            .submit(&request(
                &["sh", "-c", "mkdir -p target/deploy && printf built > target/deploy/demo.so && echo done"],
                &[("demo/Anchor.toml", "[provider]\n"), ("notes.txt", "keep")],
            ))
            .await
            .unwrap();
        assert_eq!(submitted.status, JobStatus::Queued);

        let status = wait(&worker, &submitted.job_id).await;
        assert_eq!(status.status, JobStatus::Completed);
        let result = status.result.unwrap();
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.stdout_tail, "done\n");
        assert_eq!(result.artifacts_meta.output_files, vec!["demo/target/deploy/demo.so"]);

        let packed = general_purpose::STANDARD
            .decode(result.packed_output_files.unwrap())
            .unwrap();
        assert_eq!(
            archive::unpack(&packed).unwrap(),
            vec![("demo/target/deploy/demo.so".to_string(), "built".to_string())]
        );
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_completed_with_code() {
        let worker = LocalWorker::new(vec!["sh".into()], Duration::from_secs(10));
        let submitted = worker
            .submit(&request(&["sh", "-c", "echo broken >&2; exit 3"], &[]))
            .await
            .unwrap();
        let status = wait(&worker, &submitted.job_id).await;
        let result = status.result.unwrap();
        assert_eq!(result.exit_code, 3);
        assert_eq!(result.stderr_tail, "broken\n");
    }

    #[tokio::test]
    async fn test_finished_job_is_handed_out_once() {
        let worker = LocalWorker::new(vec!["sh".into()], Duration::from_secs(10));
        let submitted = worker.submit(&request(&["sh", "-c", "echo ok"], &[])).await.unwrap();
        assert_eq!(worker.job_count(), 1);

        let status = wait(&worker, &submitted.job_id).await;
        assert_eq!(status.status, JobStatus::Completed);
        assert_eq!(worker.job_count(), 0);
        assert!(matches!(
            worker.result(&submitted.job_id).await,
            Err(WorkerError::UnknownJob(_))
        ));
    }

    #[tokio::test]
    async fn test_uncollected_jobs_dropped_after_retention() {
        let worker = LocalWorker::new(vec!["sh".into()], Duration::from_secs(10)).with_retention(Duration::ZERO);
        let first = worker.submit(&request(&["sh", "-c", "exit 0"], &[])).await.unwrap();
        while !worker
            .jobs
            .get(&first.job_id)
            .map_or(false, |entry| entry.finished_at.is_some())
        {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let second = worker.submit(&request(&["sh", "-c", "sleep 1"], &[])).await.unwrap();
        assert_eq!(worker.job_count(), 1);
        assert!(matches!(worker.result(&first.job_id).await, Err(WorkerError::UnknownJob(_))));
        assert!(worker.result(&second.job_id).await.is_ok());
    }

    #[tokio::test]
    async fn test_worker_timeout_fails_job() {
        let worker = LocalWorker::new(vec!["sh".into()], Duration::from_millis(100));
        let submitted = tokio_test::assert_ok!(worker.submit(&request(&["sh", "-c", "sleep 5"], &[])).await);
        let status = wait(&worker, &submitted.job_id).await;
        assert_eq!(status.status, JobStatus::Failed);
        assert!(status.error.unwrap().contains("timed out"));
    }
}
