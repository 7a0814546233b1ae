//! Drives one toolchain job from a session's VFS to its validated outputs.
//!
//! ```text
//! pack(vfs) → submit → poll every `poll_interval` → unpack(outputs)
//!                  └──────── bounded by `job_timeout` ───────┘
//! ```
//!
//! At most one job per session is in flight. Transport failures, runner-side
//! failures and timeouts come back as a failed [`JobOutcome`]; an unsafe path
//! in either direction is a [`DispatchError`] and nothing is unpacked.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, info, warn};

use chainlab_sim::{RemoteCompletion, Vfs};

use crate::archive::{self, ArchiveError};
use crate::types::{ClientMeta, JobKind, JobRequest, JobStatus, JobStatusResponse};
use crate::worker::{JobWorker, WorkerError};

/// Dispatcher settings.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Sent as `workspaceId`
    pub workspace_id: String,
    /// Delay between result polls
    pub poll_interval: Duration,
    /// Overall limit from submission to a terminal state
    pub job_timeout: Duration,
    /// Sent as `clientMeta.client`
    pub client_name: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workspace_id: "default".to_string(),
            poll_interval: Duration::from_millis(500),
            job_timeout: Duration::from_secs(120),
            client_name: concat!("chainlab/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("a {kind} job is already running for this session")]
    Busy { session_id: String, kind: JobKind },

    #[error(transparent)]
    Archive(#[from] ArchiveError),
}

/// Final state of one dispatched job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutcome {
    /// `None` when the job was never accepted
    pub job_id: Option<String>,
    pub kind: JobKind,
    pub status: JobStatus,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    /// Validated output files, relative to the workspace root
    pub files: Vec<(String, String)>,
    /// Run time reported by the runner
    pub duration_ms: u64,
    /// Wall time from packing to the terminal state
    pub elapsed_ms: u64,
    pub error: Option<String>,
}

impl JobOutcome {
    pub fn failed(job_id: Option<String>, kind: JobKind, error: impl Into<String>) -> Self {
        Self {
            job_id,
            kind,
            status: JobStatus::Failed,
            exit_code: 1,
            stdout: String::new(),
            stderr: String::new(),
            files: Vec::new(),
            duration_ms: 0,
            elapsed_ms: 0,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == JobStatus::Completed && self.exit_code == 0
    }
}

impl From<JobOutcome> for RemoteCompletion {
    fn from(outcome: JobOutcome) -> Self {
        RemoteCompletion {
            kind: Some(outcome.kind),
            exit_code: outcome.exit_code,
            stdout: outcome.stdout,
            stderr: outcome.stderr,
            files: outcome.files,
            error: outcome.error,
        }
    }
}

#[derive(Debug, Clone)]
struct PendingJob {
    kind: JobKind,
    since: DateTime<Utc>,
}

/// A session's pending-job slot. The slot is free again once this is
/// dropped, whether the job finished or not.
pub struct Reservation {
    pending: Arc<DashMap<String, PendingJob>>,
    session_id: String,
    kind: JobKind,
}

impl Reservation {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if let Some((_, job)) = self.pending.remove(&self.session_id) {
            let held_ms = (Utc::now() - job.since).num_milliseconds();
            debug!(session_id = %self.session_id, kind = %job.kind, held_ms, "Released pending job slot");
        }
    }
}

/// Sends jobs to a [`JobWorker`].
pub struct Dispatcher {
    worker: Arc<dyn JobWorker>,
    config: DispatcherConfig,
    pending: Arc<DashMap<String, PendingJob>>,
}

impl Dispatcher {
    pub fn new(worker: Arc<dyn JobWorker>, config: DispatcherConfig) -> Self {
        Self {
            worker,
            config,
            pending: Arc::new(DashMap::new()),
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub fn worker_id(&self) -> &str {
        self.worker.id()
    }

    /// Whether `session_id` has a job in flight.
    pub fn is_pending(&self, session_id: &str) -> bool {
        self.pending.contains_key(session_id)
    }

    /// Kind of the job `session_id` is waiting on, if any.
    pub fn pending_kind(&self, session_id: &str) -> Option<JobKind> {
        self.pending.get(session_id).map(|job| job.kind)
    }

    /// Claim the pending slot for `session_id`.
    pub fn reserve(&self, session_id: &str, kind: JobKind) -> Result<Reservation, DispatchError> {
        match self.pending.entry(session_id.to_string()) {
            Entry::Occupied(existing) => Err(DispatchError::Busy {
                session_id: session_id.to_string(),
                kind: existing.get().kind,
            }),
            Entry::Vacant(slot) => {
                slot.insert(PendingJob {
                    kind,
                    since: Utc::now(),
                });
                Ok(Reservation {
                    pending: Arc::clone(&self.pending),
                    session_id: session_id.to_string(),
                    kind,
                })
            }
        }
    }

    /// Run `args` against a snapshot of `vfs` and wait for the outputs.
    ///
    /// The returned files are validated but not applied; the caller writes
    /// them into the session.
    pub async fn dispatch(
        &self,
        session_id: &str,
        kind: JobKind,
        vfs: &Vfs,
        args: Vec<String>,
        env: BTreeMap<String, String>,
    ) -> Result<JobOutcome, DispatchError> {
        let reservation = self.reserve(session_id, kind)?;
        self.run(reservation, vfs, args, env).await
    }

    /// [`Dispatcher::dispatch`] with a slot claimed earlier. The slot is
    /// released when this returns.
    pub async fn run(
        &self,
        reservation: Reservation,
        vfs: &Vfs,
        args: Vec<String>,
        env: BTreeMap<String, String>,
    ) -> Result<JobOutcome, DispatchError> {
        let kind = reservation.kind;
        let session_id = reservation.session_id.clone();
        let started = Instant::now();

        let files = vfs.files();
        let packed = archive::pack(&files)?;
        debug!(files = files.len(), bytes = packed.len(), "Packed workspace");

        let request = JobRequest {
            job_type: kind,
            workspace_id: self.config.workspace_id.clone(),
            packed_workspace: general_purpose::STANDARD.encode(&packed),
            args,
            env: (!env.is_empty()).then_some(env),
            client_meta: Some(ClientMeta {
                session_id,
                client: self.config.client_name.clone(),
                submitted_at: Utc::now(),
            }),
        };

        // One budget covers submission and polling.
        let deadline = tokio::time::Instant::now() + self.config.job_timeout;
        let submitted = match tokio::time::timeout_at(deadline, self.worker.submit(&request)).await {
            Ok(Ok(submitted)) => submitted,
            Ok(Err(e)) => {
                warn!(worker = %self.worker.id(), %kind, error = %e, "Job submission failed");
                return Ok(JobOutcome::failed(None, kind, e.to_string()));
            }
            Err(_) => {
                warn!(worker = %self.worker.id(), %kind, "Job submission timed out");
                return Ok(self.timed_out(None, kind, started));
            }
        };
        let job_id = submitted.job_id;
        info!(worker = %self.worker.id(), %job_id, %kind, status = ?submitted.status, "Job submitted");

        let response = match tokio::time::timeout_at(deadline, self.poll(&job_id)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                warn!(%job_id, error = %e, "Polling failed");
                return Ok(JobOutcome::failed(Some(job_id), kind, e.to_string()));
            }
            Err(_) => {
                warn!(%job_id, timeout_ms = self.config.job_timeout.as_millis() as u64, "Job timed out");
                return Ok(self.timed_out(Some(job_id), kind, started));
            }
        };

        let mut outcome = self.finish(kind, response)?;
        outcome.elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            job_id = ?outcome.job_id,
            %kind,
            status = ?outcome.status,
            exit_code = outcome.exit_code,
            files = outcome.files.len(),
            duration_ms = outcome.duration_ms,
            elapsed_ms = outcome.elapsed_ms,
            "Job finished"
        );
        Ok(outcome)
    }

    fn timed_out(&self, job_id: Option<String>, kind: JobKind, started: Instant) -> JobOutcome {
        let mut outcome = JobOutcome::failed(
            job_id,
            kind,
            format!("job timed out after {}ms", self.config.job_timeout.as_millis()),
        );
        outcome.elapsed_ms = started.elapsed().as_millis() as u64;
        outcome
    }

    async fn poll(&self, job_id: &str) -> Result<JobStatusResponse, WorkerError> {
        loop {
            tokio::time::sleep(self.config.poll_interval).await;
            let response = self.worker.result(job_id).await?;
            debug!(%job_id, status = ?response.status, "Polled job");
            if response.status.is_terminal() {
                return Ok(response);
            }
        }
    }

    fn finish(&self, kind: JobKind, response: JobStatusResponse) -> Result<JobOutcome, DispatchError> {
        let job_id = Some(response.job_id);

        if response.status == JobStatus::Failed {
            let mut outcome = JobOutcome::failed(
                job_id,
                kind,
                response.error.unwrap_or_else(|| "job failed".to_string()),
            );
            if let Some(result) = response.result {
                outcome.stdout = result.stdout_tail;
                outcome.stderr = result.stderr_tail;
            }
            return Ok(outcome);
        }

        let Some(result) = response.result else {
            return Ok(JobOutcome::failed(job_id, kind, "job completed without a result"));
        };

        let files = match &result.packed_output_files {
            None => Vec::new(),
            Some(encoded) => {
                let bytes = match general_purpose::STANDARD.decode(encoded) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        return Ok(JobOutcome::failed(
                            job_id,
                            kind,
                            format!("packedOutputFiles is not base64: {}", e),
                        ))
                    }
                };
                match archive::unpack(&bytes) {
                    Ok(files) => files,
                    Err(e) if e.is_unsafe_path() => {
                        warn!(job_id = ?job_id, error = %e, "Rejected job outputs");
                        return Err(e.into());
                    }
                    Err(e) => {
                        return Ok(JobOutcome::failed(
                            job_id,
                            kind,
                            format!("could not unpack outputs: {}", e),
                        ))
                    }
                }
            }
        };

        let missing = missing_outputs(&result.artifacts_meta.output_files, &files);
        if !missing.is_empty() {
            warn!(job_id = ?job_id, ?missing, "Listed outputs absent from the archive");
        }

        Ok(JobOutcome {
            job_id,
            kind,
            status: JobStatus::Completed,
            exit_code: result.exit_code,
            stdout: result.stdout_tail,
            stderr: result.stderr_tail,
            files,
            duration_ms: result.artifacts_meta.duration_ms,
            elapsed_ms: 0,
            error: None,
        })
    }
}

/// Names from `artifactsMeta.outputFiles` with no entry in the unpacked archive.
fn missing_outputs(listed: &[String], files: &[(String, String)]) -> Vec<String> {
    listed
        .iter()
        .filter(|name| !files.iter().any(|(path, _)| path == *name))
        .cloned()
        .collect()
}
