//! Wire types for the runner job API.
//!
//! - `POST /v1/jobs` takes a [`JobRequest`] and answers with a [`SubmitResponse`]
//! - `GET /v1/jobs/{jobId}/result` answers with a [`JobStatusResponse`]
//!
//! Field names are camelCase on the wire.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use chainlab_sim::JobKind;

/// Lifecycle of a job: `queued → running → completed | failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Who submitted a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientMeta {
    pub session_id: String,
    pub client: String,
    pub submitted_at: DateTime<Utc>,
}

/// Body of `POST /v1/jobs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRequest {
    pub job_type: JobKind,
    pub workspace_id: String,
    /// Base64 of the zipped workspace
    pub packed_workspace: String,
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_meta: Option<ClientMeta>,
}

/// Answer to a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub job_id: String,
    pub status: JobStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactsMeta {
    #[serde(default)]
    pub output_files: Vec<String>,
    #[serde(default)]
    pub duration_ms: u64,
}

/// Terminal payload of a job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    pub exit_code: i32,
    #[serde(default)]
    pub stdout_tail: String,
    #[serde(default)]
    pub stderr_tail: String,
    /// Base64 of a zip holding the output files
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packed_output_files: Option<String>,
    #[serde(default)]
    pub artifacts_meta: ArtifactsMeta,
}

/// Body of `GET /v1/jobs/{jobId}/result`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusResponse {
    pub status: JobStatus,
    pub job_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobStatusResponse {
    pub fn pending(job_id: impl Into<String>, status: JobStatus) -> Self {
        Self {
            status,
            job_id: job_id.into(),
            result: None,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_names() {
        let request = JobRequest {
            job_type: JobKind::Deploy,
            workspace_id: "ws-1".into(),
            packed_workspace: "UEsF".into(),
            args: vec!["anchor".into(), "deploy".into()],
            env: None,
            client_meta: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["jobType"], "deploy");
        assert_eq!(json["workspaceId"], "ws-1");
        assert_eq!(json["packedWorkspace"], "UEsF");
        assert!(json.get("env").is_none());
        assert!(json.get("clientMeta").is_none());
    }

    #[test]
    fn test_status_response_parses_minimal_and_full() {
        let queued: JobStatusResponse =
            serde_json::from_str(r#"{"status":"queued","jobId":"j1"}"#).unwrap();
        assert_eq!(queued.status, JobStatus::Queued);
        assert!(!queued.status.is_terminal());

        let done: JobStatusResponse = serde_json::from_str(
            r#"{"status":"completed","jobId":"j1","result":{"exitCode":0,"stdoutTail":"ok",
                "stderrTail":"","artifactsMeta":{"outputFiles":["a.so"],"durationMs":1200}}}"#,
        )
        .unwrap();
        let result = done.result.unwrap();
        assert_eq!(result.artifacts_meta.output_files, vec!["a.so"]);
        assert_eq!(result.artifacts_meta.duration_ms, 1200);
        assert!(result.packed_output_files.is_none());
        assert!(done.status.is_terminal());
    }
}
