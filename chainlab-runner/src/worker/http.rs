//! Remote runner reached over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use tracing::debug;

use super::traits::*;
use crate::signing::{signed_headers, SIGNATURE_HEADER, TIMESTAMP_HEADER};
use crate::types::{JobRequest, JobStatusResponse, SubmitResponse};

/// Upper bound for a single request; the dispatcher bounds the whole job.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Runner service speaking the `/v1/jobs` API.
pub struct HttpWorker {
    client: Client,
    base_url: String,
    secret: Option<String>,
}

impl HttpWorker {
    /// Create a worker for `base_url` (e.g. `https://runner.example.org`).
    ///
    /// With a `secret`, every request carries timestamp and HMAC headers.
    pub fn new(base_url: impl Into<String>, secret: Option<String>) -> Result<Self, WorkerError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| WorkerError::Unavailable(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secret: secret.filter(|s| !s.is_empty()),
        })
    }

    fn jobs_url(&self) -> String {
        format!("{}/v1/jobs", self.base_url)
    }

    fn result_url(&self, job_id: &str) -> String {
        format!("{}/v1/jobs/{}/result", self.base_url, job_id)
    }

    fn sign(&self, request: reqwest::RequestBuilder, body: &[u8]) -> reqwest::RequestBuilder {
        match &self.secret {
            Some(secret) => {
                let signed = signed_headers(secret, chrono::Utc::now().timestamp(), body);
                request
                    .header(TIMESTAMP_HEADER, signed.timestamp)
                    .header(SIGNATURE_HEADER, signed.signature)
            }
            None => request,
        }
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, WorkerError> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(WorkerError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| WorkerError::Parse(e.to_string()))
    }
}

#[async_trait]
impl JobWorker for HttpWorker {
    fn id(&self) -> &str {
        &self.base_url
    }

    async fn submit(&self, request: &JobRequest) -> Result<SubmitResponse, WorkerError> {
        let body = serde_json::to_vec(request).map_err(|e| WorkerError::Parse(e.to_string()))?;
        debug!(url = %self.jobs_url(), bytes = body.len(), "Submitting job");

        let http_request = self.sign(self.client.post(self.jobs_url()), &body);
        let response = http_request
            .body(body)
            .send()
            .await
            .map_err(|e| WorkerError::Network(e.to_string()))?;

        Self::read_json(response).await
    }

    async fn result(&self, job_id: &str) -> Result<JobStatusResponse, WorkerError> {
        let http_request = self.sign(self.client.get(self.result_url(job_id)), b"");
        let response = http_request
            .send()
            .await
            .map_err(|e| WorkerError::Network(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(WorkerError::UnknownJob(job_id.to_string()));
        }
        Self::read_json(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls() {
        let worker = HttpWorker::new("http://localhost:8080/", None).unwrap();
        assert_eq!(worker.id(), "http://localhost:8080");
        assert_eq!(worker.jobs_url(), "http://localhost:8080/v1/jobs");
        assert_eq!(worker.result_url("j-1"), "http://localhost:8080/v1/jobs/j-1/result");
    }

    #[test]
    fn test_empty_secret_means_unsigned() {
        let worker = HttpWorker::new("http://localhost:8080", Some(String::new())).unwrap();
        assert!(worker.secret.is_none());
    }
}
