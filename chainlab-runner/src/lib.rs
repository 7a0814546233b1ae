//! Chainlab Runner - ships real toolchain jobs for a simulated session
//!
//! The simulator answers most commands itself. Build, test and deploy verbs
//! need a real toolchain, so the session's workspace is packed into a zip,
//! submitted to a worker, polled until it finishes, and the output files are
//! unpacked back once every path in them has been validated.
//!
//! ## Workers
//!
//! - [`HttpWorker`] talks to a runner service over `POST /v1/jobs` and
//!   `GET /v1/jobs/{id}/result`, signing requests with HMAC-SHA256 when a
//!   shared secret is configured
//! - [`LocalWorker`] runs an allow-listed binary in a temporary directory
//!
//! ## Example
//!
//! ```rust,ignore
//! use chainlab_runner::{Dispatcher, DispatcherConfig, HttpWorker};
//!
//! let worker = HttpWorker::new("https://runner.example.org", Some(secret))?;
//! let dispatcher = Dispatcher::new(Arc::new(worker), DispatcherConfig::default());
//! let outcome = dispatcher
//!     .dispatch(&session_id, JobKind::Build, session.vfs(), args, env)
//!     .await?;
//! session.complete_remote(outcome.into());
//! ```

pub mod archive;
pub mod dispatcher;
pub mod paths;
pub mod signing;
pub mod types;
pub mod worker;

pub use archive::ArchiveError;
pub use dispatcher::{DispatchError, Dispatcher, DispatcherConfig, JobOutcome};
pub use paths::{validate_relative_path, PathError};
pub use types::{JobKind, JobRequest, JobResult, JobStatus, JobStatusResponse, SubmitResponse};
pub use worker::{HttpWorker, JobWorker, LocalWorker, WorkerError};
