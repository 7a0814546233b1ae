//! Job workers: the remote HTTP runner and a local process runner.

pub mod http;
pub mod local;
pub mod traits;

pub use http::HttpWorker;
pub use local::LocalWorker;
pub use traits::{JobWorker, WorkerError};
