// Batch evaluation pipeline.
// driver → retry → evaluation_client, with governor pacing and sink persistence.
// Strictly sequential: one work item and one request in flight at a time.

pub mod driver;
pub mod governor;
pub mod retry;
pub mod sink;

pub use driver::{BatchDriver, DriverSettings, ResumeMode};
pub use retry::RetryPolicy;
pub use sink::ResultSink;
