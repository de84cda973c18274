//! Service layer
//!
//! Services contain the runner's business logic: applying operations,
//! reconciling live state and driving pipeline runs. External systems are
//! reached only through the provider and image-builder traits, which keeps
//! every service testable with in-memory fakes.

mod executor;
mod pipeline;
mod reconciler;
mod retry;
mod run_log;

pub use executor::Executor;
pub use pipeline::{ImageBuilder, PipelineRunner, RunReporter};
pub use reconciler::Reconciler;
pub use retry::RetryPolicy;
pub use run_log::RunLogBuffer;
