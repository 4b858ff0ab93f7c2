//! The distributed part of an encode run.
//!
//! The pipeline is responsible for:
//! - Holding pending chunk tasks in a shared queue
//! - Running one worker per host against that queue
//! - Recovering failed chunks by deleting partial output and re-queuing
//! - Propagating a stop request to every running invocation

mod progress;
mod task;
mod task_queue;
mod worker;
mod worker_pool;

pub use progress::{NoopProgress, ProgressSink, TracingProgress};
pub use task::{Host, LOCALHOST, Task};
pub use task_queue::TaskQueue;
pub use worker::{Worker, WorkerContext, WorkerStats};
pub use worker_pool::{PoolReport, WorkerPool};

pub(crate) use task::file_label;
