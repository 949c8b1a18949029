pub mod job;
pub mod pool;

pub use job::{
    CompletedMovie, JobResult, MovieJob, MovieRequest, MovieStatus, RequestLimits,
};
pub use pool::WorkerPool;
