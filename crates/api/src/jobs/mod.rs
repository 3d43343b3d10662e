//! Background job scheduler and job implementations.

mod auto_complete;
mod expire_group_buys;
mod pool_metrics;
mod scheduler;

pub use auto_complete::AutoCompleteJob;
pub use expire_group_buys::ExpireGroupBuysJob;
pub use pool_metrics::PoolMetricsJob;
pub use scheduler::{run_once, Job, JobScheduler};
