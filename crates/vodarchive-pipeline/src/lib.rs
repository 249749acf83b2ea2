//! The Job Pipeline: the Dispatcher loop that drives jobs through their stages, plus
//! its supporting cast — the Lease Keeper, Progress Throttle, and failure policy.

mod dispatcher;
mod error;
mod failure;
mod lease;
mod metadata;
mod throttle;

pub use dispatcher::{Dispatcher, IDLE_POLL_INTERVAL};
pub use error::{PipelineError, PipelineResult};
pub use failure::apply_failure_policy;
pub use lease::{LeaseKeeper, LEASE_REFRESH_INTERVAL};
pub use metadata::MetadataProvider;
pub use throttle::{ProgressThrottle, THROTTLE_INTERVAL};
