//! Queue engine: enqueue / claim / ack / fail and the janitor operations.

mod engine;
mod options;
mod overflow;
mod status;
mod tunables;

pub use engine::LeadQueue;
pub use options::{PURGE_DAYS_MAX, PURGE_DAYS_MIN, QueueOptions};
pub use status::StatusCounts;
