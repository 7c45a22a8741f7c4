//! Cross-cutting chain middleware.
//!
//! Each middleware is an ordinary [`Handler`](crate::Handler) that wraps
//! or observes the rest of the chain through
//! [`Context::next`](crate::Context::next).

mod gzip;
mod logger;
mod metrics;
mod recovery;
mod timeout;

pub use gzip::Gzip;
pub use logger::Logger;
pub use metrics::{Metrics, MetricsSnapshot};
pub use recovery::Recovery;
pub use timeout::Timeout;
