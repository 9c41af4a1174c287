//! Query construction.
//!
//! - [`builder`] turns structured session state into ClickHouse SQL
//! - [`time`] resolves raw time-window expressions and sizes histogram buckets
//! - [`interval`] decodes auto-refresh codes

pub mod builder;
pub mod interval;
pub mod time;

pub use builder::{LogSchema, generate_histogram_query, generate_log_query, paginate};
pub use interval::parse_refresh_interval;
pub use time::{TimeRange, TimeRangeError};
