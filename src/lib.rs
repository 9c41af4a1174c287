//! carboncat: headless core of a ClickHouse log-exploration panel.
//!
//! The crate owns everything between the operator's keystrokes and the
//! database round-trip:
//!
//! - [`model`]: filter predicates, session state types, columnar results
//! - [`query`]: SQL generation, time-window resolution, refresh codes
//! - [`search`]: the `#key=value#` search-expression language and search bar
//! - [`retrieval`]: batch and chunked-streaming retrieval against a
//!   [`retrieval::QueryExecutor`]
//! - [`state`]: user/app/settings reducers and the [`state::Session`] that
//!   ties them to retrieval and persistence
//! - [`persist`]: URL parameters, durable key/value storage, release notes
//!
//! There is no renderer: a host feeds events in and reads state out.

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod persist;
pub mod query;
pub mod retrieval;
pub mod search;
pub mod state;

pub use config::{ConfigError, DataSource, PanelConfig};
pub use error::{CarboncatError, Result};
pub use model::filter::{Filter, FilterOperation};
pub use model::frame::{Column, ColumnValues, QueryFrame};
pub use model::types::{LogLevel, Mode, RowSelection, UserState, ViewId};
pub use retrieval::{QueryError, QueryExecutor, QueryRequest, WireResponse};
pub use state::Session;
