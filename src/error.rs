//! Crate-level error type.
//!
//! Each subsystem keeps its own error enum; [`CarboncatError`] is the
//! umbrella used at API seams that can fail for more than one reason.

use thiserror::Error;

use crate::config::ConfigError;
use crate::model::frame::FrameError;
use crate::persist::storage::StoreError;
use crate::query::time::TimeRangeError;
use crate::retrieval::QueryError;
use crate::state::settings::ViewError;

#[derive(Error, Debug)]
pub enum CarboncatError {
    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    TimeRange(#[from] TimeRangeError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    View(#[from] ViewError),

    #[error("Failed to spawn {task} worker: {source}")]
    Spawn {
        task: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, CarboncatError>;
