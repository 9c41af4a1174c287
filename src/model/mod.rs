//! Value types shared by every other module.
//!
//! - [`filter`]: one predicate plus the add/remove/only list transforms
//! - [`types`]: user-editable session state and its building blocks
//! - [`frame`]: typed columnar query results

pub mod filter;
pub mod frame;
pub mod types;
