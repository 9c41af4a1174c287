//! The search input.
//!
//! - **[`parser`]**: `#key<op>value#` token extraction, free-text remainder,
//!   autocomplete candidates.
//! - **[`bar`]**: the search bar state machine (suggestion cursor, chip
//!   deletion, debounced propagation of the free text).

pub mod bar;
pub mod parser;

pub use bar::{SearchBar, SearchKey};
pub use parser::{CompletionContext, ParsedInput};
