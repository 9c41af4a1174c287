//! Session state.
//!
//! Three reducers with disjoint action sets:
//!
//! - [`user`]: the persisted, URL-mirrored query definition
//! - [`app`]: derived and volatile data (results, loading, errors, dialogs)
//! - [`settings`]: operator preferences and saved views
//!
//! [`Session`] owns one of each and wires them to retrieval and persistence.

pub mod app;
pub mod session;
pub mod settings;
pub mod user;

pub use app::{AppAction, AppState};
pub use session::Session;
pub use settings::{SettingsAction, SettingsState, ViewError};
pub use user::UserAction;
