//! Mirrors of the user state outside the process: URL parameters, durable
//! key/value storage, and the release-notes marker.

pub mod releases;
pub mod storage;
pub mod url;

pub use storage::{FileStore, KeyValueStore, MemoryStore, StorageKeys, StoreError};
pub use url::{Location, MemoryLocation, UrlParams, decode_user_state, encode_user_state};
