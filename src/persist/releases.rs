//! Release notes and the "last seen" marker.

use semver::Version;
use tracing::warn;

use super::storage::{KeyValueStore, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReleaseNote {
    pub version: &'static str,
    pub notes: &'static str,
}

pub const RELEASES: &[ReleaseNote] = &[
    ReleaseNote {
        version: "0.0.10",
        notes: "Logs can be streamed from the server in chunks instead of fetched in one go, \
                which shortens the time until the first 500 lines appear. Streaming mode is \
                toggled next to the refresh controls and adds a stop button to cancel a \
                running query. It only behaves well when sorting by time.",
    },
    ReleaseNote {
        version: "0.0.11",
        notes: "Batch queries only fetch the fields and labels selected for display, which \
                reduces transfer size considerably. Batch mode should outperform streaming \
                mode in most cases.",
    },
    ReleaseNote {
        version: "0.0.12",
        notes: "The query row limit can be set in settings. Log details work even when the \
                app and component columns are hidden. Stored state no longer needs clearing \
                after updates.",
    },
];

fn parse_version(raw: &str) -> Option<Version> {
    Version::parse(raw.trim()).ok()
}

/// Notes newer than `last_seen`, oldest first. A missing or unparseable
/// marker means nothing has been seen yet.
pub fn unseen(last_seen: Option<&str>) -> Vec<&'static ReleaseNote> {
    let marker = last_seen.and_then(|raw| {
        let parsed = parse_version(raw);
        if parsed.is_none() && !raw.is_empty() {
            warn!(marker = raw, "ignoring unparseable last-seen version");
        }
        parsed
    });
    let mut notes: Vec<(Version, &'static ReleaseNote)> = RELEASES
        .iter()
        .filter_map(|note| parse_version(note.version).map(|v| (v, note)))
        .filter(|(v, _)| marker.as_ref().is_none_or(|m| v > m))
        .collect();
    notes.sort_by(|a, b| a.0.cmp(&b.0));
    notes.into_iter().map(|(_, note)| note).collect()
}

/// Notes the operator has not dismissed yet.
pub fn unseen_in(store: &dyn KeyValueStore, key: &str) -> Vec<&'static ReleaseNote> {
    let last_seen = match store.get(key) {
        Ok(value) => value,
        Err(e) => {
            warn!(key, error = %e, "failed reading last-seen version");
            None
        }
    };
    unseen(last_seen.as_deref())
}

/// Dismiss `shown`: remember the newest version among them.
pub fn mark_seen(store: &dyn KeyValueStore, key: &str, shown: &[&ReleaseNote]) -> Result<(), StoreError> {
    let newest = shown
        .iter()
        .filter_map(|note| parse_version(note.version).map(|v| (v, note.version)))
        .max_by(|a, b| a.0.cmp(&b.0));
    match newest {
        Some((_, version)) => store.set(key, version),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::storage::MemoryStore;

    #[test]
    fn everything_is_unseen_without_marker() {
        let notes = unseen(None);
        assert_eq!(notes.len(), RELEASES.len());
        assert_eq!(notes[0].version, "0.0.10");
    }

    #[test]
    fn versions_compare_semantically() {
        let notes = unseen(Some("0.0.9"));
        assert_eq!(notes.len(), 3);
        let notes = unseen(Some("0.0.11"));
        assert_eq!(notes.iter().map(|n| n.version).collect::<Vec<_>>(), vec!["0.0.12"]);
    }

    #[test]
    fn dismissing_stores_newest_shown() {
        let store = MemoryStore::new();
        let shown = unseen_in(&store, "carboncat.lastSeenVersion");
        mark_seen(&store, "carboncat.lastSeenVersion", &shown).unwrap();
        assert_eq!(
            store.get("carboncat.lastSeenVersion").unwrap().as_deref(),
            Some("0.0.12")
        );
        assert!(unseen_in(&store, "carboncat.lastSeenVersion").is_empty());
    }

    #[test]
    fn garbage_marker_counts_as_unseen() {
        assert_eq!(unseen(Some("latest")).len(), RELEASES.len());
    }
}
