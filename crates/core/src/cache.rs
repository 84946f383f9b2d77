//! Persistent record of why each candidate stopped being processed.
//!
//! The cache is advisory: it exists so reruns skip work that already reached
//! a terminal outcome. Loading never fails, a missing or corrupt file just
//! yields an empty cache. Every mutation rewrites the full snapshot so a
//! crash loses at most the in-flight candidate's entry.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Terminal classification for a processed candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    /// Content directory (or single source file) could not be found.
    Missing,
    /// Release is multichannel, which the transcode path does not support.
    Multichannel,
    /// No missing, permitted formats for this release edition.
    Formats,
    /// A source file failed tag validation.
    BrokenTags,
    /// Spectrograms were rejected or could not be produced.
    Spectrograms,
    /// Source files did not match the tracker's torrent.
    Hashcheck,
    /// A file in the release was incorrectly marked as 24-bit.
    #[serde(rename = "24bit")]
    TwentyFourBit,
    /// Processing ran to completion.
    Done,
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = match self {
            Reason::Missing => "missing",
            Reason::Multichannel => "multichannel",
            Reason::Formats => "formats",
            Reason::BrokenTags => "broken_tags",
            Reason::Spectrograms => "spectrograms",
            Reason::Hashcheck => "hashcheck",
            Reason::TwentyFourBit => "24bit",
            Reason::Done => "done",
        };
        f.write_str(token)
    }
}

impl FromStr for Reason {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "missing" => Ok(Reason::Missing),
            "multichannel" => Ok(Reason::Multichannel),
            "formats" => Ok(Reason::Formats),
            "broken_tags" => Ok(Reason::BrokenTags),
            "spectrograms" => Ok(Reason::Spectrograms),
            "hashcheck" => Ok(Reason::Hashcheck),
            "24bit" => Ok(Reason::TwentyFourBit),
            "done" => Ok(Reason::Done),
            _ => Err(()),
        }
    }
}

/// Reasons the operator wants reprocessed instead of skipped.
#[derive(Debug, Clone, Default)]
pub struct RetrySet {
    reasons: HashSet<Reason>,
}

impl RetrySet {
    /// Parses free-form retry tokens. Unknown tokens are ignored with a
    /// warning rather than rejected, so a typo never aborts a run.
    pub fn from_tokens<S: AsRef<str>>(tokens: &[S]) -> Self {
        let mut reasons = HashSet::new();
        for token in tokens {
            let token = token.as_ref().trim();
            match token.parse::<Reason>() {
                Ok(reason) => {
                    reasons.insert(reason);
                }
                Err(()) => warn!("Ignoring unknown retry reason: {token:?}"),
            }
        }
        Self { reasons }
    }

    pub fn contains(&self, reason: Reason) -> bool {
        self.reasons.contains(&reason)
    }

    pub fn is_empty(&self) -> bool {
        self.reasons.is_empty()
    }
}

/// In-memory torrent id → reason map backed by a JSON snapshot file.
pub struct OutcomeCache {
    path: PathBuf,
    entries: HashMap<u64, Reason>,
}

impl OutcomeCache {
    /// Loads the cache from `path`. Any structural or I/O failure yields an
    /// empty cache; the file will be recreated on the next `record`.
    pub fn load(path: &Path) -> Self {
        let entries = match std::fs::read(path) {
            Ok(bytes) => match serde_json::from_slice::<HashMap<u64, Reason>>(&bytes) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("Cache file {} is unreadable, starting empty: {e}", path.display());
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };
        Self {
            path: path.to_path_buf(),
            entries,
        }
    }

    /// Records a terminal reason and synchronously persists the full map.
    /// Persistence failure is logged, not propagated: the cache never makes
    /// a run fail.
    pub fn record(&mut self, torrent_id: u64, reason: Reason) {
        self.entries.insert(torrent_id, reason);
        if let Err(e) = self.persist() {
            warn!("Failed to persist cache to {}: {e}", self.path.display());
        }
    }

    pub fn get(&self, torrent_id: u64) -> Option<Reason> {
        self.entries.get(&torrent_id).copied()
    }

    pub fn contains(&self, torrent_id: u64) -> bool {
        self.entries.contains_key(&torrent_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn persist(&self) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(&self.entries)?;
        std::fs::write(&self.path, json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const ALL_REASONS: [Reason; 8] = [
        Reason::Missing,
        Reason::Multichannel,
        Reason::Formats,
        Reason::BrokenTags,
        Reason::Spectrograms,
        Reason::Hashcheck,
        Reason::TwentyFourBit,
        Reason::Done,
    ];

    #[test]
    fn test_reason_tokens_round_trip() {
        for reason in ALL_REASONS {
            let token = reason.to_string();
            assert_eq!(token.parse::<Reason>(), Ok(reason), "token {token:?}");
        }
    }

    #[test]
    fn test_twenty_four_bit_token() {
        assert_eq!(Reason::TwentyFourBit.to_string(), "24bit");
    }

    #[test]
    fn test_load_missing_file_yields_empty_cache() {
        let cache = OutcomeCache::load(Path::new("/nonexistent/gapfiller-cache.json"));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_load_corrupt_file_yields_empty_cache() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, b"{ not json").unwrap();

        let cache = OutcomeCache::load(&path);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_record_then_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");

        let mut cache = OutcomeCache::load(&path);
        cache.record(100, Reason::Missing);
        cache.record(200, Reason::Done);
        cache.record(100, Reason::Hashcheck); // overwrite

        let reloaded = OutcomeCache::load(&path);
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.get(100), Some(Reason::Hashcheck));
        assert_eq!(reloaded.get(200), Some(Reason::Done));
        assert!(!reloaded.contains(300));
    }

    #[test]
    fn test_record_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/deeper/cache.json");

        let mut cache = OutcomeCache::load(&path);
        cache.record(1, Reason::Formats);

        assert_eq!(OutcomeCache::load(&path).get(1), Some(Reason::Formats));
    }

    #[test]
    fn test_retry_set_ignores_unknown_tokens() {
        let set = RetrySet::from_tokens(&["hashcheck", "bogus", " done "]);
        assert!(set.contains(Reason::Hashcheck));
        assert!(set.contains(Reason::Done));
        assert!(!set.contains(Reason::Missing));
    }

    #[test]
    fn test_retry_set_empty() {
        let set = RetrySet::from_tokens::<&str>(&[]);
        assert!(set.is_empty());
        for reason in ALL_REASONS {
            assert!(!set.contains(reason));
        }
    }
}
