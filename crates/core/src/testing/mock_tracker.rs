//! Mock tracker for pipeline tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::tracker::{ReleaseGroup, Tracker, TrackerError};

/// Scripted [`Tracker`]. Groups and torrent payloads are registered up
/// front; call counters let tests assert that a stage never touched the
/// network.
#[derive(Default)]
pub struct MockTracker {
    groups: Arc<RwLock<HashMap<u64, ReleaseGroup>>>,
    torrent_bytes: Arc<RwLock<HashMap<u64, Vec<u8>>>>,
    fetch_group_calls: AtomicUsize,
    download_calls: AtomicUsize,
    fail_next: Arc<RwLock<bool>>,
}

impl MockTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_group(&self, group: ReleaseGroup) {
        let mut groups = self.groups.write().unwrap();
        groups.insert(group.group.id, group);
    }

    pub fn set_torrent_bytes(&self, torrent_id: u64, bytes: Vec<u8>) {
        self.torrent_bytes.write().unwrap().insert(torrent_id, bytes);
    }

    /// The next `fetch_group` call returns a hard error.
    pub fn fail_next_fetch(&self) {
        *self.fail_next.write().unwrap() = true;
    }

    pub fn fetch_group_count(&self) -> usize {
        self.fetch_group_calls.load(Ordering::SeqCst)
    }

    pub fn download_count(&self) -> usize {
        self.download_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Tracker for MockTracker {
    async fn fetch_group(&self, group_id: u64) -> Result<Option<ReleaseGroup>, TrackerError> {
        self.fetch_group_calls.fetch_add(1, Ordering::SeqCst);
        if std::mem::take(&mut *self.fail_next.write().unwrap()) {
            return Err(TrackerError::MalformedResponse(
                "scripted failure".to_string(),
            ));
        }
        Ok(self.groups.read().unwrap().get(&group_id).cloned())
    }

    async fn download_torrent(&self, torrent_id: u64) -> Result<Option<Vec<u8>>, TrackerError> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.torrent_bytes.read().unwrap().get(&torrent_id).cloned())
    }

    fn permalink(&self, torrent_id: u64) -> String {
        format!("https://mock.tracker/torrents.php?torrentid={torrent_id}")
    }

    fn announce_url(&self) -> String {
        "https://mock.announce/passkey/announce".to_string()
    }
}
