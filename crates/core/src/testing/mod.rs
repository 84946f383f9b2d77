//! Mock implementations of the tracker and tool seams.
//!
//! Every mock records the calls it receives so tests can assert not just
//! on outcomes but on which stages actually ran.

mod mock_tools;
mod mock_tracker;

pub use mock_tools::{
    MockPackager, MockRenderer, MockTagValidator, MockTranscoder, MockVerifier, ScriptedConfirmer,
};
pub use mock_tracker::MockTracker;

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::tracker::{GroupInfo, GroupTorrent, MusicInfo, ReleaseGroup};

    /// A FLAC Lossless CD torrent with the given edition fields.
    pub fn flac_torrent(id: u64, remaster_year: i64, remaster_title: &str) -> GroupTorrent {
        GroupTorrent {
            id,
            format: "FLAC".to_string(),
            encoding: "Lossless".to_string(),
            media: "CD".to_string(),
            remaster_year,
            remaster_title: remaster_title.to_string(),
            remaster_record_label: "Label".to_string(),
            remaster_catalogue_number: "CAT-001".to_string(),
            reported: false,
            file_path: String::new(),
            file_list: String::new(),
        }
    }

    /// An MP3 sibling in the same edition as `source`.
    pub fn mp3_sibling(id: u64, source: &GroupTorrent, encoding: &str) -> GroupTorrent {
        GroupTorrent {
            id,
            format: "MP3".to_string(),
            encoding: encoding.to_string(),
            ..source.clone()
        }
    }

    /// A release group containing the given torrents.
    pub fn release_group(group_id: u64, name: &str, torrents: Vec<GroupTorrent>) -> ReleaseGroup {
        ReleaseGroup {
            group: GroupInfo {
                id: group_id,
                name: name.to_string(),
                year: 1999,
                music_info: MusicInfo { artists: vec![] },
            },
            torrents,
        }
    }
}
