//! Gazelle API payload types.
//!
//! Field names follow the wire format (camelCase). Only the attributes the
//! pipeline consumes are modelled; the rest of the payload is ignored.

use serde::Deserialize;

/// Metadata bundle for a release group and its sibling torrents.
#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseGroup {
    pub group: GroupInfo,
    #[serde(default)]
    pub torrents: Vec<GroupTorrent>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupInfo {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub year: i64,
    #[serde(default)]
    pub music_info: MusicInfo,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MusicInfo {
    #[serde(default)]
    pub artists: Vec<Artist>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Artist {
    pub name: String,
}

/// One torrent within a release group.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupTorrent {
    pub id: u64,
    #[serde(default)]
    pub format: String,
    #[serde(default)]
    pub encoding: String,
    #[serde(default)]
    pub media: String,
    #[serde(default)]
    pub remaster_year: i64,
    #[serde(default)]
    pub remaster_title: String,
    #[serde(default)]
    pub remaster_record_label: String,
    #[serde(default)]
    pub remaster_catalogue_number: String,
    #[serde(default)]
    pub reported: bool,
    /// Directory the uploader used; empty for single-file uploads.
    #[serde(default)]
    pub file_path: String,
    /// `name{{{size}}}|||name{{{size}}}` listing; only consulted for
    /// single-file uploads.
    #[serde(default)]
    pub file_list: String,
}

impl ReleaseGroup {
    /// Finds the candidate torrent within this group.
    pub fn torrent(&self, torrent_id: u64) -> Option<&GroupTorrent> {
        self.torrents.iter().find(|t| t.id == torrent_id)
    }

    /// Display artist: single credited artist, or "Various Artists".
    pub fn artist(&self) -> String {
        match self.group.music_info.artists.as_slice() {
            [only] => only.name.clone(),
            [] => "Unknown Artist".to_string(),
            _ => "Various Artists".to_string(),
        }
    }

    /// Edition year for a torrent: the remaster year, or the group's
    /// original year when the torrent carries none.
    pub fn edition_year(&self, torrent: &GroupTorrent) -> i64 {
        if torrent.remaster_year == 0 {
            self.group.year
        } else {
            torrent.remaster_year
        }
    }
}
