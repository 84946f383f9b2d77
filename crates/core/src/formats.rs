//! Target formats and edition-scoped format-gap analysis.

use once_cell::sync::Lazy;
use regex_lite::Regex;

use crate::tracker::{GroupTorrent, ReleaseGroup};

/// Pre-emphasized vinyl/CD rips must not be transcoded; the marker lives in
/// the remaster title in a handful of spellings.
static PREEMPHASIS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)pre[- ]?emphasi(s(ed)?|zed)").expect("static regex"));

/// An encoding the operator wants produced when it is missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetFormat {
    Flac,
    V0,
    V2,
    Cbr320,
}

impl TargetFormat {
    pub const ALL: [TargetFormat; 4] = [
        TargetFormat::Flac,
        TargetFormat::V0,
        TargetFormat::V2,
        TargetFormat::Cbr320,
    ];

    /// The tracker's `format` attribute for this target.
    pub fn container(self) -> &'static str {
        match self {
            TargetFormat::Flac => "FLAC",
            TargetFormat::V0 | TargetFormat::V2 | TargetFormat::Cbr320 => "MP3",
        }
    }

    /// The tracker's `encoding` attribute for this target.
    pub fn encoding(self) -> &'static str {
        match self {
            TargetFormat::Flac => "Lossless",
            TargetFormat::V0 => "V0 (VBR)",
            TargetFormat::V2 => "V2 (VBR)",
            TargetFormat::Cbr320 => "320",
        }
    }

    /// Configuration/display token.
    pub fn token(self) -> &'static str {
        match self {
            TargetFormat::Flac => "FLAC",
            TargetFormat::V0 => "V0",
            TargetFormat::V2 => "V2",
            TargetFormat::Cbr320 => "320",
        }
    }

    /// Parses a config token, case-insensitively.
    pub fn parse(token: &str) -> Option<Self> {
        match token.trim().to_ascii_uppercase().as_str() {
            "FLAC" => Some(TargetFormat::Flac),
            "V0" => Some(TargetFormat::V0),
            "V2" => Some(TargetFormat::V2),
            "320" => Some(TargetFormat::Cbr320),
            _ => None,
        }
    }
}

impl std::fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.token())
    }
}

/// Formats this torrent may legally be transcoded into. Pre-emphasized
/// releases forbid all derivative formats.
pub fn allowed_transcodes(torrent: &GroupTorrent) -> Vec<TargetFormat> {
    if PREEMPHASIS.is_match(&torrent.remaster_title) {
        Vec::new()
    } else {
        TargetFormat::ALL.to_vec()
    }
}

/// Computes the ordered list of target formats that are missing from the
/// torrent's release edition and permitted for it.
///
/// Siblings belong to the same edition when they share media, remaster
/// year, remaster title, record label and catalogue number. Only lossless
/// unreported sources are eligible at all. Pure and deterministic; the
/// sibling order never affects the result.
pub fn formats_needed(
    group: &ReleaseGroup,
    torrent: &GroupTorrent,
    targets: &[TargetFormat],
) -> Vec<TargetFormat> {
    if torrent.format != "FLAC" {
        return Vec::new();
    }
    if torrent.reported {
        return Vec::new();
    }

    let same_edition = |t: &&GroupTorrent| {
        t.media == torrent.media
            && t.remaster_year == torrent.remaster_year
            && t.remaster_title == torrent.remaster_title
            && t.remaster_record_label == torrent.remaster_record_label
            && t.remaster_catalogue_number == torrent.remaster_catalogue_number
    };

    let present: Vec<(&str, &str)> = group
        .torrents
        .iter()
        .filter(same_edition)
        .map(|t| (t.format.as_str(), t.encoding.as_str()))
        .collect();

    let allowed = allowed_transcodes(torrent);

    targets
        .iter()
        .copied()
        .filter(|target| !present.contains(&(target.container(), target.encoding())))
        .filter(|target| allowed.contains(target))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::{GroupInfo, MusicInfo, ReleaseGroup};

    fn torrent(id: u64, format: &str, encoding: &str) -> GroupTorrent {
        GroupTorrent {
            id,
            format: format.to_string(),
            encoding: encoding.to_string(),
            media: "CD".to_string(),
            remaster_year: 1999,
            remaster_title: String::new(),
            remaster_record_label: "Label".to_string(),
            remaster_catalogue_number: "CAT-1".to_string(),
            reported: false,
            file_path: "Artist - Album".to_string(),
            file_list: String::new(),
        }
    }

    fn group_of(torrents: Vec<GroupTorrent>) -> ReleaseGroup {
        ReleaseGroup {
            group: GroupInfo {
                id: 1,
                name: "Album".to_string(),
                year: 1999,
                music_info: MusicInfo { artists: vec![] },
            },
            torrents,
        }
    }

    #[test]
    fn test_parse_tokens_case_insensitive() {
        assert_eq!(TargetFormat::parse(" flac "), Some(TargetFormat::Flac));
        assert_eq!(TargetFormat::parse("v0"), Some(TargetFormat::V0));
        assert_eq!(TargetFormat::parse("320"), Some(TargetFormat::Cbr320));
        assert_eq!(TargetFormat::parse("wav"), None);
    }

    #[test]
    fn test_missing_320_only() {
        let flac = torrent(10, "FLAC", "Lossless");
        let group = group_of(vec![flac.clone(), torrent(11, "MP3", "V0 (VBR)")]);
        let targets = [TargetFormat::Flac, TargetFormat::V0, TargetFormat::Cbr320];

        let needed = formats_needed(&group, &flac, &targets);
        assert_eq!(needed, vec![TargetFormat::Cbr320]);
    }

    #[test]
    fn test_sibling_order_is_irrelevant() {
        let flac = torrent(10, "FLAC", "Lossless");
        let v0 = torrent(11, "MP3", "V0 (VBR)");
        let v2 = torrent(12, "MP3", "V2 (VBR)");
        let targets = [TargetFormat::V0, TargetFormat::V2, TargetFormat::Cbr320];

        let forward = group_of(vec![flac.clone(), v0.clone(), v2.clone()]);
        let backward = group_of(vec![v2, v0, flac.clone()]);

        assert_eq!(
            formats_needed(&forward, &flac, &targets),
            formats_needed(&backward, &flac, &targets)
        );
    }

    #[test]
    fn test_non_flac_source_needs_nothing() {
        let mp3 = torrent(10, "MP3", "320");
        let group = group_of(vec![mp3.clone()]);
        assert!(formats_needed(&group, &mp3, &TargetFormat::ALL).is_empty());
    }

    #[test]
    fn test_reported_source_needs_nothing() {
        let mut flac = torrent(10, "FLAC", "Lossless");
        flac.reported = true;
        let group = group_of(vec![flac.clone()]);
        assert!(formats_needed(&group, &flac, &TargetFormat::ALL).is_empty());
    }

    #[test]
    fn test_other_edition_does_not_satisfy_gap() {
        let flac = torrent(10, "FLAC", "Lossless");
        let mut vinyl_v0 = torrent(11, "MP3", "V0 (VBR)");
        vinyl_v0.media = "Vinyl".to_string();
        let group = group_of(vec![flac.clone(), vinyl_v0]);

        let needed = formats_needed(&group, &flac, &[TargetFormat::V0]);
        assert_eq!(needed, vec![TargetFormat::V0]);
    }

    #[test]
    fn test_preemphasis_forbids_everything() {
        for marker in ["Pre-emphasis", "PRE EMPHASISED", "preemphasized"] {
            let mut flac = torrent(10, "FLAC", "Lossless");
            flac.remaster_title = format!("Original {marker} Master");
            let group = group_of(vec![flac.clone()]);

            assert!(allowed_transcodes(&flac).is_empty(), "marker {marker:?}");
            assert!(
                formats_needed(&group, &flac, &TargetFormat::ALL).is_empty(),
                "marker {marker:?}"
            );
        }
    }

    #[test]
    fn test_target_order_is_preserved() {
        let flac = torrent(10, "FLAC", "Lossless");
        let group = group_of(vec![flac.clone()]);
        let targets = [TargetFormat::Cbr320, TargetFormat::V0];

        let needed = formats_needed(&group, &flac, &targets);
        assert_eq!(needed, vec![TargetFormat::Cbr320, TargetFormat::V0]);
    }
}
