//! Tag validation via metaflac.

use std::path::Path;

use async_trait::async_trait;

use crate::pipeline::{TagValidator, TagVerdict};

use super::command::{run_shell, sh_quote};

const REQUIRED_TAGS: [&str; 4] = ["artist", "album", "title", "tracknumber"];

/// Validates Vorbis comments with `metaflac --export-tags-to=-`.
pub struct MetaflacTagValidator;

/// Parses `KEY=value` lines into lowercased keys with non-empty values.
fn present_tags(output: &str) -> Vec<(String, String)> {
    output
        .lines()
        .filter_map(|line| line.split_once('='))
        .filter(|(_, value)| !value.trim().is_empty())
        .map(|(key, value)| (key.trim().to_ascii_lowercase(), value.trim().to_string()))
        .collect()
}

fn verdict(output: &str, check_tracknumber_format: bool) -> TagVerdict {
    let tags = present_tags(output);
    for required in REQUIRED_TAGS {
        if !tags.iter().any(|(key, _)| key == required) {
            return TagVerdict::Bad(format!("missing tag: {required}"));
        }
    }
    if check_tracknumber_format {
        let well_formed = tags
            .iter()
            .filter(|(key, _)| key == "tracknumber")
            .all(|(_, value)| value.chars().all(|c| c.is_ascii_digit()));
        if !well_formed {
            return TagVerdict::Bad("malformed tracknumber".to_string());
        }
    }
    TagVerdict::Ok
}

#[async_trait]
impl TagValidator for MetaflacTagValidator {
    async fn check(&self, flac: &Path, check_tracknumber_format: bool) -> TagVerdict {
        let command = format!(
            "metaflac --export-tags-to=- {}",
            sh_quote(flac.to_string_lossy())
        );
        match run_shell(&command, None).await {
            Some(output) => verdict(&output, check_tracknumber_format),
            None => TagVerdict::Bad(format!("could not read tags from {}", flac.display())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD: &str = "ARTIST=Someone\nALBUM=Something\nTITLE=Track\nTRACKNUMBER=01\n";

    #[test]
    fn test_complete_tags_pass() {
        assert_eq!(verdict(GOOD, false), TagVerdict::Ok);
        assert_eq!(verdict(GOOD, true), TagVerdict::Ok);
    }

    #[test]
    fn test_missing_artist_fails() {
        let output = "ALBUM=Something\nTITLE=Track\nTRACKNUMBER=1\n";
        assert_eq!(
            verdict(output, false),
            TagVerdict::Bad("missing tag: artist".to_string())
        );
    }

    #[test]
    fn test_empty_value_counts_as_missing() {
        let output = "ARTIST=\nALBUM=Something\nTITLE=Track\nTRACKNUMBER=1\n";
        assert!(matches!(verdict(output, false), TagVerdict::Bad(_)));
    }

    #[test]
    fn test_tracknumber_format_only_checked_when_asked() {
        let output = "ARTIST=A\nALBUM=B\nTITLE=C\nTRACKNUMBER=1/12\n";
        assert_eq!(verdict(output, false), TagVerdict::Ok);
        assert_eq!(
            verdict(output, true),
            TagVerdict::Bad("malformed tracknumber".to_string())
        );
    }

    #[test]
    fn test_keys_are_case_insensitive() {
        let output = "artist=A\nAlbum=B\ntitle=C\nTrackNumber=7\n";
        assert_eq!(verdict(output, false), TagVerdict::Ok);
    }
}
