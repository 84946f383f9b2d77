//! Spectrogram rendering via sox.
//!
//! Two images per file: a full view and a two-second zoom starting a
//! third of the way in, where pre-echo and transcoding shelves are
//! easiest to spot.

use std::path::Path;

use async_trait::async_trait;

use crate::pipeline::SpectrogramRenderer;

use super::command::{run_shell, sh_quote, soxi};

const FULL_ARGS: &str = "-n remix 1 spectrogram -x 3000 -y 513 -z 120 -w Kaiser";
const ZOOM_ARGS: &str = "-n remix 1 spectrogram -x 500 -y 1025 -z 120 -w Kaiser";
const ZOOM_SECONDS: u32 = 2;

/// Output image stem: plain file name at the release root, otherwise
/// prefixed with the subdirectory (disc) name to stay unique.
fn image_stem(flac: &Path, source_root: &Path) -> String {
    let name = flac
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match flac.parent() {
        Some(parent) if parent != source_root => {
            let parent_name = parent
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            format!("{parent_name} - {name}")
        }
        _ => name,
    }
}

pub struct SoxSpectrogramRenderer;

#[async_trait]
impl SpectrogramRenderer for SoxSpectrogramRenderer {
    async fn render(&self, flac: &Path, source_root: &Path, out_dir: &Path) -> bool {
        let duration: f64 = match soxi("-D", flac).await.and_then(|d| d.parse().ok()) {
            Some(duration) => duration,
            None => return false,
        };
        let bits = soxi("-b", flac).await.unwrap_or_else(|| "?".to_string());
        let rate = soxi("-r", flac).await.unwrap_or_else(|| "?".to_string());

        let zoom_start = (duration / 3.0).round() as u64;
        let stem = out_dir.join(image_stem(flac, source_root));
        let input = sh_quote(flac.to_string_lossy());
        let title = sh_quote(
            flac.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        );
        let comment = format!("{bits} bit  |  {rate} Hz");

        let full = format!(
            "sox {input} {FULL_ARGS} -t {title} -c {} -o {}",
            sh_quote(&comment),
            sh_quote(format!("{}-full.png", stem.display())),
        );
        let zoom = format!(
            "sox {input} {ZOOM_ARGS} -S 0:{zoom_start} -d 0:{ZOOM_SECONDS} -t {title} \
             -c {} -o {}",
            sh_quote(format!(
                "{comment}  |  {ZOOM_SECONDS} sec  |  starting @ {zoom_start} sec"
            )),
            sh_quote(format!("{}-zoom.png", stem.display())),
        );

        run_shell(&full, None).await.is_some() && run_shell(&zoom, None).await.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_image_stem_at_root() {
        let root = PathBuf::from("/data/Album");
        assert_eq!(
            image_stem(&root.join("01 - Track.flac"), &root),
            "01 - Track.flac"
        );
    }

    #[test]
    fn test_image_stem_in_disc_subdir() {
        let root = PathBuf::from("/data/Album");
        assert_eq!(
            image_stem(&root.join("CD1/01 - Track.flac"), &root),
            "CD1 - 01 - Track.flac"
        );
    }
}
