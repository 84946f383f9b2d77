//! Release transcoding via flac/lame/sox pipelines.

use std::path::Path;

use async_trait::async_trait;
use tracing::warn;
use walkdir::WalkDir;

use crate::content::locate_flacs;
use crate::dispatcher::Dispatcher;
use crate::formats::TargetFormat;
use crate::pipeline::{ToolError, TranscodeOutcome, Transcoder};

use super::command::{run_shell, sh_quote, soxi};

/// Transcodes every FLAC in a release through the dispatcher. MP3 targets
/// decode with `flac` and encode with `lame`; the FLAC target is the
/// 16-bit downconvert of a 24-bit source, done with `sox`.
pub struct SoxLameTranscoder {
    dispatcher: Dispatcher,
}

impl SoxLameTranscoder {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    async fn probe_u32(flag: &str, file: &Path) -> Option<u32> {
        soxi(flag, file).await.and_then(|v| v.parse().ok())
    }
}

fn output_extension(format: TargetFormat) -> &'static str {
    match format {
        TargetFormat::Flac => "flac",
        TargetFormat::V0 | TargetFormat::V2 | TargetFormat::Cbr320 => "mp3",
    }
}

/// Downconverted FLAC keeps a rate the source divides evenly into.
fn downconvert_rate(source_rate: u32) -> u32 {
    if source_rate % 44100 == 0 {
        44100
    } else {
        48000
    }
}

fn encode_command(format: TargetFormat, input: &Path, output: &Path, rate: u32) -> String {
    let input = sh_quote(input.to_string_lossy());
    let output = sh_quote(output.to_string_lossy());
    match format {
        TargetFormat::V0 => format!("flac -dcs -- {input} | lame -S -V 0 - {output}"),
        TargetFormat::V2 => format!("flac -dcs -- {input} | lame -S -V 2 - {output}"),
        TargetFormat::Cbr320 => format!("flac -dcs -- {input} | lame -S -b 320 - {output}"),
        TargetFormat::Flac => {
            format!("sox {input} -G -b 16 {output} rate -v -L {rate} dither")
        }
    }
}

#[async_trait]
impl Transcoder for SoxLameTranscoder {
    async fn is_multichannel(&self, content_dir: &Path) -> bool {
        for flac in locate_flacs(content_dir) {
            if let Some(channels) = Self::probe_u32("-c", &flac).await {
                if channels > 2 {
                    return true;
                }
            }
        }
        false
    }

    async fn transcode_release(
        &self,
        content_dir: &Path,
        output_dir: &Path,
        basename: &str,
        format: TargetFormat,
    ) -> Result<TranscodeOutcome, ToolError> {
        let dest = output_dir.join(basename);
        if dest.exists() {
            return Err(ToolError::Failed(format!(
                "output directory already exists: {}",
                dest.display()
            )));
        }

        let flacs = locate_flacs(content_dir);
        if flacs.is_empty() {
            return Err(ToolError::Failed(format!(
                "no FLAC files under {}",
                content_dir.display()
            )));
        }

        let mut max_bits = 0u32;
        let mut source_rate = 44100u32;
        for flac in &flacs {
            let bits = Self::probe_u32("-b", flac).await.ok_or_else(|| {
                ToolError::Failed(format!("could not probe {}", flac.display()))
            })?;
            max_bits = max_bits.max(bits);
            if let Some(rate) = Self::probe_u32("-r", flac).await {
                source_rate = rate;
            }
        }

        // A FLAC target only exists to downconvert a 24-bit source; a
        // release labelled 24-bit whose files probe at 16 was mislabelled
        // and must not be re-uploaded.
        if format == TargetFormat::Flac && max_bits <= 16 {
            return Ok(TranscodeOutcome::Mislabeled24Bit);
        }

        std::fs::create_dir_all(&dest)?;
        let rate = downconvert_rate(source_rate);

        let mut commands = Vec::with_capacity(flacs.len());
        for flac in &flacs {
            let rel = flac.strip_prefix(content_dir).unwrap_or(flac);
            let out = dest.join(rel).with_extension(output_extension(format));
            if let Some(parent) = out.parent() {
                std::fs::create_dir_all(parent)?;
            }
            commands.push(encode_command(format, flac, &out, rate));
        }

        let report = self
            .dispatcher
            .map_all(commands, |command: String| async move {
                run_shell(&command, None).await.is_some()
            })
            .await;
        if !report.all_ok() {
            let _ = std::fs::remove_dir_all(&dest);
            return Err(ToolError::Failed(format!(
                "{} of {} files failed to transcode",
                report.failed,
                flacs.len()
            )));
        }

        copy_extra_files(content_dir, &dest);
        Ok(TranscodeOutcome::Done(dest))
    }

    fn process_summary(&self, format: TargetFormat) -> String {
        let input = Path::new("input.flac");
        let output = Path::new("output").with_extension(output_extension(format));
        encode_command(format, input, &output, 44100)
    }
}

/// Carries cover art, logs and cue sheets over to the transcode.
fn copy_extra_files(content_dir: &Path, dest: &Path) {
    for entry in WalkDir::new(content_dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
    {
        let is_flac = entry
            .path()
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("flac"))
            .unwrap_or(false);
        if is_flac {
            continue;
        }
        let rel = match entry.path().strip_prefix(content_dir) {
            Ok(rel) => rel,
            Err(_) => continue,
        };
        let target = dest.join(rel);
        if let Some(parent) = target.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!("Failed to create {}: {e}", parent.display());
                continue;
            }
        }
        if let Err(e) = std::fs::copy(entry.path(), &target) {
            warn!("Failed to copy {}: {e}", entry.path().display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_extensions() {
        assert_eq!(output_extension(TargetFormat::Flac), "flac");
        assert_eq!(output_extension(TargetFormat::V0), "mp3");
        assert_eq!(output_extension(TargetFormat::Cbr320), "mp3");
    }

    #[test]
    fn test_downconvert_rate() {
        assert_eq!(downconvert_rate(88200), 44100);
        assert_eq!(downconvert_rate(176400), 44100);
        assert_eq!(downconvert_rate(96000), 48000);
        assert_eq!(downconvert_rate(192000), 48000);
    }

    #[test]
    fn test_encode_command_shapes() {
        let input = Path::new("/in/01.flac");
        let output = Path::new("/out/01.mp3");
        let v0 = encode_command(TargetFormat::V0, input, output, 44100);
        assert!(v0.contains("flac -dcs"));
        assert!(v0.contains("lame -S -V 0"));

        let cbr = encode_command(TargetFormat::Cbr320, input, output, 44100);
        assert!(cbr.contains("-b 320"));

        let flac = encode_command(TargetFormat::Flac, input, Path::new("/out/01.flac"), 48000);
        assert!(flac.contains("sox"));
        assert!(flac.contains("-b 16"));
        assert!(flac.contains("rate -v -L 48000"));
    }

    #[test]
    fn test_copy_extra_files_skips_flacs() {
        let source = tempfile::TempDir::new().unwrap();
        let dest = tempfile::TempDir::new().unwrap();
        std::fs::write(source.path().join("01.flac"), b"x").unwrap();
        std::fs::write(source.path().join("cover.jpg"), b"x").unwrap();
        let sub = source.path().join("scans");
        std::fs::create_dir(&sub).unwrap();
        std::fs::write(sub.join("back.png"), b"x").unwrap();

        copy_extra_files(source.path(), dest.path());

        assert!(dest.path().join("cover.jpg").exists());
        assert!(dest.path().join("scans/back.png").exists());
        assert!(!dest.path().join("01.flac").exists());
    }
}
