//! Capability seams between the pipeline and its external collaborators.
//!
//! The pipeline only consumes boolean or structured verdicts; every
//! adapter is responsible for converting tool faults into those verdicts
//! rather than letting them escape.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

use crate::formats::TargetFormat;

/// Error from an external tool adapter.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool invocation failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Failed(String),
}

/// Blocking operator interaction. Production reads the console; tests
/// script canned answers.
#[async_trait]
pub trait Confirmer: Send + Sync {
    /// Yes/no prompt.
    async fn confirm(&self, prompt: &str) -> bool;

    /// Asks for an alternate content path when `missing` does not exist.
    /// `None` means the operator declined.
    async fn alternate_path(&self, missing: &Path) -> Option<PathBuf>;
}

/// Verdict from the external tag validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagVerdict {
    Ok,
    Bad(String),
}

#[async_trait]
pub trait TagValidator: Send + Sync {
    /// Checks one source file's tags. Track-number formatting is gated
    /// separately because it can be repaired downstream.
    async fn check(&self, flac: &Path, check_tracknumber_format: bool) -> TagVerdict;
}

/// Renders review spectrograms for one source file. Fanned out through
/// the dispatcher; returns false on any render failure.
#[async_trait]
pub trait SpectrogramRenderer: Send + Sync {
    async fn render(&self, flac: &Path, source_root: &Path, out_dir: &Path) -> bool;
}

/// Verifies the content directory against the tracker's torrent file.
#[async_trait]
pub trait HashVerifier: Send + Sync {
    async fn verify(&self, torrent_file: &Path, content_dir: &Path) -> bool;
}

/// Outcome of transcoding a whole release into one target format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscodeOutcome {
    /// The produced release directory.
    Done(PathBuf),
    /// A source file was incorrectly marked as 24-bit; the whole
    /// candidate must be abandoned.
    Mislabeled24Bit,
}

#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Whether any file in the release has more than two channels.
    async fn is_multichannel(&self, content_dir: &Path) -> bool;

    /// Transcodes every source file into `format` under
    /// `output_dir/basename`.
    async fn transcode_release(
        &self,
        content_dir: &Path,
        output_dir: &Path,
        basename: &str,
        format: TargetFormat,
    ) -> Result<TranscodeOutcome, ToolError>;

    /// Human-readable summary of the per-file command chain, for upload
    /// descriptions.
    fn process_summary(&self, format: TargetFormat) -> String;
}

/// Packages a release directory into a .torrent file inside `work_dir`.
#[async_trait]
pub trait TorrentPackager: Send + Sync {
    async fn package(
        &self,
        content_dir: &Path,
        work_dir: &Path,
        announce_url: &str,
        piece_length: u32,
    ) -> Result<PathBuf, ToolError>;
}
