use std::path::PathBuf;

use crate::cache::RetrySet;
use crate::config::{Config, ConfigError};
use crate::formats::TargetFormat;

/// Per-run immutable configuration, built once and shared by reference
/// with every stage.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    /// Root directory holding the snatched releases.
    pub content_dir: PathBuf,
    /// Where transcoded release directories are written.
    pub output_dir: PathBuf,
    /// Where produced .torrent files are copied.
    pub torrent_dir: PathBuf,
    /// Staging directory for spectrogram review.
    pub spectral_dir: PathBuf,
    /// Target formats in operator preference order.
    pub targets: Vec<TargetFormat>,
    /// Accepted media types, lowercased. Empty accepts everything; the
    /// driver clears this for explicitly named releases.
    pub accepted_media: Vec<String>,
    /// Whether 24-bit sources are downconverted rather than refused.
    pub allow_24bit: bool,
    /// Worker count for per-file fan-out.
    pub threads: usize,
    /// Torrent piece length exponent.
    pub piece_length: u32,
    pub skip_spectral: bool,
    pub skip_hashcheck: bool,
    pub skip_missing: bool,
    /// Stop after the first successfully confirmed format.
    pub single_format: bool,
    /// Cached reasons the operator wants reprocessed.
    pub retry: RetrySet,
}

impl PipelineContext {
    /// Builds a context from validated configuration with all toggles off.
    pub fn from_config(config: &Config, threads: usize) -> Result<Self, ConfigError> {
        Ok(Self {
            content_dir: config.library.content_dir.clone(),
            output_dir: config.library.output_dir.clone(),
            torrent_dir: config.library.torrent_dir.clone(),
            spectral_dir: config.library.spectral_dir.clone(),
            targets: config.target_formats()?,
            accepted_media: config.accepted_media(),
            allow_24bit: config.transcode.allow_24bit,
            threads: threads.max(1),
            piece_length: config.transcode.piece_length,
            skip_spectral: false,
            skip_hashcheck: false,
            skip_missing: false,
            single_format: false,
            retry: RetrySet::default(),
        })
    }
}
