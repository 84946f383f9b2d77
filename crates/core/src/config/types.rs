use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::formats::TargetFormat;

use super::ConfigError;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub tracker: TrackerConfig,
    pub library: LibraryConfig,
    #[serde(default)]
    pub transcode: TranscodeConfig,
}

/// Tracker endpoint and credentials. Credentials are tried in priority
/// order: API key, session cookie, username/password.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrackerConfig {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub session_cookie: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_announce_host")]
    pub announce_host: String,
    /// Minimum milliseconds between consecutive API calls.
    #[serde(default = "default_rate_limit_ms")]
    pub rate_limit_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl TrackerConfig {
    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    pub fn announce_host(&self) -> &str {
        self.announce_host.trim_end_matches('/')
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            username: String::new(),
            password: String::new(),
            session_cookie: String::new(),
            api_key: String::new(),
            base_url: default_base_url(),
            announce_host: default_announce_host(),
            rate_limit_ms: default_rate_limit_ms(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "https://redacted.ch".to_string()
}

fn default_announce_host() -> String {
    "https://flacsfor.me".to_string()
}

fn default_rate_limit_ms() -> u64 {
    2000
}

fn default_timeout_secs() -> u64 {
    30
}

/// Where source content lives and where produced artifacts go.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LibraryConfig {
    /// Root directory holding the snatched releases.
    pub content_dir: PathBuf,
    /// Where transcoded release directories are written.
    pub output_dir: PathBuf,
    /// Where produced .torrent files are copied.
    pub torrent_dir: PathBuf,
    /// Staging directory for spectrogram review.
    pub spectral_dir: PathBuf,
}

/// Transcode policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TranscodeConfig {
    /// Comma-separated target format tokens, e.g. "flac, v0, 320".
    #[serde(default = "default_formats")]
    pub formats: String,
    /// Comma-separated accepted media types.
    #[serde(default = "default_media")]
    pub media: String,
    /// Whether 24-bit sources are downconverted rather than refused.
    #[serde(default = "default_allow_24bit")]
    pub allow_24bit: bool,
    /// Torrent piece length exponent (2^n bytes).
    #[serde(default = "default_piece_length")]
    pub piece_length: u32,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            formats: default_formats(),
            media: default_media(),
            allow_24bit: default_allow_24bit(),
            piece_length: default_piece_length(),
        }
    }
}

fn default_formats() -> String {
    "flac, v0, 320".to_string()
}

fn default_media() -> String {
    "cd, dvd, vinyl, soundboard, sacd, dat, web, blu-ray".to_string()
}

fn default_allow_24bit() -> bool {
    true
}

fn default_piece_length() -> u32 {
    18
}

impl Config {
    /// Parses the comma-separated format list, rejecting unknown tokens.
    pub fn target_formats(&self) -> Result<Vec<TargetFormat>, ConfigError> {
        let mut targets = Vec::new();
        for token in self.transcode.formats.split(',') {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            let target = TargetFormat::parse(token)
                .ok_or_else(|| ConfigError::Invalid(format!("unknown format {token:?}")))?;
            if !targets.contains(&target) {
                targets.push(target);
            }
        }
        if targets.is_empty() {
            return Err(ConfigError::Invalid("no target formats configured".into()));
        }
        Ok(targets)
    }

    /// Accepted media types, lowercased.
    pub fn accepted_media(&self) -> Vec<String> {
        self.transcode
            .media
            .split(',')
            .map(|m| m.trim().to_ascii_lowercase())
            .filter(|m| !m.is_empty())
            .collect()
    }

    /// Checks the settings a run cannot proceed without.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let has_credential = !self.tracker.api_key.is_empty()
            || !self.tracker.session_cookie.is_empty()
            || !self.tracker.username.is_empty();
        if !has_credential {
            return Err(ConfigError::Invalid(
                "no credential configured (api_key, session_cookie or username)".into(),
            ));
        }
        for (name, dir) in [
            ("content_dir", &self.library.content_dir),
            ("output_dir", &self.library.output_dir),
            ("torrent_dir", &self.library.torrent_dir),
            ("spectral_dir", &self.library.spectral_dir),
        ] {
            if dir.as_os_str().is_empty() {
                return Err(ConfigError::Invalid(format!("{name} is not set")));
            }
        }
        self.target_formats()?;
        if !(14..=28).contains(&self.transcode.piece_length) {
            return Err(ConfigError::Invalid(format!(
                "piece_length exponent {} out of range 14..=28",
                self.transcode.piece_length
            )));
        }
        Ok(())
    }
}
