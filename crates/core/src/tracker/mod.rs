//! Authenticated, rate-limited access to the Gazelle tracker API.

mod client;
mod types;

pub use client::{GazelleClient, SnatchedPages};
pub use types::{Artist, GroupInfo, GroupTorrent, MusicInfo, ReleaseGroup};

pub use crate::config::TrackerConfig;

use async_trait::async_trait;
use thiserror::Error;

/// A (group, torrent) pair eligible for processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Candidate {
    pub group_id: u64,
    pub torrent_id: u64,
}

/// Errors from the tracker client.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// HTTP transport failure.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered but the body was not the expected JSON shape.
    /// Distinct from a non-success status, which is reported as absence.
    #[error("Malformed tracker response: {0}")]
    MalformedResponse(String),

    /// No configured credential produced a working session.
    #[error("All login strategies failed; check credentials in the config")]
    AllLoginsFailed,

    /// A credential is required for this strategy but not configured.
    #[error("Credential not configured: {0}")]
    MissingCredential(&'static str),
}

/// The tracker operations the pipeline needs, abstracted so tests can
/// script responses without a network.
#[async_trait]
pub trait Tracker: Send + Sync {
    /// Fetches metadata for a release group. `Ok(None)` means the tracker
    /// declined the request (treated as transient by callers).
    async fn fetch_group(&self, group_id: u64) -> Result<Option<ReleaseGroup>, TrackerError>;

    /// Downloads the authoritative torrent file. `Ok(None)` means the
    /// tracker declined or returned a non-torrent payload.
    async fn download_torrent(&self, torrent_id: u64) -> Result<Option<Vec<u8>>, TrackerError>;

    /// Permanent URL for a torrent, used in upload descriptions.
    fn permalink(&self, torrent_id: u64) -> String;

    /// Announce URL carrying the account passkey, used when packaging.
    fn announce_url(&self) -> String;
}
