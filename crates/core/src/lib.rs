pub mod cache;
pub mod config;
pub mod content;
pub mod dispatcher;
pub mod formats;
pub mod pipeline;
pub mod testing;
pub mod tools;
pub mod tracker;

pub use cache::{OutcomeCache, Reason, RetrySet};
pub use config::{bootstrap_config, load_config, load_config_from_str, Config, ConfigError};
pub use dispatcher::{BatchReport, Dispatcher};
pub use formats::{allowed_transcodes, formats_needed, TargetFormat};
pub use pipeline::{
    Confirmer, HashVerifier, Pipeline, PipelineContext, Ports, SpectrogramRenderer, TagValidator,
    TagVerdict, ToolError, TorrentPackager, TranscodeOutcome, Transcoder, Verdict,
};
pub use tracker::{
    Candidate, GazelleClient, GroupTorrent, ReleaseGroup, SnatchedPages, Tracker, TrackerConfig,
    TrackerError,
};
