//! The per-candidate processing pipeline.

mod context;
mod ports;
mod runner;

pub use context::PipelineContext;
pub use ports::{
    Confirmer, HashVerifier, SpectrogramRenderer, TagValidator, TagVerdict, ToolError,
    TorrentPackager, TranscodeOutcome, Transcoder,
};
pub use runner::{Pipeline, Ports, Verdict};
