//! Production adapters behind the pipeline's ports.
//!
//! Every adapter shells out to an external tool and converts non-zero
//! exits, spawn failures and unparsable output into the boolean or
//! structured verdicts the pipeline consumes. Faults never escape.

mod command;
mod console;
mod hashcheck;
mod spectrogram;
mod tags;
mod torrent;
mod transcode;

pub use command::{run_shell, sh_quote};
pub use console::ConsoleConfirmer;
pub use hashcheck::CommandHashVerifier;
pub use spectrogram::SoxSpectrogramRenderer;
pub use tags::MetaflacTagValidator;
pub use torrent::MktorrentPackager;
pub use transcode::SoxLameTranscoder;
