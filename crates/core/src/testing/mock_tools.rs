//! Mock tool adapters for pipeline tests.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;

use crate::formats::TargetFormat;
use crate::pipeline::{
    Confirmer, HashVerifier, SpectrogramRenderer, TagValidator, TagVerdict, ToolError,
    TorrentPackager, TranscodeOutcome, Transcoder,
};

/// Answers confirmation prompts from a script, falling back to a default.
/// Alternate-path requests pop from their own queue.
pub struct ScriptedConfirmer {
    answers: Mutex<VecDeque<bool>>,
    default_answer: bool,
    alternates: Mutex<VecDeque<Option<PathBuf>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedConfirmer {
    pub fn answering(default_answer: bool) -> Self {
        Self {
            answers: Mutex::new(VecDeque::new()),
            default_answer,
            alternates: Mutex::new(VecDeque::new()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn push_answer(&self, answer: bool) {
        self.answers.lock().unwrap().push_back(answer);
    }

    pub fn push_alternate(&self, path: Option<PathBuf>) {
        self.alternates.lock().unwrap().push_back(path);
    }

    /// Prompts seen so far, in order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Confirmer for ScriptedConfirmer {
    async fn confirm(&self, prompt: &str) -> bool {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.default_answer)
    }

    async fn alternate_path(&self, _missing: &Path) -> Option<PathBuf> {
        self.alternates.lock().unwrap().pop_front().flatten()
    }
}

/// Tag validator that flags only the registered file names.
#[derive(Default)]
pub struct MockTagValidator {
    bad_files: RwLock<Vec<String>>,
    checks: AtomicUsize,
}

impl MockTagValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_bad(&self, file_name: &str) {
        self.bad_files.write().unwrap().push(file_name.to_string());
    }

    pub fn check_count(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TagValidator for MockTagValidator {
    async fn check(&self, flac: &Path, _check_tracknumber_format: bool) -> TagVerdict {
        self.checks.fetch_add(1, Ordering::SeqCst);
        let name = flac
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if self.bad_files.read().unwrap().contains(&name) {
            TagVerdict::Bad(format!("missing tag in {name}"))
        } else {
            TagVerdict::Ok
        }
    }
}

/// Renderer that writes a marker file per render, or fails on demand.
pub struct MockRenderer {
    succeed: bool,
    renders: AtomicUsize,
}

impl MockRenderer {
    pub fn succeeding() -> Self {
        Self {
            succeed: true,
            renders: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            succeed: false,
            renders: AtomicUsize::new(0),
        }
    }

    pub fn render_count(&self) -> usize {
        self.renders.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpectrogramRenderer for MockRenderer {
    async fn render(&self, flac: &Path, _source_root: &Path, out_dir: &Path) -> bool {
        self.renders.fetch_add(1, Ordering::SeqCst);
        if !self.succeed {
            return false;
        }
        let name = flac
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        std::fs::write(out_dir.join(format!("{name}.png")), b"png").is_ok()
    }
}

/// Verifier with a fixed verdict.
pub struct MockVerifier {
    passes: bool,
    verifications: AtomicUsize,
}

impl MockVerifier {
    pub fn passing() -> Self {
        Self {
            passes: true,
            verifications: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            passes: false,
            verifications: AtomicUsize::new(0),
        }
    }

    pub fn verify_count(&self) -> usize {
        self.verifications.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HashVerifier for MockVerifier {
    async fn verify(&self, _torrent_file: &Path, _content_dir: &Path) -> bool {
        self.verifications.fetch_add(1, Ordering::SeqCst);
        self.passes
    }
}

/// Transcoder with scriptable per-format outcomes. Successful runs create
/// a real output directory so downstream packaging and cleanup operate on
/// the filesystem as they would in production.
#[derive(Default)]
pub struct MockTranscoder {
    multichannel: RwLock<bool>,
    outcomes: Arc<RwLock<HashMap<TargetFormat, Result<(), String>>>>,
    mislabeled: RwLock<bool>,
    transcoded: Arc<RwLock<Vec<TargetFormat>>>,
}

impl MockTranscoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_multichannel(&self, multichannel: bool) {
        *self.multichannel.write().unwrap() = multichannel;
    }

    /// Every format reports a 24-bit misclassification.
    pub fn set_mislabeled(&self, mislabeled: bool) {
        *self.mislabeled.write().unwrap() = mislabeled;
    }

    pub fn fail_format(&self, format: TargetFormat, message: &str) {
        self.outcomes
            .write()
            .unwrap()
            .insert(format, Err(message.to_string()));
    }

    /// Formats transcoded so far, in order.
    pub fn transcoded(&self) -> Vec<TargetFormat> {
        self.transcoded.read().unwrap().clone()
    }
}

#[async_trait]
impl Transcoder for MockTranscoder {
    async fn is_multichannel(&self, _content_dir: &Path) -> bool {
        *self.multichannel.read().unwrap()
    }

    async fn transcode_release(
        &self,
        _content_dir: &Path,
        output_dir: &Path,
        basename: &str,
        format: TargetFormat,
    ) -> Result<TranscodeOutcome, ToolError> {
        if *self.mislabeled.read().unwrap() {
            return Ok(TranscodeOutcome::Mislabeled24Bit);
        }
        if let Some(Err(message)) = self.outcomes.read().unwrap().get(&format) {
            return Err(ToolError::Failed(message.clone()));
        }
        self.transcoded.write().unwrap().push(format);
        let dest = output_dir.join(basename);
        std::fs::create_dir_all(&dest)?;
        std::fs::write(dest.join("01 - Track.mp3"), b"audio")?;
        Ok(TranscodeOutcome::Done(dest))
    }

    fn process_summary(&self, format: TargetFormat) -> String {
        format!("mock transcode to {format}")
    }
}

/// Packager that writes a placeholder .torrent, or fails on demand.
pub struct MockPackager {
    succeed: bool,
    packaged: AtomicUsize,
}

impl MockPackager {
    pub fn succeeding() -> Self {
        Self {
            succeed: true,
            packaged: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            succeed: false,
            packaged: AtomicUsize::new(0),
        }
    }

    pub fn package_count(&self) -> usize {
        self.packaged.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TorrentPackager for MockPackager {
    async fn package(
        &self,
        content_dir: &Path,
        work_dir: &Path,
        _announce_url: &str,
        _piece_length: u32,
    ) -> Result<PathBuf, ToolError> {
        self.packaged.fetch_add(1, Ordering::SeqCst);
        if !self.succeed {
            return Err(ToolError::Failed("scripted packaging failure".to_string()));
        }
        let name = content_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "release".to_string());
        let torrent_file = work_dir.join(format!("{name}.torrent"));
        std::fs::write(&torrent_file, b"d8:announce0:e")?;
        Ok(torrent_file)
    }
}
