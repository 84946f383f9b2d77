//! The candidate state machine.
//!
//! Stages run in strict order and each may exit early with a terminal
//! reason. Exactly one reason is ever produced per candidate; the caller
//! records it. Metadata fetch failures produce no reason at all, so those
//! candidates are retried on every run.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::cache::{OutcomeCache, Reason};
use crate::content::{locate_flacs, single_file_name, unescape, ScopedDir, ScopedFile};
use crate::dispatcher::Dispatcher;
use crate::formats::{formats_needed, TargetFormat};
use crate::tracker::{Candidate, GroupTorrent, ReleaseGroup, Tracker, TrackerError};

use super::context::PipelineContext;
use super::ports::{
    Confirmer, HashVerifier, SpectrogramRenderer, TagValidator, TagVerdict, TorrentPackager,
    TranscodeOutcome, Transcoder,
};

/// Alternate-path prompts before giving up on a missing directory.
const MAX_RECOVERY_ATTEMPTS: u32 = 3;

/// How a candidate left the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Cached reason outside the retry set; nothing was done.
    CacheSkip,
    /// Metadata could not be resolved; no reason recorded, retried next run.
    Transient,
    /// A terminal reason the caller must record.
    Terminal(Reason),
}

/// The pipeline's external collaborators.
pub struct Ports {
    pub confirmer: Arc<dyn Confirmer>,
    pub tags: Arc<dyn TagValidator>,
    pub renderer: Arc<dyn SpectrogramRenderer>,
    pub verifier: Arc<dyn HashVerifier>,
    pub transcoder: Arc<dyn Transcoder>,
    pub packager: Arc<dyn TorrentPackager>,
}

/// Outcome of attempting one format within the transcode loop.
enum FormatOutcome {
    /// Transcoded, packaged, confirmed by the operator.
    Confirmed,
    /// Declined, failed or skipped; siblings continue.
    Passed,
    /// 24-bit misclassification aborts the whole candidate.
    Abort24Bit,
}

/// Drives one candidate at a time through the validation and transcode
/// stages. Strictly sequential; the only parallelism is the per-file
/// fan-out delegated to the dispatcher.
pub struct Pipeline {
    ctx: PipelineContext,
    tracker: Arc<dyn Tracker>,
    ports: Ports,
    dispatcher: Dispatcher,
}

impl Pipeline {
    pub fn new(ctx: PipelineContext, tracker: Arc<dyn Tracker>, ports: Ports) -> Self {
        let dispatcher = Dispatcher::new(ctx.threads);
        Self {
            ctx,
            tracker,
            ports,
            dispatcher,
        }
    }

    pub fn context(&self) -> &PipelineContext {
        &self.ctx
    }

    /// Processes one candidate to a verdict. Errors are hard tracker
    /// faults (transport or malformed payloads); the caller decides
    /// whether to continue the run.
    pub async fn process(
        &self,
        cache: &OutcomeCache,
        candidate: Candidate,
    ) -> Result<Verdict, TrackerError> {
        // CacheGate: a pure skip performs no network or filesystem work.
        if let Some(reason) = cache.get(candidate.torrent_id) {
            if !self.ctx.retry.contains(reason) {
                info!(
                    "Torrent {} already handled ({reason}), skipping",
                    candidate.torrent_id
                );
                return Ok(Verdict::CacheSkip);
            }
            info!(
                "Retrying torrent {} (previous reason: {reason})",
                candidate.torrent_id
            );
        }

        // ResolveGroup: absence is transient, never cached.
        let group = match self.tracker.fetch_group(candidate.group_id).await? {
            Some(group) => group,
            None => {
                warn!(
                    "Group {} unavailable, skipping torrent {}",
                    candidate.group_id, candidate.torrent_id
                );
                return Ok(Verdict::Transient);
            }
        };
        let torrent = match group.torrent(candidate.torrent_id) {
            Some(torrent) => torrent.clone(),
            None => {
                warn!(
                    "Torrent {} not present in group {}, skipping",
                    candidate.torrent_id, candidate.group_id
                );
                return Ok(Verdict::Transient);
            }
        };

        let artist = group.artist();
        info!(
            "Torrent {}: {} - {}",
            candidate.torrent_id,
            artist,
            unescape(&group.group.name)
        );

        // MediaGate: enumeration-level filter, never cached.
        if !self.ctx.accepted_media.is_empty()
            && !self
                .ctx
                .accepted_media
                .contains(&torrent.media.to_ascii_lowercase())
        {
            info!("Media {:?} not in accepted media, skipping", torrent.media);
            return Ok(Verdict::Transient);
        }

        // 24-bit sources only proceed when downconversion is enabled.
        if !self.ctx.allow_24bit && torrent.encoding == "24bit Lossless" {
            info!("24-bit source and allow_24bit is off, skipping");
            return Ok(Verdict::Terminal(Reason::TwentyFourBit));
        }

        // LocateContent
        let mut content_dir = match self.locate_content(&group, &torrent) {
            Some(dir) => dir,
            None => return Ok(Verdict::Terminal(Reason::Missing)),
        };

        // MultichannelCheck: only meaningful when the directory is present.
        if content_dir.exists() && self.ports.transcoder.is_multichannel(&content_dir).await {
            info!("Multichannel release is unsupported, skipping");
            return Ok(Verdict::Terminal(Reason::Multichannel));
        }

        // InteractiveDirectoryRecovery
        let mut attempts = 0;
        while !content_dir.exists() {
            if self.ctx.skip_missing || attempts >= MAX_RECOVERY_ATTEMPTS {
                info!("Content directory {} not found, skipping", content_dir.display());
                return Ok(Verdict::Terminal(Reason::Missing));
            }
            attempts += 1;
            match self.ports.confirmer.alternate_path(&content_dir).await {
                Some(alternate) => content_dir = alternate,
                None => {
                    info!("No alternate path for {}, skipping", content_dir.display());
                    return Ok(Verdict::Terminal(Reason::Missing));
                }
            }
        }

        // FormatGapCheck
        let needed = formats_needed(&group, &torrent, &self.ctx.targets);
        if needed.is_empty() {
            info!(" -> No formats needed, skipping");
            return Ok(Verdict::Terminal(Reason::Formats));
        }
        info!(
            " -> Formats needed: {}",
            needed
                .iter()
                .map(|f| f.token())
                .collect::<Vec<_>>()
                .join(", ")
        );

        // TagCheck: bad tags would get the upload reported. Track-number
        // formatting is excluded since it can be repaired when tags are
        // copied to the transcode.
        let flacs = locate_flacs(&content_dir);
        for flac in &flacs {
            if let TagVerdict::Bad(message) = self.ports.tags.check(flac, false).await {
                warn!(
                    "Unacceptable tags in {}: {message}, skipping",
                    flac.display()
                );
                return Ok(Verdict::Terminal(Reason::BrokenTags));
            }
        }

        // SpectrogramGate
        if !self.ctx.skip_spectral && !self.review_spectrograms(&content_dir, &flacs).await {
            return Ok(Verdict::Terminal(Reason::Spectrograms));
        }

        // HashCheck
        if !self.ctx.skip_hashcheck {
            let passed = self.run_hashcheck(candidate.torrent_id, &content_dir).await?;
            if !passed {
                info!("Hashcheck failed, skipping");
                return Ok(Verdict::Terminal(Reason::Hashcheck));
            }
            info!("Hashcheck passed");
        }

        // TranscodeLoop
        for format in needed {
            if !content_dir.exists() {
                warn!("Content directory vanished mid-run, stopping format loop");
                break;
            }
            match self.add_format(&group, &torrent, &artist, &content_dir, format).await {
                FormatOutcome::Confirmed if self.ctx.single_format => break,
                FormatOutcome::Confirmed | FormatOutcome::Passed => {}
                FormatOutcome::Abort24Bit => {
                    return Ok(Verdict::Terminal(Reason::TwentyFourBit));
                }
            }
        }

        Ok(Verdict::Terminal(Reason::Done))
    }

    /// Determines the content directory. Single-file uploads get the file
    /// copied into a synthesized directory first. `None` means missing.
    fn locate_content(&self, group: &ReleaseGroup, torrent: &GroupTorrent) -> Option<PathBuf> {
        if !torrent.file_path.is_empty() {
            return Some(self.ctx.content_dir.join(unescape(&torrent.file_path)));
        }

        let file_name = single_file_name(&torrent.file_list)?;
        let source = self.ctx.content_dir.join(&file_name);
        if !source.exists() {
            info!("Path not found, skipping: {}", source.display());
            return None;
        }

        let synthesized = self.ctx.content_dir.join(format!(
            "{} ({}) [FLAC]",
            unescape(&group.group.name),
            group.group.year
        ));
        let copy = || -> std::io::Result<()> {
            std::fs::create_dir_all(&synthesized)?;
            std::fs::copy(&source, synthesized.join(&file_name))?;
            Ok(())
        };
        match copy() {
            Ok(()) => Some(synthesized),
            Err(e) => {
                warn!(
                    "Failed to stage single-file upload into {}: {e}",
                    synthesized.display()
                );
                None
            }
        }
    }

    /// Renders spectrograms into the staging directory and asks the
    /// operator to judge them. The staging directory must be provably
    /// fresh and is removed on every exit path.
    async fn review_spectrograms(&self, content_dir: &Path, flacs: &[PathBuf]) -> bool {
        let staging = &self.ctx.spectral_dir;
        let occupied = std::fs::read_dir(staging)
            .map(|mut entries| entries.next().is_some())
            .unwrap_or(false);
        if occupied {
            warn!(
                "Spectrogram staging dir {} is not empty, refusing to reuse it",
                staging.display()
            );
            return false;
        }

        let staging = match ScopedDir::create(staging.clone()) {
            Ok(staging) => staging,
            Err(e) => {
                warn!("Failed to create spectrogram staging dir: {e}");
                return false;
            }
        };

        info!("Generating spectrograms for {} files", flacs.len());
        let renderer = Arc::clone(&self.ports.renderer);
        let root = content_dir.to_path_buf();
        let out = staging.path().to_path_buf();
        let report = self
            .dispatcher
            .map_all(flacs.to_vec(), move |flac| {
                let renderer = Arc::clone(&renderer);
                let root = root.clone();
                let out = out.clone();
                async move { renderer.render(&flac, &root, &out).await }
            })
            .await;
        if !report.all_ok() {
            warn!("{} of {} spectrograms failed to render", report.failed, flacs.len());
            return false;
        }

        let prompt = format!(
            "Spectrograms written to {}. Are they acceptable?",
            staging.path().display()
        );
        let accepted = self.ports.confirmer.confirm(&prompt).await;
        if !accepted {
            info!("Spectrograms rejected, skipping");
        }
        accepted
    }

    /// Fetches the authoritative torrent file and verifies the content
    /// directory against it. The temp file is removed on every path.
    async fn run_hashcheck(
        &self,
        torrent_id: u64,
        content_dir: &Path,
    ) -> Result<bool, TrackerError> {
        info!("Running hashcheck");
        let bytes = match self.tracker.download_torrent(torrent_id).await? {
            Some(bytes) => bytes,
            None => {
                warn!("Could not download torrent {torrent_id} for hashcheck");
                return Ok(false);
            }
        };

        let temp_path = std::env::temp_dir().join(format!("gapfiller-{}.torrent", Uuid::new_v4()));
        if let Err(e) = std::fs::write(&temp_path, &bytes) {
            warn!("Failed to write torrent temp file: {e}");
            return Ok(false);
        }
        let temp = ScopedFile::new(temp_path);
        Ok(self.ports.verifier.verify(temp.path(), content_dir).await)
    }

    /// One iteration of the transcode loop. All tool faults are converted
    /// into `Passed` so sibling formats keep going.
    async fn add_format(
        &self,
        group: &ReleaseGroup,
        torrent: &GroupTorrent,
        artist: &str,
        content_dir: &Path,
        format: TargetFormat,
    ) -> FormatOutcome {
        info!("Adding format {format}...");

        let work = match ScopedDir::create(
            std::env::temp_dir().join(format!("gapfiller-{}", Uuid::new_v4())),
        ) {
            Ok(work) => work,
            Err(e) => {
                error!("Failed to create work dir for {format}: {e}");
                return FormatOutcome::Passed;
            }
        };

        let basename = release_basename(group, torrent, artist, format);
        let produced = match self
            .ports
            .transcoder
            .transcode_release(content_dir, &self.ctx.output_dir, &basename, format)
            .await
        {
            Ok(TranscodeOutcome::Done(dir)) => dir,
            Ok(TranscodeOutcome::Mislabeled24Bit) => {
                warn!("Some file(s) in this release were incorrectly marked as 24bit, skipping");
                return FormatOutcome::Abort24Bit;
            }
            Err(e) => {
                error!("Error adding format {format}: {e}");
                return FormatOutcome::Passed;
            }
        };

        let torrent_file = match self
            .ports
            .packager
            .package(
                &produced,
                work.path(),
                &self.tracker.announce_url(),
                self.ctx.piece_length,
            )
            .await
        {
            Ok(path) => path,
            Err(e) => {
                error!("Error packaging {format}: {e}");
                return FormatOutcome::Passed;
            }
        };

        let publish = || -> std::io::Result<PathBuf> {
            std::fs::create_dir_all(&self.ctx.torrent_dir)?;
            let dest = self
                .ctx
                .torrent_dir
                .join(torrent_file.file_name().unwrap_or_default());
            std::fs::copy(&torrent_file, &dest)?;
            Ok(dest)
        };
        match publish() {
            Ok(dest) => info!("Torrent file copied to {}", dest.display()),
            Err(e) => {
                error!("Failed to copy torrent file for {format}: {e}");
                return FormatOutcome::Passed;
            }
        }

        self.present_result(group, torrent, content_dir, &produced, format);

        if self
            .ports
            .confirmer
            .confirm("Done! Did you upload it?")
            .await
        {
            FormatOutcome::Confirmed
        } else {
            info!("Removing transcode output {}", produced.display());
            if let Err(e) = std::fs::remove_dir_all(&produced) {
                warn!("Failed to remove {}: {e}", produced.display());
            }
            FormatOutcome::Passed
        }
    }

    /// Everything the operator needs for the manual upload.
    fn present_result(
        &self,
        group: &ReleaseGroup,
        torrent: &GroupTorrent,
        content_dir: &Path,
        produced: &Path,
        format: TargetFormat,
    ) {
        let permalink = self.tracker.permalink(torrent.id);
        info!("Torrent ready for manual upload!");
        info!("Flac directory: {}", content_dir.display());
        info!("Transcode directory: {}", produced.display());
        for file in locate_files_for_display(produced) {
            info!("  {}", file.display());
        }
        info!("FLAC URL: {permalink}");
        info!(
            "Edition: {} - {}",
            group.edition_year(torrent),
            unescape(&torrent.remaster_record_label)
        );
        info!("Format: {format}");
        info!(
            "Description:\n{}",
            upload_description(&permalink, &self.ports.transcoder.process_summary(format))
        );
    }
}

/// Directory name for a produced transcode.
fn release_basename(
    group: &ReleaseGroup,
    torrent: &GroupTorrent,
    artist: &str,
    format: TargetFormat,
) -> String {
    let album = unescape(&group.group.name);
    let year = group.edition_year(torrent);
    if torrent.remaster_title.is_empty() {
        format!("{artist} - {album} [{year}] ({} - {format})", torrent.media)
    } else {
        format!(
            "{artist} - {album} ({}) [{year}] ({} - {format})",
            unescape(&torrent.remaster_title),
            torrent.media
        )
    }
}

/// BBCode description documenting the transcode provenance.
fn upload_description(permalink: &str, process_summary: &str) -> String {
    format!(
        "Transcode of [url={permalink}]{permalink}[/url]\n\n\
         Transcode process:\n[code]{process_summary}[/code]"
    )
}

fn locate_files_for_display(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect();
    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::{GroupInfo, MusicInfo};

    fn sample_group(remaster_title: &str) -> (ReleaseGroup, GroupTorrent) {
        let torrent = GroupTorrent {
            id: 42,
            format: "FLAC".to_string(),
            encoding: "Lossless".to_string(),
            media: "CD".to_string(),
            remaster_year: 2001,
            remaster_title: remaster_title.to_string(),
            remaster_record_label: "Label".to_string(),
            remaster_catalogue_number: String::new(),
            reported: false,
            file_path: String::new(),
            file_list: String::new(),
        };
        let group = ReleaseGroup {
            group: GroupInfo {
                id: 7,
                name: "Album &amp; More".to_string(),
                year: 1999,
                music_info: MusicInfo { artists: vec![] },
            },
            torrents: vec![torrent.clone()],
        };
        (group, torrent)
    }

    #[test]
    fn test_release_basename_plain() {
        let (group, torrent) = sample_group("");
        assert_eq!(
            release_basename(&group, &torrent, "Artist", TargetFormat::V0),
            "Artist - Album & More [2001] (CD - V0)"
        );
    }

    #[test]
    fn test_release_basename_with_remaster_title() {
        let (group, torrent) = sample_group("Deluxe");
        assert_eq!(
            release_basename(&group, &torrent, "Artist", TargetFormat::Cbr320),
            "Artist - Album & More (Deluxe) [2001] (CD - 320)"
        );
    }

    #[test]
    fn test_upload_description_contains_permalink_and_process() {
        let description = upload_description("https://x/torrents.php?torrentid=1", "sox | lame");
        assert!(description.contains("[url=https://x/torrents.php?torrentid=1]"));
        assert!(description.contains("[code]sox | lame[/code]"));
    }
}
