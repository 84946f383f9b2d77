use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gapfiller_core::tools::{
    CommandHashVerifier, ConsoleConfirmer, MetaflacTagValidator, MktorrentPackager,
    SoxLameTranscoder, SoxSpectrogramRenderer,
};
use gapfiller_core::tracker::Candidate;
use gapfiller_core::{
    load_config, ConfigError, Dispatcher, GazelleClient, OutcomeCache, Pipeline, PipelineContext,
    Ports, RetrySet, Verdict,
};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Transcodes snatched lossless releases into the formats their edition
/// is missing, one candidate at a time.
#[derive(Parser, Debug)]
#[command(name = "gapfiller", version, about)]
struct Args {
    /// Release permalinks to process instead of the snatched listing.
    release_urls: Vec<String>,

    /// Stop each candidate after the first confirmed upload.
    #[arg(short, long)]
    single: bool,

    /// Worker count for per-file fan-out. Defaults to all cores but one.
    #[arg(short = 'j', long)]
    threads: Option<usize>,

    /// Configuration file path.
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Outcome cache path.
    #[arg(long, default_value = "cache.json")]
    cache: PathBuf,

    /// Snatched listing page size.
    #[arg(short = 'p', long, default_value_t = 2000)]
    page_size: u64,

    /// Never prompt for alternate paths; record missing content directly.
    #[arg(long)]
    skip_missing: bool,

    /// Skip the spectrogram review gate.
    #[arg(long)]
    skip_spectral: bool,

    /// Skip source verification against the tracker's torrent file.
    #[arg(long)]
    skip_hashcheck: bool,

    /// Cached outcomes to reprocess, e.g. "hashcheck,spectrograms".
    #[arg(short = 'r', long, value_delimiter = ',')]
    retry: Vec<String>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    if let Err(e) = run(args).await {
        if let Some(first_run @ ConfigError::FirstRun(_)) = e.downcast_ref::<ConfigError>() {
            eprintln!("{first_run}");
            std::process::exit(2);
        }
        error!("Fatal error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    info!("gapfiller {VERSION}");

    let config = load_config(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    let threads = args.threads.unwrap_or_else(default_threads);
    let mut ctx = PipelineContext::from_config(&config, threads)?;
    ctx.skip_missing = args.skip_missing;
    ctx.skip_spectral = args.skip_spectral;
    ctx.skip_hashcheck = args.skip_hashcheck;
    ctx.single_format = args.single;
    ctx.retry = RetrySet::from_tokens(&args.retry);
    if !args.release_urls.is_empty() {
        info!("Release URLs supplied, ignoring the configured media types");
        ctx.accepted_media.clear();
    }

    let client = Arc::new(
        GazelleClient::login(config.tracker.clone())
            .await
            .context("Could not log in to the tracker")?,
    );

    let mut cache = OutcomeCache::load(&args.cache);
    info!("Outcome cache holds {} entries", cache.len());

    let ports = Ports {
        confirmer: Arc::new(ConsoleConfirmer),
        tags: Arc::new(MetaflacTagValidator),
        renderer: Arc::new(SoxSpectrogramRenderer),
        verifier: Arc::new(CommandHashVerifier::new()),
        transcoder: Arc::new(SoxLameTranscoder::new(Dispatcher::new(threads))),
        packager: Arc::new(MktorrentPackager),
    };
    let pipeline = Pipeline::new(ctx, client.clone(), ports);

    let mut processed = 0u64;
    if args.release_urls.is_empty() {
        let mut pages = client.snatched(args.page_size);
        while let Some(candidate) = pages.next().await? {
            handle(&pipeline, &mut cache, candidate).await;
            processed += 1;
        }
    } else {
        for url in &args.release_urls {
            match candidate_from_url(url) {
                Some(candidate) => {
                    handle(&pipeline, &mut cache, candidate).await;
                    processed += 1;
                }
                None => warn!("Not a release permalink, skipping: {url}"),
            }
        }
    }

    info!(
        "Processed {processed} candidates; cache now holds {} entries",
        cache.len()
    );
    Ok(())
}

/// One candidate, fully isolated: a hard tracker fault is logged and the
/// run moves on, leaving the candidate uncached for the next run.
async fn handle(pipeline: &Pipeline, cache: &mut OutcomeCache, candidate: Candidate) {
    match pipeline.process(cache, candidate).await {
        Ok(Verdict::Terminal(reason)) => cache.record(candidate.torrent_id, reason),
        Ok(_) => {}
        Err(e) => error!("Failed to process torrent {}: {e}", candidate.torrent_id),
    }
}

fn default_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().saturating_sub(1))
        .unwrap_or(1)
        .max(1)
}

/// Parses a `torrents.php?id=GROUP&torrentid=TORRENT` permalink.
fn candidate_from_url(url: &str) -> Option<Candidate> {
    let (_, query) = url.split_once('?')?;
    let query = query.split('#').next().unwrap_or(query);

    let mut group_id = None;
    let mut torrent_id = None;
    for pair in query.split('&') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        match key {
            "id" => group_id = value.parse().ok(),
            "torrentid" => torrent_id = value.parse().ok(),
            _ => {}
        }
    }
    Some(Candidate {
        group_id: group_id?,
        torrent_id: torrent_id?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_permalink() {
        let candidate =
            candidate_from_url("https://redacted.ch/torrents.php?id=7&torrentid=42").unwrap();
        assert_eq!(candidate.group_id, 7);
        assert_eq!(candidate.torrent_id, 42);
    }

    #[test]
    fn test_parse_permalink_with_fragment_and_extra_params() {
        let candidate = candidate_from_url(
            "https://redacted.ch/torrents.php?page=2&id=7&torrentid=42#torrent42",
        )
        .unwrap();
        assert_eq!(candidate.group_id, 7);
        assert_eq!(candidate.torrent_id, 42);
    }

    #[test]
    fn test_reject_urls_without_both_ids() {
        assert!(candidate_from_url("https://redacted.ch/torrents.php?id=7").is_none());
        assert!(candidate_from_url("https://redacted.ch/torrents.php").is_none());
        assert!(candidate_from_url("not a url").is_none());
    }

    #[test]
    fn test_default_threads_is_at_least_one() {
        assert!(default_threads() >= 1);
    }

    #[test]
    fn test_args_parse_defaults() {
        let args = Args::parse_from(["gapfiller"]);
        assert_eq!(args.page_size, 2000);
        assert_eq!(args.config, PathBuf::from("config.toml"));
        assert!(!args.single);
        assert!(args.retry.is_empty());
    }

    #[test]
    fn test_retry_tokens_split_on_commas() {
        let args = Args::parse_from(["gapfiller", "-r", "hashcheck,spectrograms"]);
        assert_eq!(args.retry, vec!["hashcheck", "spectrograms"]);
    }
}
