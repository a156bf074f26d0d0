//! URL in, tagged MP3 out.
//!
//! Stages run strictly in order: classify, resolve, match, download,
//! transcode, cover art, tags, rename, session. The first failing stage
//! aborts the request with one `AcquireError`; cover art and tag writing are
//! best effort. Metadata already recorded in the session stays there.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use thiserror::Error;

use crate::classify::{classify, spotify_url, ClassifyError, Classified, ContentKind, Platform};
use crate::config::{AppConfig, TranscoderKind};
use crate::http::{HttpFetcher, UreqFetcher, DEFAULT_USER_AGENT};
use crate::matcher::{CandidateMatcher, MatchError, ProviderError, VideoProvider};
use crate::resolver::{default_chain, ExtractionError, MetadataClient, MetadataResolver, SpotdlClient};
use crate::session::{SessionError, SessionStore};
use crate::tagging::{LoftyTagWriter, TagFields, TagWriter};
use crate::track::{is_confident, Track, UNKNOWN_ARTIST};
use crate::transcode::{mp3_path, FfmpegTranscoder, RenameTranscoder, TranscodeError, Transcoder};
use crate::ytdlp::YtDlp;

/// Longest file stem produced by `sanitize_filename`.
pub const MAX_FILENAME_CHARS: usize = 50;

const FORBIDDEN_FILENAME_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

#[derive(Error, Debug)]
pub enum AcquireError {
    #[error("Invalid input: {0}")]
    Classify(#[from] ClassifyError),
    #[error("{kind} URLs are handled as batches, use run()")]
    Unsupported { kind: ContentKind },
    #[error("Could not list tracks of {url}: {source}")]
    Enumerate { url: String, source: ExtractionError },
    #[error("{0}")]
    NoCandidate(#[from] MatchError),
    #[error("Download failed: {0}")]
    Download(#[source] ProviderError),
    #[error("Transcode failed: {0}")]
    Transcode(#[from] TranscodeError),
    #[error("Rename to {path} failed: {source}")]
    Rename { path: PathBuf, source: std::io::Error },
    #[error("Session store: {0}")]
    Session(#[from] SessionError),
}

/// Outcome of an album or playlist session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub saved: Vec<PathBuf>,
    pub failed: usize,
}

/// What `run` produced.
#[derive(Debug)]
pub enum RunOutcome {
    Single(PathBuf),
    Batch(BatchReport),
}

/// External collaborators the pipeline drives.
pub struct Collaborators {
    pub client: Arc<dyn MetadataClient>,
    pub fetcher: Arc<dyn HttpFetcher>,
    pub provider: Arc<dyn VideoProvider>,
    pub transcoder: Box<dyn Transcoder>,
    pub tagger: Box<dyn TagWriter>,
}

impl Collaborators {
    /// Real tools as named in the config.
    pub fn from_config(config: &AppConfig) -> Self {
        let t = &config.timeouts;
        let user_agent = config.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT);
        let transcoder: Box<dyn Transcoder> = match config.transcoder {
            TranscoderKind::Ffmpeg => Box::new(FfmpegTranscoder::new(&config.tools.ffmpeg, t.transcode())),
            TranscoderKind::Rename => Box::new(RenameTranscoder),
        };
        Self {
            client: Arc::new(SpotdlClient::new(&config.tools.spotdl, t.client())),
            fetcher: Arc::new(UreqFetcher::new(user_agent)),
            provider: Arc::new(YtDlp::new(&config.tools.ytdlp, t.video_search(), t.download())),
            transcoder,
            tagger: Box::new(LoftyTagWriter),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub output_dir: PathBuf,
    pub bitrate_kbps: u32,
    pub search_results: usize,
    pub cover_timeout: Duration,
    pub show_progress: bool,
}

impl PipelineSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            output_dir: config.resolve_output_dir(),
            bitrate_kbps: config.bitrate_kbps,
            search_results: config.search_results,
            cover_timeout: config.timeouts.cover(),
            show_progress: true,
        }
    }
}

pub struct AcquisitionPipeline {
    resolver: MetadataResolver,
    matcher: CandidateMatcher,
    client: Arc<dyn MetadataClient>,
    fetcher: Arc<dyn HttpFetcher>,
    provider: Arc<dyn VideoProvider>,
    transcoder: Box<dyn Transcoder>,
    tagger: Box<dyn TagWriter>,
    session: Arc<SessionStore>,
    settings: PipelineSettings,
}

impl AcquisitionPipeline {
    /// Wire the pipeline with the standard resolver chain.
    pub fn new(
        parts: Collaborators,
        session: Arc<SessionStore>,
        settings: PipelineSettings,
        config: &AppConfig,
    ) -> Self {
        let chain = default_chain(parts.client.clone(), parts.fetcher.clone(), &config.timeouts);
        let resolver = MetadataResolver::new(chain).with_session(session.clone());
        Self::with_resolver(resolver, parts, session, settings)
    }

    /// Wire the pipeline around an already built resolver.
    pub fn with_resolver(
        resolver: MetadataResolver,
        parts: Collaborators,
        session: Arc<SessionStore>,
        settings: PipelineSettings,
    ) -> Self {
        let matcher = CandidateMatcher::new(parts.provider.clone()).with_max_results(settings.search_results);
        Self {
            resolver,
            matcher,
            client: parts.client,
            fetcher: parts.fetcher,
            provider: parts.provider,
            transcoder: parts.transcoder,
            tagger: parts.tagger,
            session,
            settings,
        }
    }

    /// Start a session of the right kind, acquire, always end the session.
    pub fn run(&self, url: &str) -> Result<RunOutcome, AcquireError> {
        let classified = classify(url)?;
        let batch = classified.kind.is_collection();
        self.session.start_session(batch)?;

        let outcome = if batch {
            self.acquire_collection(url, &classified).map(RunOutcome::Batch)
        } else {
            self.acquire_classified(url, &classified).map(RunOutcome::Single)
        };

        if let Err(e) = self.session.end_session() {
            log::warn!("Could not close session: {e}");
        }
        outcome
    }

    /// Acquire a single Spotify track or YouTube video into the current
    /// session and return the final MP3 path.
    pub fn acquire(&self, url: &str) -> Result<PathBuf, AcquireError> {
        let classified = classify(url)?;
        self.acquire_classified(url, &classified)
    }

    fn acquire_classified(&self, url: &str, classified: &Classified) -> Result<PathBuf, AcquireError> {
        match (classified.platform, classified.kind) {
            (Platform::YouTube, _) => self.acquire_video(url, &classified.id),
            (Platform::Spotify, ContentKind::Track) => {
                let (track, recorded) = self.resolver.resolve_recorded(&classified.id, url);
                self.record(&track, recorded)?;
                self.acquire_track(&track, Some(&classified.id))
            }
            (Platform::Spotify, kind) => Err(AcquireError::Unsupported { kind }),
        }
    }

    /// Every song of an album or playlist, one after another. A failing
    /// song is counted and skipped.
    pub fn acquire_collection(&self, url: &str, classified: &Classified) -> Result<BatchReport, AcquireError> {
        let songs = self.client.search(url).map_err(|source| AcquireError::Enumerate {
            url: url.to_string(),
            source,
        })?;
        log::info!("{} {} has {} track(s)", classified.kind, classified.id, songs.len());

        let pb = self.progress_bar(songs.len() as u64);
        let mut report = BatchReport::default();

        for song in songs {
            let song_url = song
                .url
                .clone()
                .or_else(|| song.song_id.as_deref().map(|id| spotify_url(ContentKind::Track, id)))
                .unwrap_or_else(|| url.to_string());
            let listed = song.into_track(&song_url);
            let (track, recorded) = if !is_confident(&listed) && !listed.source_id.is_empty() {
                // The listing was too thin; run the full chain for this id.
                self.resolver.resolve_recorded(&listed.source_id, &song_url)
            } else {
                (listed, false)
            };
            pb.set_message(track.title.clone());

            let result = self.record(&track, recorded).and_then(|_| {
                let fallback = (!track.source_id.is_empty()).then_some(track.source_id.as_str());
                self.acquire_track(&track, fallback)
            });
            match result {
                Ok(path) => report.saved.push(path),
                Err(e) => {
                    log::warn!("Skipping {} - {}: {e}", track.artist_line(), track.title);
                    report.failed += 1;
                }
            }
            pb.inc(1);
        }

        pb.finish_and_clear();
        log::info!("Batch finished: {} saved, {} failed", report.saved.len(), report.failed);
        Ok(report)
    }

    /// Append `track` unless the resolver already mirrored it. Every batch
    /// item gets its own entry, repeats included.
    fn record(&self, track: &Track, recorded: bool) -> Result<(), AcquireError> {
        if !recorded {
            self.session.append_track(track.clone())?;
        }
        Ok(())
    }

    fn acquire_track(&self, track: &Track, fallback_id: Option<&str>) -> Result<PathBuf, AcquireError> {
        let candidate = self
            .matcher
            .find_best_audio_source(&track.title, track.primary_artist(), fallback_id)?;
        self.produce(&candidate.url, track, "Source: Spotify")
    }

    fn acquire_video(&self, url: &str, id: &str) -> Result<PathBuf, AcquireError> {
        let info = self.provider.info(url).map_err(AcquireError::Download)?;
        let uploader = if info.uploader.trim().is_empty() {
            UNKNOWN_ARTIST
        } else {
            info.uploader.trim()
        };
        let mut track = Track::basic(info.title.trim(), uploader, id, url);
        if let Some(d) = info.duration_seconds {
            track.duration_seconds = d;
        }
        track.cover_art_url = info.thumbnail_url.clone();
        track.album = String::from("YouTube");

        self.record(&track, false)?;
        self.produce(&info.url, &track, "Source: YouTube")
    }

    /// Download, transcode, tag, rename, attach. Intermediate files are
    /// removed on every exit path.
    fn produce(&self, media_url: &str, track: &Track, comment: &str) -> Result<PathBuf, AcquireError> {
        let mut temp = TempFiles::default();

        std::fs::create_dir_all(&self.settings.output_dir)
            .map_err(|e| AcquireError::Download(ProviderError::Io(e)))?;
        let raw = self
            .provider
            .download(media_url, &self.settings.output_dir)
            .map_err(AcquireError::Download)?;
        temp.track(&raw);

        let mp3 = if has_mp3_extension(&raw) {
            raw
        } else {
            temp.track(&mp3_path(&raw));
            let out = self.transcoder.transcode(&raw, self.settings.bitrate_kbps)?;
            temp.track(&out);
            out
        };

        let cover = track.cover_art_url.as_deref().and_then(|u| self.fetch_cover(u));
        let fields = TagFields::from_track(track, cover, comment);
        if let Err(e) = self.tagger.write_tags(&mp3, &fields) {
            log::warn!("Tagging {} failed, keeping untagged file: {e}", mp3.display());
        }

        let target = mp3.with_file_name(output_file_name(track));
        if target != mp3 {
            std::fs::rename(&mp3, &target).map_err(|source| AcquireError::Rename {
                path: target.clone(),
                source,
            })?;
        }
        temp.release(&target);
        temp.release(&mp3);

        self.session.attach_local_path(&track.source_id, &target)?;
        log::info!("Saved {}", target.display());
        Ok(target)
    }

    /// Cover art bytes, or `None` on any failure.
    fn fetch_cover(&self, url: &str) -> Option<Vec<u8>> {
        match self.fetcher.get(url, self.settings.cover_timeout) {
            Ok(r) if r.is_success() && !r.body.is_empty() => Some(r.body),
            Ok(r) => {
                log::debug!("Cover art {url} returned HTTP {}", r.status);
                None
            }
            Err(e) => {
                log::debug!("Cover art {url} unavailable: {e}");
                None
            }
        }
    }

    fn progress_bar(&self, len: u64) -> ProgressBar {
        if !self.settings.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len);
        pb.set_style(
            ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        pb
    }
}

fn has_mp3_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("mp3"))
}

/// `"<primary artist> - <title>.mp3"`, each part sanitized on its own so a
/// long artist cannot crowd out the title.
pub fn output_file_name(track: &Track) -> String {
    format!(
        "{} - {}.mp3",
        sanitize_filename(track.primary_artist()),
        sanitize_filename(&track.title)
    )
}

/// Strip characters that are invalid in file names and cap the length.
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name.chars().filter(|c| !FORBIDDEN_FILENAME_CHARS.contains(c)).collect();
    let truncated: String = cleaned.trim().chars().take(MAX_FILENAME_CHARS).collect();
    truncated.trim_end().to_string()
}

/// Files removed on drop unless released.
#[derive(Default)]
struct TempFiles {
    paths: Vec<PathBuf>,
}

impl TempFiles {
    fn track(&mut self, path: &Path) {
        self.paths.push(path.to_path_buf());
    }

    fn release(&mut self, path: &Path) {
        self.paths.retain(|p| p != path);
    }
}

impl Drop for TempFiles {
    fn drop(&mut self) {
        for path in &self.paths {
            if path.exists() {
                match std::fs::remove_file(path) {
                    Ok(()) => log::debug!("Removed {}", path.display()),
                    Err(e) => log::warn!("Could not remove {}: {e}", path.display()),
                }
            }
        }
    }
}
