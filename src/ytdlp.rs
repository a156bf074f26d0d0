use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, SystemTime};

use serde::Deserialize;
use walkdir::WalkDir;

use crate::matcher::{ProviderError, VideoCandidate, VideoProvider};
use crate::process::run_with_timeout;

/// Extensions yt-dlp may leave behind for `-f bestaudio`.
const AUDIO_EXTENSIONS: &[&str] = &["webm", "m4a", "opus", "ogg", "mp3", "mp4", "aac", "wav"];

/// One `--dump-json` line (search entry or full video info).
#[derive(Debug, Deserialize)]
struct Entry {
    id: Option<String>,
    url: Option<String>,
    webpage_url: Option<String>,
    #[serde(default)]
    title: String,
    duration: Option<f64>,
    uploader: Option<String>,
    channel: Option<String>,
    thumbnail: Option<String>,
    #[serde(default)]
    thumbnails: Vec<Thumbnail>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
}

impl Entry {
    fn into_candidate(self) -> Option<VideoCandidate> {
        let url = self
            .webpage_url
            .or_else(|| self.url.filter(|u| u.starts_with("http")))
            .or_else(|| self.id.as_ref().map(|id| format!("https://www.youtube.com/watch?v={id}")))?;
        Some(VideoCandidate {
            url,
            title: self.title,
            duration_seconds: self.duration.filter(|d| *d > 0.0).map(|d| d.round() as u32),
            uploader: self.uploader.or(self.channel).unwrap_or_default(),
            id: self.id,
            // Search entries list thumbnails smallest first.
            thumbnail_url: self.thumbnail.or_else(|| self.thumbnails.into_iter().last().map(|t| t.url)),
        })
    }
}

/// `VideoProvider` backed by the yt-dlp executable.
pub struct YtDlp {
    program: String,
    search_timeout: Duration,
    download_timeout: Duration,
}

impl YtDlp {
    pub fn new(program: impl Into<String>, search_timeout: Duration, download_timeout: Duration) -> Self {
        Self {
            program: program.into(),
            search_timeout,
            download_timeout,
        }
    }
}

impl VideoProvider for YtDlp {
    fn search(&self, query: &str, max_results: usize) -> Result<Vec<VideoCandidate>, ProviderError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(["--dump-json", "--flat-playlist", "--no-warnings"])
            .arg(format!("ytsearch{max_results}:{query}"));
        let out = run_with_timeout(cmd, self.search_timeout)?;
        parse_search_output(&out.stdout)
    }

    fn download(&self, url: &str, dir: &Path) -> Result<PathBuf, ProviderError> {
        std::fs::create_dir_all(dir)?;
        let started = SystemTime::now();
        let template = dir.join("%(id)s.%(ext)s");

        let mut cmd = Command::new(&self.program);
        cmd.args(["-f", "bestaudio/best", "--no-playlist", "--no-warnings"])
            .arg("-o")
            .arg(&template)
            .args(["--print", "after_move:filepath"])
            .arg(url);
        let out = run_with_timeout(cmd, self.download_timeout)?;

        let printed = out
            .stdout
            .lines()
            .rev()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(PathBuf::from)
            .filter(|p| p.exists());
        match printed {
            Some(path) => Ok(path),
            None => newest_audio_file(dir, started).ok_or_else(|| ProviderError::MissingOutput(dir.to_path_buf())),
        }
    }

    fn info(&self, url: &str) -> Result<VideoCandidate, ProviderError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(["--dump-json", "--skip-download", "--no-playlist", "--no-warnings"])
            .arg(url);
        let out = run_with_timeout(cmd, self.search_timeout)?;
        let entry: Entry = serde_json::from_str(out.stdout.trim())?;
        entry
            .into_candidate()
            .ok_or_else(|| ProviderError::MissingOutput(PathBuf::from(url)))
    }
}

/// One JSON object per line; lines that fail to parse are skipped.
fn parse_search_output(stdout: &str) -> Result<Vec<VideoCandidate>, ProviderError> {
    let mut candidates = Vec::new();
    for line in stdout.lines().map(str::trim).filter(|l| l.starts_with('{')) {
        match serde_json::from_str::<Entry>(line) {
            Ok(entry) => candidates.extend(entry.into_candidate()),
            Err(e) => log::debug!("Skipping unreadable search entry: {e}"),
        }
    }
    Ok(candidates)
}

/// Most recently modified audio file in `dir` written after `since`.
fn newest_audio_file(dir: &Path, since: SystemTime) -> Option<PathBuf> {
    WalkDir::new(dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|x| x.to_str())
                .is_some_and(|x| AUDIO_EXTENSIONS.contains(&x.to_lowercase().as_str()))
        })
        .filter_map(|e| {
            let modified = e.metadata().ok()?.modified().ok()?;
            (modified >= since).then(|| (modified, e.into_path()))
        })
        .max_by_key(|(modified, _)| *modified)
        .map(|(_, path)| path)
}
