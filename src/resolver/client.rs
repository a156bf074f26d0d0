use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Deserialize;

use super::{grade, ExtractionError, MetadataStrategy};
use crate::process::run_with_timeout;
use crate::track::{Confidence, ResolutionAttempt, Track, DEFAULT_DURATION_SECS, UNKNOWN_ALBUM, UNKNOWN_ARTIST};

/// One song as reported by the structured metadata client.
///
/// Field names follow spotdl's `.spotdl` save format; everything is optional
/// because the client omits what Spotify did not return.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawSong {
    pub name: Option<String>,
    pub artists: Vec<String>,
    pub album_name: Option<String>,
    pub cover_url: Option<String>,
    pub duration: Option<f64>,
    pub genres: Vec<String>,
    pub isrc: Option<String>,
    pub date: Option<String>,
    pub song_id: Option<String>,
    pub url: Option<String>,
}

impl RawSong {
    /// Normalize into a `Track`. Missing artists become the placeholder
    /// artist so the confidence predicate can reject the result.
    pub fn into_track(self, source_url: &str) -> Track {
        let artists: Vec<String> = self
            .artists
            .into_iter()
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .collect();
        let genres: Vec<String> = self.genres.into_iter().filter(|g| !g.trim().is_empty()).collect();

        Track {
            title: self.name.map(|n| n.trim().to_string()).unwrap_or_default(),
            artists: if artists.is_empty() {
                vec![UNKNOWN_ARTIST.to_string()]
            } else {
                artists
            },
            album: self
                .album_name
                .filter(|a| !a.trim().is_empty())
                .unwrap_or_else(|| UNKNOWN_ALBUM.to_string()),
            duration_seconds: self
                .duration
                .filter(|d| *d > 0.0)
                .map(|d| d.round() as u32)
                .unwrap_or(DEFAULT_DURATION_SECS),
            genre: (!genres.is_empty()).then(|| genres.join(", ")),
            release_date: self.date.filter(|d| !d.is_empty()),
            isrc: self.isrc.filter(|i| !i.is_empty()),
            cover_art_url: self.cover_url.filter(|c| !c.is_empty()),
            source_id: self.song_id.unwrap_or_default(),
            source_url: self.url.unwrap_or_else(|| source_url.to_string()),
        }
    }
}

/// Structured metadata source. For a track URL returns one song, for an
/// album or playlist URL every song in order.
pub trait MetadataClient: Send + Sync {
    fn search(&self, url: &str) -> Result<Vec<RawSong>, ExtractionError>;
}

/// `spotdl save <url> --save-file <tmp>.spotdl`, then read the saved list.
pub struct SpotdlClient {
    program: String,
    timeout: Duration,
}

impl SpotdlClient {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    fn save_file() -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.subsec_nanos())
            .unwrap_or(0);
        std::env::temp_dir().join(format!("tunegrab-{}-{nanos}.spotdl", std::process::id()))
    }
}

impl MetadataClient for SpotdlClient {
    fn search(&self, url: &str) -> Result<Vec<RawSong>, ExtractionError> {
        let save_file = Self::save_file();
        let mut cmd = Command::new(&self.program);
        cmd.arg("save").arg(url).arg("--save-file").arg(&save_file);

        let result = run_with_timeout(cmd, self.timeout)
            .map_err(ExtractionError::from)
            .and_then(|_| Ok(std::fs::read_to_string(&save_file)?))
            .and_then(|text| Ok(serde_json::from_str::<Vec<RawSong>>(&text)?));

        if save_file.exists() {
            if let Err(e) = std::fs::remove_file(&save_file) {
                log::debug!("Could not remove {}: {e}", save_file.display());
            }
        }
        result
    }
}

/// Authoritative strategy backed by a `MetadataClient`.
pub struct ClientStrategy {
    client: Arc<dyn MetadataClient>,
}

impl ClientStrategy {
    pub fn new(client: Arc<dyn MetadataClient>) -> Self {
        Self { client }
    }

    fn extract(&self, id: &str, source_url: &str) -> Result<Track, ExtractionError> {
        let song = self
            .client
            .search(source_url)?
            .into_iter()
            .next()
            .ok_or(ExtractionError::NotFound)?;
        let mut track = song.into_track(source_url);
        track.source_id = id.to_string();
        Ok(track)
    }
}

impl MetadataStrategy for ClientStrategy {
    fn name(&self) -> &'static str {
        "client"
    }

    fn attempt(&self, id: &str, source_url: &str) -> ResolutionAttempt {
        grade(self.name(), id, Confidence::High, self.extract(id, source_url))
    }
}
