use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use super::html::{meta_content, page_title, strip_spotify_suffix};
use super::{grade, ExtractionError, MetadataStrategy};
use crate::http::{with_query, HttpFetcher};
use crate::track::{Confidence, ResolutionAttempt, Track, UNKNOWN_ARTIST};

/// Spotify's public oEmbed payload (partial).
#[derive(Debug, Deserialize)]
struct OembedResponse {
    #[serde(default)]
    title: String,
    thumbnail_url: Option<String>,
}

/// Reads the cross-origin oEmbed representation of a track.
pub struct OembedStrategy {
    fetcher: Arc<dyn HttpFetcher>,
    timeout: Duration,
}

impl OembedStrategy {
    pub fn new(fetcher: Arc<dyn HttpFetcher>, timeout: Duration) -> Self {
        Self { fetcher, timeout }
    }

    pub fn endpoint(id: &str) -> String {
        let track_url = format!("https://open.spotify.com/track/{id}");
        with_query("https://open.spotify.com/oembed", &[("url", track_url.as_str())])
    }

    fn extract(&self, id: &str, source_url: &str) -> Result<Track, ExtractionError> {
        let url = Self::endpoint(id);
        let response = self.fetcher.get(&url, self.timeout)?;
        if !response.is_success() {
            return Err(ExtractionError::Status {
                url,
                status: response.status,
            });
        }

        let body = response.text();
        let (title, thumbnail) = match serde_json::from_str::<OembedResponse>(&body) {
            Ok(payload) if !payload.title.trim().is_empty() => (payload.title, payload.thumbnail_url),
            Ok(_) => return Err(ExtractionError::NotFound),
            Err(e) => {
                // Some edges answer with an HTML page instead of JSON.
                log::debug!("oembed payload for {id} is not JSON ({e}), trying meta tags");
                let title = meta_content(&body, "og:title")
                    .or_else(|| page_title(&body))
                    .ok_or(ExtractionError::NotFound)?;
                (title, meta_content(&body, "og:image"))
            }
        };

        let mut track = split_title(&title, id, source_url);
        track.cover_art_url = thumbnail;
        Ok(track)
    }
}

impl MetadataStrategy for OembedStrategy {
    fn name(&self) -> &'static str {
        "oembed"
    }

    fn attempt(&self, id: &str, source_url: &str) -> ResolutionAttempt {
        grade(self.name(), id, Confidence::Low, self.extract(id, source_url))
    }
}

/// "Song by Artist on Spotify" into a track; without " by " only the title
/// is known.
fn split_title(raw: &str, id: &str, source_url: &str) -> Track {
    let title = strip_spotify_suffix(raw).replace(" on Spotify", "");
    let title = title.trim();
    match title.split_once(" by ") {
        Some((song, artist)) => Track::basic(song.trim(), artist.trim(), id, source_url),
        None => Track::basic(title, UNKNOWN_ARTIST, id, source_url),
    }
}
