use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use super::{grade, ExtractionError, MetadataStrategy};
use crate::http::{with_query, HttpFetcher};
use crate::track::{Confidence, ResolutionAttempt, Track, UNKNOWN_ARTIST};

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchHit {
    track_name: Option<String>,
    artist_name: Option<String>,
    collection_name: Option<String>,
    track_time_millis: Option<u64>,
    artwork_url100: Option<String>,
    primary_genre_name: Option<String>,
    release_date: Option<String>,
}

/// Last-resort lookup against the public iTunes search API.
pub struct ItunesStrategy {
    fetcher: Arc<dyn HttpFetcher>,
    timeout: Duration,
}

impl ItunesStrategy {
    pub fn new(fetcher: Arc<dyn HttpFetcher>, timeout: Duration) -> Self {
        Self { fetcher, timeout }
    }

    pub fn endpoint(id: &str) -> String {
        with_query(
            "https://itunes.apple.com/search",
            &[("term", id), ("media", "music"), ("entity", "song"), ("limit", "1")],
        )
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

        let payload: SearchResponse = serde_json::from_slice(&response.body)?;
        let hit = payload.results.into_iter().next().ok_or(ExtractionError::NotFound)?;
        let title = hit.track_name.filter(|t| !t.trim().is_empty()).ok_or(ExtractionError::NotFound)?;
        let artist = hit.artist_name.unwrap_or_else(|| UNKNOWN_ARTIST.to_string());

        let mut track = Track::basic(title.trim(), artist.trim(), id, source_url);
        if let Some(album) = hit.collection_name.filter(|a| !a.is_empty()) {
            track.album = album;
        }
        if let Some(ms) = hit.track_time_millis.filter(|ms| *ms > 0) {
            track.duration_seconds = (ms / 1000) as u32;
        }
        track.cover_art_url = hit.artwork_url100.map(|u| u.replace("100x100", "600x600"));
        track.genre = hit.primary_genre_name;
        track.release_date = hit.release_date;
        Ok(track)
    }
}

impl MetadataStrategy for ItunesStrategy {
    fn name(&self) -> &'static str {
        "itunes"
    }

    fn attempt(&self, id: &str, source_url: &str) -> ResolutionAttempt {
        grade(self.name(), id, Confidence::Low, self.extract(id, source_url))
    }
}
