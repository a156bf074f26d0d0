use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::process::ProcessError;
use crate::track::UNKNOWN_ARTIST;

/// Candidates requested per query unless configured otherwise.
pub const DEFAULT_MAX_RESULTS: usize = 5;

const UPLOADER_BONUS_WORDS: &[&str] = &["official", "music", "records", "entertainment"];
const ALTERNATE_VERSION_WORDS: &[&str] = &["cover", "remix", "live", "concert", "karaoke", "instrumental"];

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error(transparent)]
    Process(#[from] ProcessError),
    #[error("Unreadable provider output: {0}")]
    Json(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Download produced no file in {0}")]
    MissingOutput(PathBuf),
}

#[derive(Error, Debug)]
pub enum MatchError {
    #[error("No video candidate found after {queries} search queries")]
    NoCandidateFound { queries: usize },
}

/// One search hit from the video provider.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoCandidate {
    pub url: String,
    pub title: String,
    pub duration_seconds: Option<u32>,
    pub uploader: String,
    pub id: Option<String>,
    pub thumbnail_url: Option<String>,
}

/// Search-based video platform that can also fetch the audio stream.
pub trait VideoProvider: Send + Sync {
    fn search(&self, query: &str, max_results: usize) -> Result<Vec<VideoCandidate>, ProviderError>;

    /// Download the best audio stream of `url` into `dir`, returning the file.
    fn download(&self, url: &str, dir: &Path) -> Result<PathBuf, ProviderError>;

    /// Describe a single video without downloading it.
    fn info(&self, url: &str) -> Result<VideoCandidate, ProviderError>;
}

/// Picks the single best audio source for a resolved track.
pub struct CandidateMatcher {
    provider: Arc<dyn VideoProvider>,
    max_results: usize,
}

impl CandidateMatcher {
    pub fn new(provider: Arc<dyn VideoProvider>) -> Self {
        Self {
            provider,
            max_results: DEFAULT_MAX_RESULTS,
        }
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results.max(1);
        self
    }

    /// Search query by query until one returns candidates, then score them.
    pub fn find_best_audio_source(
        &self,
        title: &str,
        artist: &str,
        fallback_id: Option<&str>,
    ) -> Result<VideoCandidate, MatchError> {
        let queries = build_queries(title, artist, fallback_id);

        for query in &queries {
            let candidates = match self.provider.search(query, self.max_results) {
                Ok(c) => c,
                Err(e) => {
                    log::warn!("Search for {query:?} failed: {e}");
                    continue;
                }
            };
            log::debug!("Query {query:?} returned {} candidate(s)", candidates.len());
            if let Some(best) = pick_best(candidates, title, artist) {
                log::info!("Selected {:?} ({})", best.title, best.url);
                return Ok(best);
            }
        }

        Err(MatchError::NoCandidateFound {
            queries: queries.len(),
        })
    }
}

/// True when the metadata is a placeholder that would make a poor query.
fn is_placeholder(title: &str, artist: &str) -> bool {
    let title = title.trim();
    let artist = artist.trim();
    title.is_empty() || title.starts_with("Track ") || artist.is_empty() || artist == UNKNOWN_ARTIST
}

/// Ordered search queries for a track.
pub fn build_queries(title: &str, artist: &str, fallback_id: Option<&str>) -> Vec<String> {
    let title = title.trim();
    let artist = artist.trim();

    if !is_placeholder(title, artist) {
        return vec![
            format!("{artist} - {title}"),
            format!("{title} {artist}"),
            format!("\"{title}\" \"{artist}\""),
        ];
    }

    match fallback_id {
        Some(id) => {
            let bare = if title.is_empty() {
                format!("track {id}")
            } else {
                title.to_string()
            };
            vec![
                format!("spotify {id}"),
                format!("{title} music"),
                format!("{title} song"),
                bare,
            ]
        }
        None => vec![format!("{artist} - {title}")],
    }
}

/// Heuristic relevance of a candidate for `title` by `artist`.
pub fn score(candidate: &VideoCandidate, title: &str, artist: &str) -> i32 {
    let mut score = 0;

    match candidate.duration_seconds {
        Some(d) if (30..=600).contains(&d) => score += 10,
        Some(d) if d > 600 => score -= 5,
        _ => {}
    }

    let video_title = candidate.title.to_lowercase();
    let title = title.trim().to_lowercase();
    let artist = artist.trim().to_lowercase();
    if !title.is_empty() && video_title.contains(&title) {
        score += 15;
    }
    if !artist.is_empty() && video_title.contains(&artist) {
        score += 15;
    }

    let uploader = candidate.uploader.to_lowercase();
    if UPLOADER_BONUS_WORDS.iter().any(|w| uploader.contains(w)) {
        score += 5;
    }

    let penalties = ALTERNATE_VERSION_WORDS
        .iter()
        .filter(|w| video_title.contains(*w))
        .count() as i32;
    score - 3 * penalties
}

/// Highest score wins; ties keep provider order. A lone candidate is taken
/// without scoring.
fn pick_best(candidates: Vec<VideoCandidate>, title: &str, artist: &str) -> Option<VideoCandidate> {
    if candidates.len() <= 1 {
        return candidates.into_iter().next();
    }

    let mut best: Option<(i32, VideoCandidate)> = None;
    for candidate in candidates {
        let s = score(&candidate, title, artist);
        log::debug!("  {s:>4}  {}", candidate.title);
        if best.as_ref().is_none_or(|(top, _)| s > *top) {
            best = Some((s, candidate));
        }
    }
    best.map(|(_, c)| c)
}


#[cfg(test)]
mod tests {
    use super::testing::{candidate, StubProvider};
    use super::*;

    #[test]
    fn queries_for_real_metadata() {
        assert_eq!(
            build_queries("Song", "Artist", Some("ID")),
            vec!["Artist - Song", "Song Artist", "\"Song\" \"Artist\""]
        );
    }

    #[test]
    fn queries_for_placeholder_metadata() {
        assert_eq!(
            build_queries("Track ABC12345", UNKNOWN_ARTIST, Some("ABC12345XYZ")),
            vec![
                "spotify ABC12345XYZ",
                "Track ABC12345 music",
                "Track ABC12345 song",
                "Track ABC12345"
            ]
        );
        assert_eq!(build_queries("", "", Some("ID"))[3], "track ID");
        assert_eq!(build_queries("Song", UNKNOWN_ARTIST, None), vec!["Unknown Artist - Song"]);
    }

    #[test]
    fn official_upload_beats_remix() {
        let remix = candidate("Song Remix", 200, "DJ");
        let official = candidate("Song (Official Audio) - Artist", 210, "Artist Official");
        assert_eq!(score(&remix, "Song", "Artist"), 22);
        assert_eq!(score(&official, "Song", "Artist"), 45);

        let matcher = CandidateMatcher::new(Arc::new(StubProvider::answering(vec![remix, official.clone()])));
        assert_eq!(matcher.find_best_audio_source("Song", "Artist", None).unwrap(), official);
    }

    #[test]
    fn duration_bands() {
        assert_eq!(score(&candidate("x", 30, ""), "a", "b"), 10);
        assert_eq!(score(&candidate("x", 600, ""), "a", "b"), 10);
        assert_eq!(score(&candidate("x", 601, ""), "a", "b"), -5);
        assert_eq!(score(&candidate("x", 29, ""), "a", "b"), 0);
        let mut unknown = candidate("x", 0, "");
        unknown.duration_seconds = None;
        assert_eq!(score(&unknown, "a", "b"), 0);
    }

    #[test]
    fn uploader_bonus_once_and_penalties_stack() {
        let c = candidate("Live Concert Karaoke", 700, "Official Music Records");
        // -5 duration, +5 uploader once, -9 for three keywords
        assert_eq!(score(&c, "zzz", "yyy"), -9);
    }

    #[test]
    fn ties_keep_provider_order() {
        let a = candidate("Alpha", 200, "x");
        let b = candidate("Bravo", 200, "x");
        let matcher = CandidateMatcher::new(Arc::new(StubProvider::answering(vec![a.clone(), b])));
        assert_eq!(matcher.find_best_audio_source("Song", "Artist", None).unwrap(), a);
    }

    #[test]
    fn single_candidate_short_circuits() {
        let lone = candidate("Completely Unrelated Karaoke", 5000, "nobody");
        let matcher = CandidateMatcher::new(Arc::new(StubProvider::answering(vec![lone.clone()])));
        assert_eq!(matcher.find_best_audio_source("Song", "Artist", None).unwrap(), lone);
    }

    #[test]
    fn first_non_empty_query_decides() {
        let mut provider = StubProvider::answering(Vec::new());
        provider
            .results
            .insert("Song Artist".into(), vec![candidate("Song by Artist", 200, "")]);
        let provider = Arc::new(provider);
        let matcher = CandidateMatcher::new(provider.clone());
        let best = matcher.find_best_audio_source("Song", "Artist", None).unwrap();
        assert_eq!(best.title, "Song by Artist");
        assert_eq!(provider.queries(), vec!["Artist - Song", "Song Artist"]);
    }

    #[test]
    fn every_query_empty_is_no_candidate() {
        let provider = Arc::new(StubProvider::answering(Vec::new()));
        let matcher = CandidateMatcher::new(provider.clone());
        let err = matcher
            .find_best_audio_source("Track ABC", UNKNOWN_ARTIST, Some("ABC"))
            .unwrap_err();
        assert!(matches!(err, MatchError::NoCandidateFound { queries: 4 }));
        assert_eq!(provider.queries().len(), 4);
    }

    #[test]
    fn max_results_is_respected() {
        let many: Vec<_> = (0..10).map(|i| candidate(&format!("v{i}"), 200, "")).collect();
        let provider = Arc::new(StubProvider::answering(many));
        let matcher = CandidateMatcher::new(provider).with_max_results(2);
        // Both score 10; first stays.
        assert_eq!(matcher.find_best_audio_source("Song", "Artist", None).unwrap().title, "v0");
    }
}
