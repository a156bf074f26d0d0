use serde::{Deserialize, Serialize};

/// Artist value used when no source could name the performer.
pub const UNKNOWN_ARTIST: &str = "Unknown Artist";

/// Album value used when the album could not be extracted.
pub const UNKNOWN_ALBUM: &str = "Unknown Album";

/// Duration assumed when a source does not report one.
pub const DEFAULT_DURATION_SECS: u32 = 180;

/// Canonical track metadata, immutable once resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub title: String,
    /// Performance credit order.
    pub artists: Vec<String>,
    pub album: String,
    pub duration_seconds: u32,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub isrc: Option<String>,
    #[serde(default)]
    pub cover_art_url: Option<String>,
    /// Platform-native id (Spotify track id, YouTube video id).
    pub source_id: String,
    pub source_url: String,
}

impl Track {
    /// Minimal track with only title and artist known; the rest defaulted.
    pub fn basic(title: &str, artist: &str, source_id: &str, source_url: &str) -> Self {
        Self {
            title: title.to_string(),
            artists: vec![artist.to_string()],
            album: UNKNOWN_ALBUM.to_string(),
            duration_seconds: DEFAULT_DURATION_SECS,
            genre: None,
            release_date: None,
            isrc: None,
            cover_art_url: None,
            source_id: source_id.to_string(),
            source_url: source_url.to_string(),
        }
    }

    /// Synthesized track for an id nothing could describe.
    pub fn placeholder(source_id: &str, source_url: &str) -> Self {
        let short: String = source_id.chars().take(8).collect();
        Self::basic(&format!("Track {short}"), UNKNOWN_ARTIST, source_id, source_url)
    }

    /// First credited artist, or the placeholder artist.
    pub fn primary_artist(&self) -> &str {
        self.artists
            .first()
            .map(String::as_str)
            .unwrap_or(UNKNOWN_ARTIST)
    }

    /// All credited artists joined for display and tagging.
    pub fn artist_line(&self) -> String {
        if self.artists.is_empty() {
            UNKNOWN_ARTIST.to_string()
        } else {
            self.artists.join(", ")
        }
    }
}

/// Qualitative acceptance level of a resolved track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confidence {
    /// Structured data from the authoritative client.
    High,
    /// Scraped, placeholder, or rejected partial data.
    Low,
    /// Nothing produced.
    None,
}

/// Outcome of a single strategy run. Not persisted.
#[derive(Debug, Clone)]
pub struct ResolutionAttempt {
    pub strategy: &'static str,
    pub success: bool,
    pub track: Option<Track>,
    pub confidence: Confidence,
}

impl ResolutionAttempt {
    /// Grade a produced track with the shared confidence predicate.
    ///
    /// Tracks that fail the predicate are kept for logging but marked as
    /// unsuccessful so the chain moves on.
    pub fn graded(strategy: &'static str, track: Track, source_level: Confidence) -> Self {
        if is_confident(&track) {
            Self {
                strategy,
                success: true,
                track: Some(track),
                confidence: source_level,
            }
        } else {
            Self {
                strategy,
                success: false,
                track: Some(track),
                confidence: Confidence::Low,
            }
        }
    }

    pub fn failed(strategy: &'static str) -> Self {
        Self {
            strategy,
            success: false,
            track: None,
            confidence: Confidence::None,
        }
    }
}

/// True when an artist string names a real performer.
pub fn is_real_artist(artist: &str) -> bool {
    let artist = artist.trim();
    artist.chars().count() > 1
        && !artist.eq_ignore_ascii_case(UNKNOWN_ARTIST)
        && !artist.chars().all(|c| c.is_ascii_digit())
}

/// The single acceptance predicate used by every strategy in the chain.
pub fn is_confident(track: &Track) -> bool {
    !track.title.trim().is_empty() && is_real_artist(track.primary_artist())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_uses_first_eight_chars() {
        let t = Track::placeholder("4uLU6hMCjMI75M1A2tKUQC", "spotify:track:4uLU6hMCjMI75M1A2tKUQC");
        assert_eq!(t.title, "Track 4uLU6hMC");
        assert_eq!(t.artists, vec![UNKNOWN_ARTIST]);
        assert_eq!(t.album, UNKNOWN_ALBUM);
        assert_eq!(t.duration_seconds, 180);
    }

    #[test]
    fn placeholder_with_short_id() {
        let t = Track::placeholder("abc", "u");
        assert_eq!(t.title, "Track abc");
    }

    #[test]
    fn confidence_predicate() {
        assert!(is_confident(&Track::basic("Song", "Artist", "id", "u")));
        assert!(!is_confident(&Track::basic("Song", "Unknown Artist", "id", "u")));
        assert!(!is_confident(&Track::basic("Song", "unknown artist", "id", "u")));
        assert!(!is_confident(&Track::basic("Song", "X", "id", "u")));
        assert!(!is_confident(&Track::basic("Song", "1999", "id", "u")));
        assert!(!is_confident(&Track::basic("  ", "Artist", "id", "u")));
    }

    #[test]
    fn graded_attempt_rejects_placeholder_artist() {
        let a = ResolutionAttempt::graded(
            "test",
            Track::basic("Song", UNKNOWN_ARTIST, "id", "u"),
            Confidence::High,
        );
        assert!(!a.success);
        assert_eq!(a.confidence, Confidence::Low);
        assert!(a.track.is_some());
    }

    #[test]
    fn artist_line_joins_credits() {
        let mut t = Track::basic("Song", "A", "id", "u");
        t.artists.push("B".into());
        assert_eq!(t.artist_line(), "A, B");
        assert_eq!(t.primary_artist(), "A");
    }

    #[test]
    fn serializes_camel_case() {
        let t = Track::basic("Song", "A", "id", "u");
        let json = serde_json::to_value(&t).unwrap();
        assert_eq!(json["durationSeconds"], 180);
        assert_eq!(json["sourceId"], "id");
        assert!(json["coverArtUrl"].is_null());
    }
}
