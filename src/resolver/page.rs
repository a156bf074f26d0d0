use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;

use super::html::{meta_content, page_title, strip_spotify_suffix};
use super::{grade, ExtractionError, MetadataStrategy};
use crate::http::HttpFetcher;
use crate::track::{is_real_artist, Confidence, ResolutionAttempt, Track, UNKNOWN_ALBUM};

/// `<title>` layouts, most specific first.
static TITLE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // "Song - song and lyrics by Artist"
        r"(?i)^(.+?)\s*-\s*song\s+(?:and\s+lyrics\s+)?by\s+(.+?)$",
        // "Song - song and lyrics Artist"
        r"(?i)^(.+?)\s*-\s*song\s+(?:and\s+lyrics\s+)?(?:by\s+)?(.+?)$",
        // "Song by Artist"
        r"(?i)^(.+?)\s+by\s+(.+?)$",
        // "Song · Artist"
        r"(?i)^(.+?)\s*·\s*(.+?)$",
        // "Song - Artist"
        r"(?i)^(.+?)\s*-\s*(.+?)$",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// og:description phrasings, English and Spanish locales.
static DESCRIPTION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"Listen to (.+?) (?:by|from) (.+?) on Spotify",
        r"Escucha (.+?) de (.+?) en Spotify",
        r"(.+?) · Song · (.+?) · \d+",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static TRAILING_KIND_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s*-\s*(?:song|music|audio)(?:\s+and\s+lyrics)?.*$").unwrap()
});

static RELEASE_NOTE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s*\(\s*(?:official|audio|music|video).*?\)\s*").unwrap()
});

static ALBUM_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r#"(?is)"album"[^}]*?"name"\s*:\s*"([^"]+)""#,
        r#"(?is)"albumName"\s*:\s*"([^"]+)""#,
        r#"(?is)data-testid="album"[^>]*>([^<]+)<"#,
        r#"(?is)<meta\s+property="music:album"\s+content="([^"]+)""#,
        r#"(?is)"collection_name"\s*:\s*"([^"]+)""#,
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static IMAGE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r#"(?i)"image"[^}]*?"url"\s*:\s*"([^"]+)""#,
        r#"(?i)"cover"[^}]*?"url"\s*:\s*"([^"]+)""#,
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

const NOT_AN_ARTIST: &[&str] = &["song", "music", "audio", "lyrics"];
const NOT_AN_ALBUM: &[&str] = &["track", "single", "music:album:track"];

/// Scrapes the public `open.spotify.com/track/<id>` page.
pub struct PageStrategy {
    fetcher: Arc<dyn HttpFetcher>,
    timeout: Duration,
}

impl PageStrategy {
    pub fn new(fetcher: Arc<dyn HttpFetcher>, timeout: Duration) -> Self {
        Self { fetcher, timeout }
    }

    fn extract(&self, id: &str, source_url: &str) -> Result<Track, ExtractionError> {
        let url = format!("https://open.spotify.com/track/{id}");
        let response = self.fetcher.get(&url, self.timeout)?;
        if !response.is_success() {
            return Err(ExtractionError::Status {
                url,
                status: response.status,
            });
        }
        parse_track_page(&response.text(), id, source_url).ok_or(ExtractionError::NotFound)
    }
}

impl MetadataStrategy for PageStrategy {
    fn name(&self) -> &'static str {
        "page"
    }

    fn attempt(&self, id: &str, source_url: &str) -> ResolutionAttempt {
        grade(self.name(), id, Confidence::Low, self.extract(id, source_url))
    }
}

/// Pull title and artist from a track page; album and cover are independent
/// and default when missing.
pub fn parse_track_page(html: &str, id: &str, source_url: &str) -> Option<Track> {
    let (song, artist, image) = title_from_title_element(html)
        .map(|(s, a)| (s, a, extract_image(html)))
        .or_else(|| title_from_meta(html))?;

    let mut track = Track::basic(&song, &artist, id, source_url);
    track.album = extract_album(html).unwrap_or_else(|| UNKNOWN_ALBUM.to_string());
    track.cover_art_url = image;
    Some(track)
}

fn title_from_title_element(html: &str) -> Option<(String, String)> {
    let title = strip_spotify_suffix(&page_title(html)?);
    TITLE_PATTERNS.iter().find_map(|pattern| {
        let caps = pattern.captures(&title)?;
        let song = clean_song(&caps[1]);
        let artist = clean_artist(&caps[2]);
        plausible(&song, &artist).then_some((song, artist))
    })
}

fn title_from_meta(html: &str) -> Option<(String, String, Option<String>)> {
    let og_title = meta_content(html, "og:title")?;
    let image = meta_content(html, "og:image");

    if let Some((name, rest)) = og_title.split_once(" · ") {
        let artist = rest.split(" · ").next().unwrap_or(rest).trim();
        if plausible(name.trim(), artist) {
            return Some((name.trim().to_string(), artist.to_string(), image));
        }
    }

    let description = meta_content(html, "og:description")?;
    DESCRIPTION_PATTERNS.iter().find_map(|pattern| {
        let caps = pattern.captures(&description)?;
        let song = caps[1].trim().to_string();
        let artist = caps[2].trim().to_string();
        plausible(&song, &artist).then(|| (song, artist, image.clone()))
    })
}

fn clean_song(raw: &str) -> String {
    let song = TRAILING_KIND_RE.replace(raw.trim(), "");
    RELEASE_NOTE_RE.replace_all(&song, "").trim().to_string()
}

fn clean_artist(raw: &str) -> String {
    TRAILING_KIND_RE.replace(raw.trim(), "").trim().to_string()
}

fn plausible(song: &str, artist: &str) -> bool {
    !song.is_empty()
        && is_real_artist(artist)
        && !NOT_AN_ARTIST.contains(&artist.to_lowercase().as_str())
}

/// First album name any of the album patterns yields.
pub fn extract_album(html: &str) -> Option<String> {
    ALBUM_PATTERNS.iter().find_map(|pattern| {
        let album = pattern.captures(html)?[1].trim().to_string();
        let lower = album.to_lowercase();
        let valid = album.chars().count() > 1
            && !album.chars().all(|c| c.is_ascii_digit())
            && !NOT_AN_ALBUM.contains(&lower.as_str())
            && !lower.starts_with("http");
        valid.then_some(album)
    })
}

/// Cover URL from og:image, then embedded JSON.
pub fn extract_image(html: &str) -> Option<String> {
    meta_content(html, "og:image").or_else(|| {
        IMAGE_PATTERNS
            .iter()
            .find_map(|pattern| pattern.captures(html).map(|c| c[1].to_string()))
    })
}
