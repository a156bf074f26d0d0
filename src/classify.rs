use regex::Regex;
use std::borrow::Cow;
use std::fmt;
use std::sync::LazyLock;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug, PartialEq)]
pub enum ClassifyError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("{platform} links are not supported yet: {url}")]
    UnsupportedPlatform { platform: &'static str, url: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Spotify,
    YouTube,
}

impl Platform {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Spotify => "Spotify",
            Self::YouTube => "YouTube",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Track,
    Album,
    Playlist,
    Video,
}

impl ContentKind {
    /// Album and playlist links expand to several tracks.
    pub fn is_collection(&self) -> bool {
        matches!(self, Self::Album | Self::Playlist)
    }

    fn from_segment(segment: &str) -> Option<Self> {
        match segment {
            "track" => Some(Self::Track),
            "album" => Some(Self::Album),
            "playlist" => Some(Self::Playlist),
            _ => None,
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Track => "track",
            Self::Album => "album",
            Self::Playlist => "playlist",
            Self::Video => "video",
        })
    }
}

/// A recognized link: where it lives, what it points at, and its id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classified {
    pub platform: Platform,
    pub kind: ContentKind,
    pub id: String,
}

// open.spotify.com/track/<id>, optionally behind a locale segment (intl-es/)
static SPOTIFY_WEB_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?ix)
        ^(?:https?://)?open\.spotify\.com/
        (?:intl-[a-z_-]+/)?
        (?P<kind>track|album|playlist)/
        (?P<id>[a-z0-9]+)
        /?$",
    )
    .unwrap()
});

// spotify:track:<id>
static SPOTIFY_URI_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^spotify:(?P<kind>track|album|playlist):(?P<id>[A-Za-z0-9]+)$").unwrap()
});

static YOUTUBE_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{6,}$").unwrap());

const SPOTIFY_HOST: &str = "open.spotify.com";

/// Hosts that serve videos we can download directly.
const VIDEO_HOSTS: &[&str] = &[
    "youtube.com",
    "www.youtube.com",
    "m.youtube.com",
    "music.youtube.com",
    "youtu.be",
];

/// Hosts we recognize but cannot handle.
const UNSUPPORTED_HOSTS: &[(&str, &str)] = &[
    ("soundcloud.com", "SoundCloud"),
    ("www.soundcloud.com", "SoundCloud"),
    ("m.soundcloud.com", "SoundCloud"),
];

/// Classify a raw user-supplied link.
///
/// Query strings and fragments never take part in Spotify matching. YouTube
/// watch links keep their `v` parameter, which is where the id lives.
pub fn classify(raw: &str) -> Result<Classified, ClassifyError> {
    let raw = raw.trim();
    let stripped = strip_query(raw);

    if let Some(found) = spotify_match(stripped) {
        return found.ok_or_else(|| ClassifyError::InvalidUrl(raw.to_string()));
    }

    let parsed = parse_web_url(raw).ok_or_else(|| ClassifyError::InvalidUrl(raw.to_string()))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| ClassifyError::InvalidUrl(raw.to_string()))?;

    // Spotify links the regex missed (userinfo, explicit port)
    if host == SPOTIFY_HOST {
        return spotify_match(&format!("{host}{}", parsed.path()))
            .flatten()
            .ok_or_else(|| ClassifyError::InvalidUrl(raw.to_string()));
    }

    if let Some((_, name)) = UNSUPPORTED_HOSTS.iter().find(|(h, _)| *h == host) {
        return Err(ClassifyError::UnsupportedPlatform {
            platform: *name,
            url: raw.to_string(),
        });
    }

    if VIDEO_HOSTS.contains(&host) {
        let id = youtube_id(&parsed).ok_or_else(|| ClassifyError::InvalidUrl(raw.to_string()))?;
        return Ok(Classified {
            platform: Platform::YouTube,
            kind: ContentKind::Video,
            id,
        });
    }

    Err(ClassifyError::InvalidUrl(raw.to_string()))
}

/// Canonical web URL for a Spotify item.
pub fn spotify_url(kind: ContentKind, id: &str) -> String {
    format!("https://open.spotify.com/{kind}/{id}")
}

/// `None` when neither Spotify pattern matches.
fn spotify_match(candidate: &str) -> Option<Option<Classified>> {
    let caps = SPOTIFY_WEB_RE
        .captures(candidate)
        .or_else(|| SPOTIFY_URI_RE.captures(candidate))?;
    Some(
        ContentKind::from_segment(&caps["kind"].to_lowercase()).map(|kind| Classified {
            platform: Platform::Spotify,
            kind,
            id: caps["id"].to_string(),
        }),
    )
}

fn strip_query(url: &str) -> &str {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    &url[..end]
}

/// Parse an http(s) link; a missing scheme means https.
fn parse_web_url(raw: &str) -> Option<Url> {
    let with_scheme = if raw.contains("://") {
        Cow::Borrowed(raw)
    } else {
        Cow::Owned(format!("https://{raw}"))
    };
    let parsed = Url::parse(&with_scheme).ok()?;
    matches!(parsed.scheme(), "http" | "https").then_some(parsed)
}

fn youtube_id(url: &Url) -> Option<String> {
    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|s| !s.is_empty()).collect())
        .unwrap_or_default();

    let candidate = if url.host_str() == Some("youtu.be") {
        segments.first().map(|s| s.to_string())
    } else {
        match segments.as_slice() {
            ["shorts" | "embed" | "live" | "v", id, ..] => Some(id.to_string()),
            _ => url
                .query_pairs()
                .find(|(k, v)| k == "v" && !v.is_empty())
                .map(|(_, v)| v.into_owned()),
        }
    }?;

    YOUTUBE_ID_RE.is_match(&candidate).then_some(candidate)
}
