use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use super::html::{json_scripts, meta_content, page_title, strip_spotify_suffix};
use super::{grade, ExtractionError, MetadataStrategy};
use crate::http::HttpFetcher;
use crate::track::{Confidence, ResolutionAttempt, Track, UNKNOWN_ALBUM, UNKNOWN_ARTIST};

/// Deepest nesting level inspected in an embedded payload.
pub const MAX_DEPTH: usize = 8;

/// Only these keys lead towards the track entity in embed payloads.
const DESCEND_KEYS: &[&str] = &["props", "pageProps", "state", "data", "entity", "track", "item"];

/// Arrays are sampled, not walked in full.
const ARRAY_SAMPLE: usize = 3;

/// Scrapes the embeddable player at `open.spotify.com/embed/track/<id>`.
pub struct WidgetStrategy {
    fetcher: Arc<dyn HttpFetcher>,
    timeout: Duration,
}

impl WidgetStrategy {
    pub fn new(fetcher: Arc<dyn HttpFetcher>, timeout: Duration) -> Self {
        Self { fetcher, timeout }
    }

    fn extract(&self, id: &str, source_url: &str) -> Result<Track, ExtractionError> {
        let url = format!("https://open.spotify.com/embed/track/{id}");
        let response = self.fetcher.get(&url, self.timeout)?;
        if !response.is_success() {
            return Err(ExtractionError::Status {
                url,
                status: response.status,
            });
        }
        let html = response.text();

        for script in json_scripts(&html) {
            let payload: Value = match serde_json::from_str(script) {
                Ok(v) => v,
                Err(e) => {
                    log::debug!("Skipping unparseable embed payload: {e}");
                    continue;
                }
            };
            if let Some(track) = find_track_object(&payload).and_then(|o| track_from_object(o, id, source_url)) {
                return Ok(track);
            }
        }

        track_from_meta(&html, id, source_url).ok_or(ExtractionError::NotFound)
    }
}

impl MetadataStrategy for WidgetStrategy {
    fn name(&self) -> &'static str {
        "widget"
    }

    fn attempt(&self, id: &str, source_url: &str) -> ResolutionAttempt {
        grade(self.name(), id, Confidence::Low, self.extract(id, source_url))
    }
}

/// First object, in document order, carrying `name` plus `artist` or
/// `artists`, no deeper than `MAX_DEPTH`.
pub fn find_track_object(root: &Value) -> Option<&serde_json::Map<String, Value>> {
    let mut stack: Vec<(&Value, usize)> = vec![(root, 0)];

    while let Some((value, depth)) = stack.pop() {
        if depth > MAX_DEPTH {
            continue;
        }
        match value {
            Value::Object(map) => {
                if map.contains_key("name") && (map.contains_key("artist") || map.contains_key("artists")) {
                    return Some(map);
                }
                // Reverse so the first key is popped first.
                let children: Vec<&Value> = DESCEND_KEYS.iter().filter_map(|k| map.get(*k)).collect();
                stack.extend(children.into_iter().rev().map(|v| (v, depth + 1)));
            }
            Value::Array(items) => {
                stack.extend(items.iter().take(ARRAY_SAMPLE).rev().map(|v| (v, depth + 1)));
            }
            _ => {}
        }
    }
    None
}

fn track_from_object(obj: &serde_json::Map<String, Value>, id: &str, source_url: &str) -> Option<Track> {
    let name = obj.get("name")?.as_str()?.trim();
    if name.is_empty() {
        return None;
    }

    let mut artists: Vec<String> = match (obj.get("artists"), obj.get("artist")) {
        (Some(Value::Array(list)), _) => list.iter().filter_map(name_of).collect(),
        (_, Some(single)) => name_of(single).into_iter().collect(),
        _ => Vec::new(),
    };
    artists.retain(|a| !a.is_empty());
    if artists.is_empty() {
        artists.push(UNKNOWN_ARTIST.to_string());
    }

    let mut track = Track::basic(name, &artists[0], id, source_url);
    track.artists = artists;

    if let Some(album) = obj.get("album").and_then(Value::as_object) {
        track.album = album
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or(UNKNOWN_ALBUM)
            .to_string();
        track.cover_art_url = album
            .get("images")
            .and_then(|i| i.get(0))
            .and_then(|i| i.get("url"))
            .and_then(Value::as_str)
            .map(String::from);
    }
    if track.cover_art_url.is_none() {
        track.cover_art_url = obj
            .get("coverArt")
            .and_then(|c| c.get("sources"))
            .and_then(|s| s.get(0))
            .and_then(|s| s.get("url"))
            .and_then(Value::as_str)
            .map(String::from);
    }

    // Embeds report milliseconds; tiny values are already seconds.
    let duration = obj
        .get("duration_ms")
        .or_else(|| obj.get("duration"))
        .and_then(Value::as_u64);
    match duration {
        Some(ms) if ms > 10_000 => track.duration_seconds = (ms / 1000) as u32,
        Some(secs) if secs > 0 => track.duration_seconds = secs as u32,
        _ => {}
    }

    Some(track)
}

/// `{"name": "..."}` or a bare string.
fn name_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Object(o) => o.get("name").and_then(Value::as_str).map(|s| s.trim().to_string()),
        _ => None,
    }
}

fn track_from_meta(html: &str, id: &str, source_url: &str) -> Option<Track> {
    let title = meta_content(html, "og:title").or_else(|| page_title(html))?;
    let title = strip_spotify_suffix(&title);
    if let Some((song, artist)) = title.split_once(" by ") {
        return Some(Track::basic(song.trim(), artist.trim(), id, source_url));
    }
    // Embed titles read "Artist - Song".
    title
        .split_once(" - ")
        .map(|(artist, song)| Track::basic(song.trim(), artist.trim(), id, source_url))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::testing::StubFetcher;
    use serde_json::json;

    #[test]
    fn finds_next_data_entity() {
        let payload = json!({
            "props": {"pageProps": {"state": {"data": {"entity": {
                "name": "Levitating",
                "artists": [{"name": "Dua Lipa"}, {"name": "DaBaby"}],
                "duration": 203064,
                "coverArt": {"sources": [{"url": "https://i.scdn.co/image/lev"}]}
            }}}}}
        });
        let obj = find_track_object(&payload).unwrap();
        let t = track_from_object(obj, "ID", "u").unwrap();
        assert_eq!(t.title, "Levitating");
        assert_eq!(t.artists, vec!["Dua Lipa", "DaBaby"]);
        assert_eq!(t.duration_seconds, 203);
        assert_eq!(t.cover_art_url.as_deref(), Some("https://i.scdn.co/image/lev"));
    }

    #[test]
    fn album_and_single_artist() {
        let payload = json!({"data": {"track": {
            "name": "Song",
            "artist": {"name": "Band"},
            "album": {"name": "Record", "images": [{"url": "https://img/1"}]},
            "duration_ms": 61000
        }}});
        let t = track_from_object(find_track_object(&payload).unwrap(), "ID", "u").unwrap();
        assert_eq!(t.artists, vec!["Band"]);
        assert_eq!(t.album, "Record");
        assert_eq!(t.cover_art_url.as_deref(), Some("https://img/1"));
        assert_eq!(t.duration_seconds, 61);
    }

    #[test]
    fn depth_is_bounded() {
        let mut deep = json!({"name": "Deep", "artists": ["X Y"]});
        for _ in 0..=MAX_DEPTH {
            deep = json!({ "data": deep });
        }
        assert!(find_track_object(&deep).is_none());

        let mut shallow = json!({"name": "Shallow", "artists": ["X Y"]});
        for _ in 0..MAX_DEPTH {
            shallow = json!({ "data": shallow });
        }
        assert!(find_track_object(&shallow).is_some());
    }

    #[test]
    fn first_match_in_document_order() {
        let payload = json!({"data": [
            {"item": {"name": "First", "artists": ["A1"]}},
            {"item": {"name": "Second", "artists": ["A2"]}}
        ]});
        let obj = find_track_object(&payload).unwrap();
        assert_eq!(obj["name"], "First");
    }

    #[test]
    fn arrays_are_sampled() {
        let payload = json!([1, 2, 3, {"name": "Late", "artists": ["A"]}]);
        assert!(find_track_object(&payload).is_none());
    }

    #[test]
    fn unrelated_keys_are_not_walked() {
        let payload = json!({"recommendations": {"name": "Other", "artists": ["B"]}});
        assert!(find_track_object(&payload).is_none());
    }

    #[test]
    fn strategy_falls_back_to_meta() {
        let url = "https://open.spotify.com/embed/track/ID1";
        let html = r#"<html><head>
            <script type="application/json">{not json</script>
            <meta property="og:title" content="Queen - Bohemian Rhapsody"/>
            </head></html>"#;
        let fetcher = Arc::new(StubFetcher::new().route(url, 200, html));
        let attempt = WidgetStrategy::new(fetcher, Duration::from_secs(1)).attempt("ID1", "src");
        assert!(attempt.success);
        let t = attempt.track.unwrap();
        assert_eq!(t.title, "Bohemian Rhapsody");
        assert_eq!(t.primary_artist(), "Queen");
    }

    #[test]
    fn strategy_reads_embedded_json() {
        let url = "https://open.spotify.com/embed/track/ID2";
        let html = r#"<script id="__NEXT_DATA__" type="application/json">
            {"props":{"pageProps":{"state":{"data":{"entity":{"name":"Numb","artists":[{"name":"Linkin Park"}]}}}}}}
            </script>"#;
        let fetcher = Arc::new(StubFetcher::new().route(url, 200, html));
        let attempt = WidgetStrategy::new(fetcher, Duration::from_secs(1)).attempt("ID2", "src");
        assert!(attempt.success);
        assert_eq!(attempt.track.unwrap().title, "Numb");
    }
}
