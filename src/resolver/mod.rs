pub mod client;
pub mod html;
pub mod itunes;
pub mod oembed;
pub mod page;
pub mod widget;

use std::sync::Arc;

use thiserror::Error;

use crate::config::TimeoutConfig;
use crate::http::{FetchError, HttpFetcher};
use crate::process::ProcessError;
use crate::session::SessionStore;
use crate::track::{Confidence, ResolutionAttempt, Track};

pub use client::{ClientStrategy, MetadataClient, RawSong, SpotdlClient};
pub use itunes::ItunesStrategy;
pub use oembed::OembedStrategy;
pub use page::PageStrategy;
pub use widget::WidgetStrategy;

/// Why a single strategy produced nothing. Never leaves the resolver.
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Process(#[from] ProcessError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("no track metadata found")]
    NotFound,
}

/// One way of turning a Spotify track id into metadata.
pub trait MetadataStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Run the strategy. Must not panic and must not propagate failures.
    fn attempt(&self, id: &str, source_url: &str) -> ResolutionAttempt;
}

/// Turn an extraction result into a graded attempt, logging failures.
pub(crate) fn grade(
    strategy: &'static str,
    id: &str,
    level: Confidence,
    result: Result<Track, ExtractionError>,
) -> ResolutionAttempt {
    match result {
        Ok(track) => ResolutionAttempt::graded(strategy, track, level),
        Err(e) => {
            log::debug!("{strategy}: no metadata for {id}: {e}");
            ResolutionAttempt::failed(strategy)
        }
    }
}

/// Terminal strategy: always succeeds with a synthesized track.
pub struct PlaceholderStrategy;

impl MetadataStrategy for PlaceholderStrategy {
    fn name(&self) -> &'static str {
        "placeholder"
    }

    fn attempt(&self, id: &str, source_url: &str) -> ResolutionAttempt {
        ResolutionAttempt {
            strategy: self.name(),
            success: true,
            track: Some(Track::placeholder(id, source_url)),
            confidence: Confidence::Low,
        }
    }
}

/// Runs an ordered strategy chain until one result is acceptable.
pub struct MetadataResolver {
    strategies: Vec<Box<dyn MetadataStrategy>>,
    session: Option<Arc<SessionStore>>,
}

impl MetadataResolver {
    pub fn new(strategies: Vec<Box<dyn MetadataStrategy>>) -> Self {
        Self {
            strategies,
            session: None,
        }
    }

    /// Mirror authoritative results into `store` as soon as they resolve.
    pub fn with_session(mut self, store: Arc<SessionStore>) -> Self {
        self.session = Some(store);
        self
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Resolve metadata for a Spotify track id. Never fails: when every
    /// strategy comes up empty the placeholder track is returned.
    pub fn resolve(&self, id: &str, source_url: &str) -> Track {
        self.resolve_recorded(id, source_url).0
    }

    /// `resolve`, also reporting whether the track was appended to the
    /// session store.
    pub fn resolve_recorded(&self, id: &str, source_url: &str) -> (Track, bool) {
        for strategy in &self.strategies {
            let attempt = strategy.attempt(id, source_url);

            match (attempt.success, attempt.track) {
                (true, Some(track)) => {
                    log::info!(
                        "Resolved {id} via {}: {} - {}",
                        attempt.strategy,
                        track.artist_line(),
                        track.title
                    );
                    let recorded = attempt.confidence == Confidence::High && self.mirror(&track);
                    return (track, recorded);
                }
                (false, Some(rejected)) => {
                    log::debug!(
                        "{} returned low-confidence metadata for {id} ({} / {}), continuing",
                        attempt.strategy,
                        rejected.title,
                        rejected.primary_artist()
                    );
                }
                _ => log::debug!("{} found nothing for {id}", attempt.strategy),
            }
        }

        log::warn!("No strategy could describe {id}, using placeholder metadata");
        (Track::placeholder(id, source_url), false)
    }

    fn mirror(&self, track: &Track) -> bool {
        let Some(store) = &self.session else {
            return false;
        };
        match store.append_track(track.clone()) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Could not record {} in session: {e}", track.source_id);
                false
            }
        }
    }
}

/// The standard chain: authoritative client, public page, oembed, embed
/// widget, iTunes search, placeholder.
pub fn default_chain(
    client: Arc<dyn MetadataClient>,
    fetcher: Arc<dyn HttpFetcher>,
    timeouts: &TimeoutConfig,
) -> Vec<Box<dyn MetadataStrategy>> {
    vec![
        Box::new(ClientStrategy::new(client)),
        Box::new(PageStrategy::new(fetcher.clone(), timeouts.page())),
        Box::new(OembedStrategy::new(fetcher.clone(), timeouts.embed())),
        Box::new(WidgetStrategy::new(fetcher.clone(), timeouts.embed())),
        Box::new(ItunesStrategy::new(fetcher, timeouts.search_api())),
        Box::new(PlaceholderStrategy),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::UNKNOWN_ARTIST;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns a fixed track (or nothing) and counts its invocations.
    struct Fixed {
        name: &'static str,
        track: Option<Track>,
        level: Confidence,
        calls: Arc<AtomicUsize>,
    }

    impl Fixed {
        fn new(name: &'static str, artist: Option<&str>, level: Confidence) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let track = artist.map(|a| Track::basic("Song", a, "ABC123", "spotify:track:ABC123"));
            (
                Self {
                    name,
                    track,
                    level,
                    calls: calls.clone(),
                },
                calls,
            )
        }
    }

    impl MetadataStrategy for Fixed {
        fn name(&self) -> &'static str {
            self.name
        }

        fn attempt(&self, id: &str, _source_url: &str) -> ResolutionAttempt {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let result = self.track.clone().ok_or(ExtractionError::NotFound);
            grade(self.name, id, self.level, result)
        }
    }

    #[test]
    fn stops_at_first_acceptable_result() {
        let (first, first_calls) = Fixed::new("first", None, Confidence::Low);
        let (second, second_calls) = Fixed::new("second", Some("Artist"), Confidence::Low);
        let (third, third_calls) = Fixed::new("third", Some("Other"), Confidence::Low);
        let resolver = MetadataResolver::new(vec![
            Box::new(first),
            Box::new(second),
            Box::new(third),
            Box::new(PlaceholderStrategy),
        ]);

        let track = resolver.resolve("ABC123", "spotify:track:ABC123");
        assert_eq!(track.artists, vec!["Artist"]);
        assert_eq!(first_calls.load(Ordering::SeqCst), 1);
        assert_eq!(second_calls.load(Ordering::SeqCst), 1);
        assert_eq!(third_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unknown_artist_from_authoritative_client_continues_chain() {
        let (client, client_calls) = Fixed::new("client", Some(UNKNOWN_ARTIST), Confidence::High);
        let (page, page_calls) = Fixed::new("page", Some("Real Artist"), Confidence::Low);
        let resolver = MetadataResolver::new(vec![
            Box::new(client),
            Box::new(page),
            Box::new(PlaceholderStrategy),
        ]);

        let track = resolver.resolve("ABC123", "spotify:track:ABC123");
        assert_eq!(track.primary_artist(), "Real Artist");
        assert_eq!(client_calls.load(Ordering::SeqCst), 1);
        assert_eq!(page_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn exhausted_chain_yields_placeholder() {
        let (a, _) = Fixed::new("a", None, Confidence::High);
        let (b, _) = Fixed::new("b", Some("?"), Confidence::Low);
        let resolver = MetadataResolver::new(vec![Box::new(a), Box::new(b), Box::new(PlaceholderStrategy)]);

        let track = resolver.resolve("ABCDEFGHIJK", "u");
        assert_eq!(track, Track::placeholder("ABCDEFGHIJK", "u"));
        assert_eq!(track.title, "Track ABCDEFGH");
    }

    #[test]
    fn empty_chain_still_returns_placeholder() {
        let resolver = MetadataResolver::new(Vec::new());
        let track = resolver.resolve("XYZ", "u");
        assert_eq!(track.primary_artist(), UNKNOWN_ARTIST);
    }

    #[test]
    fn authoritative_result_is_mirrored_into_session() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SessionStore::new(dir.path().join("session.json")));
        store.start_session(false).unwrap();

        let (client, _) = Fixed::new("client", Some("Artist"), Confidence::High);
        let resolver = MetadataResolver::new(vec![Box::new(client)]).with_session(store.clone());
        let (_, recorded) = resolver.resolve_recorded("ABC123", "spotify:track:ABC123");
        assert!(recorded);

        let record = store.snapshot();
        assert_eq!(record.tracks.len(), 1);
        assert_eq!(record.tracks[0].track.source_id, "ABC123");
    }

    #[test]
    fn scraped_result_is_not_mirrored() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SessionStore::new(dir.path().join("session.json")));
        store.start_session(false).unwrap();

        let (page, _) = Fixed::new("page", Some("Artist"), Confidence::Low);
        let resolver = MetadataResolver::new(vec![Box::new(page)]).with_session(store.clone());
        let (_, recorded) = resolver.resolve_recorded("ABC123", "spotify:track:ABC123");
        assert!(!recorded);

        assert!(store.snapshot().tracks.is_empty());
    }

    #[test]
    fn default_chain_order() {
        struct NoClient;
        impl MetadataClient for NoClient {
            fn search(&self, _url: &str) -> Result<Vec<RawSong>, ExtractionError> {
                Err(ExtractionError::NotFound)
            }
        }
        let fetcher = Arc::new(crate::http::testing::StubFetcher::new());
        let resolver = MetadataResolver::new(default_chain(
            Arc::new(NoClient),
            fetcher.clone(),
            &TimeoutConfig::default(),
        ));
        assert_eq!(
            resolver.strategy_names(),
            vec!["client", "page", "oembed", "widget", "itunes", "placeholder"]
        );

        // Every network strategy fails against an empty stub; the chain still resolves.
        let track = resolver.resolve("ABC123", "https://open.spotify.com/track/ABC123");
        assert_eq!(track.title, "Track ABC123");
        assert_eq!(fetcher.request_count(), 4);
    }
}
