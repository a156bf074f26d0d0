use std::time::Duration;

use thiserror::Error;

/// Desktop browser UA; the Spotify pages serve a bare shell to unknown agents.
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP request to {url} failed: {message}")]
    Transport { url: String, message: String },
    #[error("Failed to read response body from {url}: {message}")]
    Body { url: String, message: String },
}

/// Status and raw body of a GET request.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Blocking GET with an explicit per-call timeout.
///
/// Non-2xx statuses are returned as responses, not errors.
pub trait HttpFetcher: Send + Sync {
    fn get(&self, url: &str, timeout: Duration) -> Result<HttpResponse, FetchError>;
}

/// `ureq` agent shared by every scraping strategy and the cover-art download.
pub struct UreqFetcher {
    agent: ureq::Agent,
    user_agent: String,
}

impl UreqFetcher {
    pub fn new(user_agent: &str) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .into();
        Self {
            agent,
            user_agent: user_agent.to_string(),
        }
    }
}

impl Default for UreqFetcher {
    fn default() -> Self {
        Self::new(DEFAULT_USER_AGENT)
    }
}

impl HttpFetcher for UreqFetcher {
    fn get(&self, url: &str, timeout: Duration) -> Result<HttpResponse, FetchError> {
        log::debug!("GET {url} (timeout {}s)", timeout.as_secs());

        let mut response = self
            .agent
            .get(url)
            .header("User-Agent", &self.user_agent)
            .header("Accept-Language", "en-US,en;q=0.9")
            .config()
            .timeout_global(Some(timeout))
            .build()
            .call()
            .map_err(|e| FetchError::Transport {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status().as_u16();
        let body = response
            .body_mut()
            .with_config()
            .limit(20 * 1024 * 1024)
            .read_to_vec()
            .map_err(|e| FetchError::Body {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        log::debug!("  {status} ({} bytes) from {url}", body.len());
        Ok(HttpResponse { status, body })
    }
}

/// Append a percent-encoded query string to a base URL.
pub fn with_query(base: &str, params: &[(&str, &str)]) -> String {
    let query: Vec<String> = params
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect();
    if query.is_empty() {
        base.to_string()
    } else {
        format!("{base}?{}", query.join("&"))
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Serves canned responses by exact URL and records every request.
    #[derive(Default)]
    pub struct StubFetcher {
        routes: HashMap<String, (u16, Vec<u8>)>,
        pub requests: Mutex<Vec<String>>,
    }

    impl StubFetcher {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn route(mut self, url: &str, status: u16, body: &str) -> Self {
            self.routes.insert(url.to_string(), (status, body.as_bytes().to_vec()));
            self
        }

        pub fn route_bytes(mut self, url: &str, body: Vec<u8>) -> Self {
            self.routes.insert(url.to_string(), (200, body));
            self
        }

        pub fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    impl HttpFetcher for StubFetcher {
        fn get(&self, url: &str, _timeout: Duration) -> Result<HttpResponse, FetchError> {
            self.requests.lock().unwrap().push(url.to_string());
            match self.routes.get(url) {
                Some((status, body)) => Ok(HttpResponse {
                    status: *status,
                    body: body.clone(),
                }),
                None => Err(FetchError::Transport {
                    url: url.to_string(),
                    message: "connection refused".to_string(),
                }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_is_percent_encoded() {
        assert_eq!(
            with_query("https://itunes.apple.com/search", &[("term", "a b&c"), ("limit", "1")]),
            "https://itunes.apple.com/search?term=a%20b%26c&limit=1"
        );
    }

    #[test]
    fn query_without_params() {
        assert_eq!(with_query("https://x.test/a", &[]), "https://x.test/a");
    }

    #[test]
    fn response_helpers() {
        let ok = HttpResponse { status: 204, body: b"hi".to_vec() };
        assert!(ok.is_success());
        assert_eq!(ok.text(), "hi");
        let missing = HttpResponse { status: 404, body: Vec::new() };
        assert!(!missing.is_success());
    }
}
