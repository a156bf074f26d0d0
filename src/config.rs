use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;
use serde::Deserialize;

/// Application configuration loaded from TOML config file.
/// All fields have sensible defaults; the config file is optional.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Where finished MP3s land (overrides XDG default).
    pub output_dir: Option<PathBuf>,
    /// Session JSON document path (overrides XDG default).
    pub session_path: Option<PathBuf>,
    /// MP3 bitrate handed to the transcoder.
    pub bitrate_kbps: u32,
    pub transcoder: TranscoderKind,
    /// Candidates requested per search query.
    pub search_results: usize,
    pub timeouts: TimeoutConfig,
    pub tools: ToolsConfig,
    pub user_agent: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            output_dir: None,
            session_path: None,
            bitrate_kbps: 192,
            transcoder: TranscoderKind::default(),
            search_results: 5,
            timeouts: TimeoutConfig::default(),
            tools: ToolsConfig::default(),
            user_agent: None,
        }
    }
}

/// How downloaded audio becomes an `.mp3`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscoderKind {
    /// Re-encode with ffmpeg/libmp3lame.
    #[default]
    Ffmpeg,
    /// Only change the extension (for sources already delivering MP3).
    Rename,
}

/// Per-call timeouts in seconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub page_secs: u64,
    /// oEmbed and embed widget.
    pub embed_secs: u64,
    pub search_api_secs: u64,
    pub cover_secs: u64,
    /// Structured metadata client subprocess.
    pub client_secs: u64,
    pub video_search_secs: u64,
    pub download_secs: u64,
    pub transcode_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            page_secs: 15,
            embed_secs: 10,
            search_api_secs: 5,
            cover_secs: 10,
            client_secs: 20,
            video_search_secs: 20,
            download_secs: 600,
            transcode_secs: 300,
        }
    }
}

impl TimeoutConfig {
    pub fn page(&self) -> Duration {
        Duration::from_secs(self.page_secs)
    }

    pub fn embed(&self) -> Duration {
        Duration::from_secs(self.embed_secs)
    }

    pub fn search_api(&self) -> Duration {
        Duration::from_secs(self.search_api_secs)
    }

    pub fn cover(&self) -> Duration {
        Duration::from_secs(self.cover_secs)
    }

    pub fn client(&self) -> Duration {
        Duration::from_secs(self.client_secs)
    }

    pub fn video_search(&self) -> Duration {
        Duration::from_secs(self.video_search_secs)
    }

    pub fn download(&self) -> Duration {
        Duration::from_secs(self.download_secs)
    }

    pub fn transcode(&self) -> Duration {
        Duration::from_secs(self.transcode_secs)
    }
}

/// External executables, looked up on `PATH` unless absolute.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ytdlp: String,
    pub ffmpeg: String,
    pub spotdl: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ytdlp: "yt-dlp".into(),
            ffmpeg: "ffmpeg".into(),
            spotdl: "spotdl".into(),
        }
    }
}

impl AppConfig {
    /// Load config from `~/.config/tunegrab/config.toml`.
    /// Returns default config if file doesn't exist.
    /// Logs a warning if the file exists but can't be parsed.
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => {
                log::debug!("No config file found, using defaults");
                Self::default()
            }
        }
    }

    pub fn load_from(path: &std::path::Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<AppConfig>(&contents) {
                Ok(config) => {
                    log::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    log::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                log::warn!("Failed to read {}: {}. Using defaults.", path.display(), e);
                Self::default()
            }
        }
    }

    /// Output directory: config value, else the XDG default.
    pub fn resolve_output_dir(&self) -> PathBuf {
        self.output_dir.clone().unwrap_or_else(default_output_dir)
    }

    pub fn resolve_session_path(&self) -> PathBuf {
        self.session_path.clone().unwrap_or_else(default_session_path)
    }

    fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", crate::APP_NAME).map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

/// `~/Music/tunegrab` when a home directory is known, else `./downloads`.
pub fn default_output_dir() -> PathBuf {
    directories::UserDirs::new()
        .and_then(|u| u.audio_dir().map(|d| d.join(crate::APP_NAME)))
        .unwrap_or_else(|| PathBuf::from("downloads"))
}

/// Resolve the default session document path using XDG data directory.
pub fn default_session_path() -> PathBuf {
    if let Some(dirs) = ProjectDirs::from("", "", crate::APP_NAME) {
        let data_dir = dirs.data_dir();
        std::fs::create_dir_all(data_dir).ok();
        data_dir.join("session.json")
    } else {
        // Fallback: current directory
        PathBuf::from("session.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = AppConfig::default();
        assert_eq!(c.bitrate_kbps, 192);
        assert_eq!(c.search_results, 5);
        assert_eq!(c.transcoder, TranscoderKind::Ffmpeg);
        assert_eq!(c.timeouts.page(), Duration::from_secs(15));
        assert_eq!(c.timeouts.search_api(), Duration::from_secs(5));
        assert_eq!(c.tools.ytdlp, "yt-dlp");
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let c: AppConfig = toml::from_str(
            r#"
            bitrate_kbps = 320
            transcoder = "rename"

            [timeouts]
            page_secs = 30

            [tools]
            ytdlp = "/opt/yt-dlp"
            "#,
        )
        .unwrap();
        assert_eq!(c.bitrate_kbps, 320);
        assert_eq!(c.transcoder, TranscoderKind::Rename);
        assert_eq!(c.timeouts.page_secs, 30);
        assert_eq!(c.timeouts.embed_secs, 10);
        assert_eq!(c.tools.ytdlp, "/opt/yt-dlp");
        assert_eq!(c.tools.ffmpeg, "ffmpeg");
        assert_eq!(c.search_results, 5);
    }

    #[test]
    fn unparseable_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "bitrate_kbps = \"loud\"").unwrap();
        assert_eq!(AppConfig::load_from(&path).bitrate_kbps, 192);
    }

    #[test]
    fn explicit_paths_win() {
        let c = AppConfig {
            output_dir: Some(PathBuf::from("/tmp/out")),
            ..Default::default()
        };
        assert_eq!(c.resolve_output_dir(), PathBuf::from("/tmp/out"));
    }
}
