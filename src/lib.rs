pub mod classify;
pub mod config;
pub mod http;
pub mod matcher;
pub mod pipeline;
pub mod process;
pub mod resolver;
pub mod session;
pub mod tagging;
pub mod track;
pub mod transcode;
pub mod ytdlp;

/// Application name for XDG paths
pub const APP_NAME: &str = "tunegrab";
