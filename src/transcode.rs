use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use thiserror::Error;

use crate::process::{run_with_timeout, ProcessError};

#[derive(Error, Debug)]
pub enum TranscodeError {
    #[error("ffmpeg error: {0}")]
    Ffmpeg(#[from] ProcessError),
    #[error("Transcoder produced no output at {0}")]
    MissingOutput(PathBuf),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Turns downloaded audio into an MP3 next to the input.
pub trait Transcoder: Send + Sync {
    fn transcode(&self, input: &Path, bitrate_kbps: u32) -> Result<PathBuf, TranscodeError>;
}

/// `<input>.mp3` beside the input file.
pub fn mp3_path(input: &Path) -> PathBuf {
    input.with_extension("mp3")
}

/// Re-encode with ffmpeg/libmp3lame, dropping any video stream.
pub struct FfmpegTranscoder {
    program: String,
    timeout: Duration,
}

impl FfmpegTranscoder {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }
}

impl Transcoder for FfmpegTranscoder {
    fn transcode(&self, input: &Path, bitrate_kbps: u32) -> Result<PathBuf, TranscodeError> {
        let output = mp3_path(input);
        let mut cmd = Command::new(&self.program);
        cmd.arg("-y")
            .arg("-i")
            .arg(input)
            .args(["-vn", "-codec:a", "libmp3lame", "-b:a"])
            .arg(format!("{bitrate_kbps}k"))
            .arg(&output);

        if let Err(e) = run_with_timeout(cmd, self.timeout) {
            std::fs::remove_file(&output).ok();
            return Err(e.into());
        }
        if !output.exists() {
            return Err(TranscodeError::MissingOutput(output));
        }
        Ok(output)
    }
}

/// Only swaps the extension. For providers that already deliver MP3 or
/// when ffmpeg is unavailable and a player tolerates the container.
pub struct RenameTranscoder;

impl Transcoder for RenameTranscoder {
    fn transcode(&self, input: &Path, _bitrate_kbps: u32) -> Result<PathBuf, TranscodeError> {
        let output = mp3_path(input);
        std::fs::rename(input, &output)?;
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rename_swaps_extension() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("abc.webm");
        std::fs::write(&input, b"x").unwrap();
        let out = RenameTranscoder.transcode(&input, 192).unwrap();
        assert_eq!(out, dir.path().join("abc.mp3"));
        assert!(out.exists());
        assert!(!input.exists());
    }

    #[test]
    fn rename_missing_input_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(RenameTranscoder.transcode(&dir.path().join("nope.m4a"), 192).is_err());
    }

    #[test]
    fn missing_ffmpeg_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("abc.webm");
        std::fs::write(&input, b"x").unwrap();
        let t = FfmpegTranscoder::new("no-such-ffmpeg-tunegrab", Duration::from_secs(1));
        assert!(matches!(
            t.transcode(&input, 192),
            Err(TranscodeError::Ffmpeg(ProcessError::Spawn { .. }))
        ));
        assert!(!dir.path().join("abc.mp3").exists());
    }
}
