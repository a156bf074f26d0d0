//! Session metadata document.
//!
//! One JSON file describes the tracks resolved during the current session
//! (a single track or a whole album/playlist). Every mutation rewrites the
//! whole document so external readers always see a complete file.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::track::Track;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Malformed session document {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("No session entry for track {0}")]
    UnknownTrack(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionType {
    #[default]
    Single,
    Batch,
}

/// A resolved track plus where it ended up on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTrack {
    #[serde(flatten)]
    pub track: Track,
    #[serde(default)]
    pub local_file_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub last_updated: DateTime<Utc>,
    pub session_type: SessionType,
    #[serde(default)]
    pub total_tracks: usize,
    #[serde(default)]
    pub tracks: Vec<SessionTrack>,
    #[serde(default)]
    pub current_track: Option<SessionTrack>,
}

impl SessionRecord {
    fn fresh(session_type: SessionType) -> Self {
        Self {
            last_updated: Utc::now(),
            session_type,
            total_tracks: 0,
            tracks: Vec::new(),
            current_track: None,
        }
    }

    fn touch(&mut self) {
        self.total_tracks = self.tracks.len();
        self.last_updated = Utc::now();
    }
}

struct State {
    record: SessionRecord,
    /// Batch sessions keep the previous document until the first append.
    clear_on_append: bool,
}

/// Persistent, append-mostly store for the current session.
pub struct SessionStore {
    path: PathBuf,
    state: Mutex<State>,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: Mutex::new(State {
                record: SessionRecord::fresh(SessionType::Single),
                clear_on_append: false,
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the in-memory record with the document on disk, if any.
    pub fn load(&self) -> Result<(), SessionError> {
        if let Some(record) = self.read_document()? {
            self.lock().record = record;
        }
        Ok(())
    }

    /// Write the current record to disk.
    pub fn save(&self) -> Result<(), SessionError> {
        let state = self.lock();
        self.write_document(&state.record)
    }

    /// Begin a session. Single sessions start from an empty document; batch
    /// sessions keep prior tracks until the first track is appended. An
    /// unreadable previous document is replaced.
    pub fn start_session(&self, batch: bool) -> Result<(), SessionError> {
        let previous = if batch {
            self.read_document().unwrap_or_else(|e| {
                log::warn!("Discarding previous session: {e}");
                None
            })
        } else {
            None
        };

        let mut state = self.lock();
        if batch {
            let mut record = previous.unwrap_or_else(|| SessionRecord::fresh(SessionType::Batch));
            record.session_type = SessionType::Batch;
            record.touch();
            state.record = record;
            state.clear_on_append = true;
        } else {
            state.record = SessionRecord::fresh(SessionType::Single);
            state.clear_on_append = false;
        }
        log::debug!(
            "Started {} session at {}",
            if batch { "batch" } else { "single" },
            self.path.display()
        );
        self.write_document(&state.record)
    }

    pub fn append_track(&self, track: Track) -> Result<(), SessionError> {
        let mut state = self.lock();
        if state.clear_on_append {
            state.record.tracks.clear();
            state.clear_on_append = false;
        }
        let entry = SessionTrack {
            track,
            local_file_path: None,
        };
        state.record.current_track = Some(entry.clone());
        state.record.tracks.push(entry);
        state.record.touch();
        self.write_document(&state.record)
    }

    /// Record where a track was saved. Every entry with `source_id` is
    /// updated; a later call overwrites an earlier one.
    pub fn attach_local_path(&self, source_id: &str, path: &Path) -> Result<(), SessionError> {
        let path = path.to_string_lossy().into_owned();
        let mut state = self.lock();

        let mut found = false;
        for entry in state.record.tracks.iter_mut().filter(|e| e.track.source_id == source_id) {
            entry.local_file_path = Some(path.clone());
            found = true;
        }
        if !found {
            return Err(SessionError::UnknownTrack(source_id.to_string()));
        }
        if let Some(current) = state
            .record
            .current_track
            .as_mut()
            .filter(|c| c.track.source_id == source_id)
        {
            current.local_file_path = Some(path);
        }
        state.record.touch();
        self.write_document(&state.record)
    }

    /// Close the session. The document stays on disk as the last session.
    pub fn end_session(&self) -> Result<(), SessionError> {
        let mut state = self.lock();
        state.clear_on_append = false;
        state.record.touch();
        log::debug!("Ended session with {} track(s)", state.record.tracks.len());
        self.write_document(&state.record)
    }

    pub fn contains(&self, source_id: &str) -> bool {
        let state = self.lock();
        !state.clear_on_append && state.record.tracks.iter().any(|e| e.track.source_id == source_id)
    }

    pub fn snapshot(&self) -> SessionRecord {
        self.lock().record.clone()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn read_document(&self) -> Result<Option<SessionRecord>, SessionError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&self.path).map_err(|source| SessionError::Io {
            path: self.path.clone(),
            source,
        })?;
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|source| SessionError::Json {
                path: self.path.clone(),
                source,
            })
    }

    fn write_document(&self, record: &SessionRecord) -> Result<(), SessionError> {
        let io_err = |source| SessionError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(record).map_err(|source| SessionError::Json {
            path: self.path.clone(),
            source,
        })?;
        std::fs::write(&self.path, json).map_err(io_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(id: &str) -> Track {
        Track::basic("Song", "Artist", id, &format!("https://open.spotify.com/track/{id}"))
    }

    fn store() -> (tempfile::TempDir, SessionStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("session.json"));
        (dir, store)
    }

    #[test]
    fn document_layout() {
        let (_dir, store) = store();
        store.start_session(false).unwrap();
        store.append_track(track("A")).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(json["sessionType"], "single");
        assert_eq!(json["totalTracks"], 1);
        assert_eq!(json["tracks"][0]["sourceId"], "A");
        assert!(json["tracks"][0]["localFilePath"].is_null());
        assert_eq!(json["currentTrack"]["title"], "Song");
        assert!(json["lastUpdated"].as_str().unwrap().contains('T'));
    }

    #[test]
    fn single_session_starts_empty() {
        let (_dir, store) = store();
        store.start_session(false).unwrap();
        store.append_track(track("A")).unwrap();
        store.start_session(false).unwrap();
        assert!(store.snapshot().tracks.is_empty());
    }

    #[test]
    fn batch_clears_previous_tracks_exactly_once() {
        let (_dir, store) = store();
        store.start_session(false).unwrap();
        store.append_track(track("OLD")).unwrap();

        store.start_session(true).unwrap();
        assert_eq!(store.snapshot().tracks.len(), 1);
        assert_eq!(store.snapshot().session_type, SessionType::Batch);

        store.append_track(track("A")).unwrap();
        store.append_track(track("B")).unwrap();
        let ids: Vec<_> = store.snapshot().tracks.into_iter().map(|t| t.track.source_id).collect();
        assert_eq!(ids, vec!["A", "B"]);
    }

    #[test]
    fn attach_is_idempotent() {
        let (_dir, store) = store();
        store.start_session(false).unwrap();
        store.append_track(track("A")).unwrap();

        let path = Path::new("/music/Artist - Song.mp3");
        store.attach_local_path("A", path).unwrap();
        let first = store.snapshot();
        store.attach_local_path("A", path).unwrap();
        let second = store.snapshot();

        assert_eq!(first.tracks, second.tracks);
        assert_eq!(first.current_track, second.current_track);
        assert_eq!(
            second.tracks[0].local_file_path.as_deref(),
            Some("/music/Artist - Song.mp3")
        );
        assert!(second.last_updated >= first.last_updated);
    }

    #[test]
    fn attach_last_writer_wins() {
        let (_dir, store) = store();
        store.start_session(false).unwrap();
        store.append_track(track("A")).unwrap();
        store.attach_local_path("A", Path::new("/a.mp3")).unwrap();
        store.attach_local_path("A", Path::new("/b.mp3")).unwrap();
        assert_eq!(store.snapshot().tracks[0].local_file_path.as_deref(), Some("/b.mp3"));
    }

    #[test]
    fn attach_unknown_track_errors() {
        let (_dir, store) = store();
        store.start_session(false).unwrap();
        assert!(matches!(
            store.attach_local_path("nope", Path::new("/x.mp3")),
            Err(SessionError::UnknownTrack(_))
        ));
    }

    #[test]
    fn survives_reload() {
        let (dir, store) = store();
        store.start_session(false).unwrap();
        store.append_track(track("A")).unwrap();
        store.end_session().unwrap();

        let reopened = SessionStore::new(dir.path().join("session.json"));
        reopened.load().unwrap();
        let record = reopened.snapshot();
        assert_eq!(record.total_tracks, 1);
        assert_eq!(record.tracks[0].track, track("A"));
    }

    #[test]
    fn contains_ignores_tracks_pending_clear() {
        let (_dir, store) = store();
        store.start_session(false).unwrap();
        store.append_track(track("A")).unwrap();
        assert!(store.contains("A"));

        store.start_session(true).unwrap();
        assert!(!store.contains("A"));
        store.append_track(track("A")).unwrap();
        assert!(store.contains("A"));
    }

    #[test]
    fn save_rewrites_deleted_document() {
        let (_dir, store) = store();
        store.start_session(false).unwrap();
        store.append_track(track("A")).unwrap();
        std::fs::remove_file(store.path()).unwrap();

        store.save().unwrap();
        let reopened = SessionStore::new(store.path());
        reopened.load().unwrap();
        assert_eq!(reopened.snapshot().tracks.len(), 1);
    }

    #[test]
    fn batch_replaces_corrupt_document() {
        let (dir, store) = store();
        std::fs::write(dir.path().join("session.json"), "{not json").unwrap();

        store.start_session(true).unwrap();
        let record = store.snapshot();
        assert_eq!(record.session_type, SessionType::Batch);
        assert!(record.tracks.is_empty());

        store.append_track(track("A")).unwrap();
        let reopened = SessionStore::new(store.path());
        reopened.load().unwrap();
        assert_eq!(reopened.snapshot().tracks.len(), 1);
    }

    #[test]
    fn corrupt_document_is_reported() {
        let (dir, store) = store();
        std::fs::write(dir.path().join("session.json"), "{not json").unwrap();
        assert!(matches!(store.load(), Err(SessionError::Json { .. })));
    }
}
