use std::io::Cursor;
use std::path::Path;

use lofty::config::WriteOptions;
use lofty::file::{AudioFile, TaggedFileExt};
use lofty::picture::{Picture, PictureType};
use lofty::prelude::Accessor;
use lofty::read_from_path;
use lofty::tag::{ItemKey, Tag};
use thiserror::Error;

use crate::track::Track;

#[derive(Error, Debug)]
pub enum TagError {
    #[error("Failed to read {path}: {message}")]
    Read { path: String, message: String },
    #[error("No writable tag available for {0}")]
    NoTag(String),
    #[error("Failed to write tags to {path}: {message}")]
    Write { path: String, message: String },
}

/// Values written into the finished MP3.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagFields {
    pub title: String,
    /// Already joined with ", ".
    pub artists: String,
    pub album: Option<String>,
    pub genre: Option<String>,
    pub release_date: Option<String>,
    pub isrc: Option<String>,
    /// Encoded image bytes (JPEG/PNG).
    pub cover: Option<Vec<u8>>,
    pub comment: Option<String>,
}

impl TagFields {
    pub fn from_track(track: &Track, cover: Option<Vec<u8>>, comment: &str) -> Self {
        Self {
            title: track.title.clone(),
            artists: track.artist_line(),
            album: Some(track.album.clone()),
            genre: track.genre.clone(),
            release_date: track.release_date.clone(),
            isrc: track.isrc.clone(),
            cover,
            comment: Some(comment.to_string()),
        }
    }
}

pub trait TagWriter: Send + Sync {
    fn write_tags(&self, path: &Path, fields: &TagFields) -> Result<(), TagError>;
}

/// Writes ID3 (or the container's native tag) through lofty.
pub struct LoftyTagWriter;

impl TagWriter for LoftyTagWriter {
    fn write_tags(&self, path: &Path, fields: &TagFields) -> Result<(), TagError> {
        let display = path.display().to_string();
        let mut tagged_file = read_from_path(path).map_err(|e| TagError::Read {
            path: display.clone(),
            message: e.to_string(),
        })?;

        let tag_type = tagged_file.primary_tag_type();
        if tagged_file.tag(tag_type).is_none() {
            tagged_file.insert_tag(Tag::new(tag_type));
        }
        let tag = tagged_file
            .tag_mut(tag_type)
            .ok_or_else(|| TagError::NoTag(display.clone()))?;

        tag.set_title(fields.title.clone());
        tag.set_artist(fields.artists.clone());
        if let Some(album) = &fields.album {
            tag.set_album(album.clone());
        }
        if let Some(genre) = &fields.genre {
            tag.set_genre(genre.clone());
        }
        if let Some(comment) = &fields.comment {
            tag.set_comment(comment.clone());
        }
        if let Some(date) = &fields.release_date {
            tag.insert_text(ItemKey::RecordingDate, date.clone());
        }
        if let Some(isrc) = &fields.isrc {
            tag.insert_text(ItemKey::Isrc, isrc.clone());
        }

        if let Some(bytes) = &fields.cover {
            match Picture::from_reader(&mut Cursor::new(bytes)) {
                Ok(mut picture) => {
                    picture.set_pic_type(PictureType::CoverFront);
                    tag.remove_picture_type(PictureType::CoverFront);
                    tag.push_picture(picture);
                }
                // A broken image should not cost us the text tags.
                Err(e) => log::warn!("Skipping unreadable cover art for {display}: {e}"),
            }
        }

        tagged_file
            .save_to_path(path, WriteOptions::default())
            .map_err(|e| TagError::Write {
                path: display,
                message: e.to_string(),
            })?;
        log::debug!("Tagged {}", path.display());
        Ok(())
    }
}
