//! File-backed output store for synthesized audio and generated images.
//!
//! Every file is created fresh (`create_new`), under a generated unique name,
//! so concurrent requests never write to the same path. The only exception is
//! an explicit speech overwrite name, which replaces an existing file.
//!
//! Layout:
//!
//! ```text
//! <audio_dir>/speech_<uuid>.<ext>
//! <image_dir>/<batch uuid>/image_0.<ext>, image_1.<ext>, ...
//! ```

use crate::types::{AudioPayload, ImagePayload, StoredFile};
use crate::{Error, ErrorContext, Result};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct OutputStore {
    audio_dir: PathBuf,
    image_dir: PathBuf,
}

impl OutputStore {
    pub fn new(audio_dir: impl Into<PathBuf>, image_dir: impl Into<PathBuf>) -> Self {
        Self {
            audio_dir: audio_dir.into(),
            image_dir: image_dir.into(),
        }
    }

    pub fn audio_dir(&self) -> &Path {
        &self.audio_dir
    }

    pub fn image_dir(&self) -> &Path {
        &self.image_dir
    }

    /// Writes synthesized audio. With `overwrite_name` the file is written to
    /// exactly that name, replacing any previous content.
    pub async fn store_speech(
        &self,
        audio: &AudioPayload,
        overwrite_name: Option<&str>,
    ) -> Result<StoredFile> {
        tokio::fs::create_dir_all(&self.audio_dir).await?;
        let path = match overwrite_name {
            Some(name) => {
                let name = validate_file_name(name)?;
                let path = self.audio_dir.join(name);
                tokio::fs::write(&path, &audio.data).await?;
                path
            }
            None => {
                let name = format!("speech_{}.{}", Uuid::new_v4().simple(), audio.format.extension());
                let path = self.audio_dir.join(name);
                write_new(&path, &audio.data).await?;
                path
            }
        };
        debug!(path = %path.display(), bytes = audio.data.len(), "speech stored");
        Ok(StoredFile {
            path,
            size_bytes: audio.data.len() as u64,
            media_type: audio.format.mime_type().to_string(),
        })
    }

    /// Writes one batch of images into a new directory; file `i` is `image_{i}`.
    pub async fn store_images(&self, images: &[ImagePayload]) -> Result<Vec<StoredFile>> {
        tokio::fs::create_dir_all(&self.image_dir).await?;
        let batch = self.image_dir.join(Uuid::new_v4().simple().to_string());
        tokio::fs::create_dir(&batch).await?;

        let mut stored = Vec::with_capacity(images.len());
        for (i, image) in images.iter().enumerate() {
            let path = batch.join(format!("image_{}.{}", i, image.format.extension()));
            write_new(&path, &image.data).await?;
            stored.push(StoredFile {
                path,
                size_bytes: image.data.len() as u64,
                media_type: image.format.mime_type().to_string(),
            });
        }
        debug!(dir = %batch.display(), count = stored.len(), "images stored");
        Ok(stored)
    }
}

async fn write_new(path: &Path, data: &[u8]) -> Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    file.write_all(data).await?;
    file.flush().await?;
    Ok(())
}

/// Accepts a bare file name only: no directories, no `..`.
pub(crate) fn validate_file_name(name: &str) -> Result<&str> {
    let trimmed = name.trim();
    let plain = !trimmed.is_empty()
        && trimmed != "."
        && trimmed != ".."
        && !trimmed.contains(|c: char| c == '/' || c == '\\')
        && Path::new(trimmed).file_name().and_then(|n| n.to_str()) == Some(trimmed);
    if plain {
        Ok(trimmed)
    } else {
        Err(Error::validation_with_context(
            format!("'{}' is not a plain file name", name),
            ErrorContext::new()
                .with_field_path("speech.overwrite_name")
                .with_source("output_store"),
        ))
    }
}
