//! Disk-backed memo cache for registry documents.
//!
//! Each key maps to `<dir>/<key>.json`. A present file is authoritative
//! forever: there is no TTL and no checksum.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::{HarvesterError, Result};

/// One cache namespace rooted at a directory.
#[derive(Debug, Clone)]
pub struct DiskCache {
    dir: PathBuf,
}

impl DiskCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file backing `key`.
    #[must_use]
    pub fn path_for(&self, key: &str) -> PathBuf {
        debug_assert!(
            !key.is_empty() && !key.contains(['/', '\\']),
            "cache keys must be plain file stems"
        );
        self.dir.join(format!("{key}.json"))
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.path_for(key).is_file()
    }

    /// Read a cached document.
    ///
    /// Returns `Ok(None)` when the key has never been stored. A file that
    /// exists but is not valid JSON is `CacheCorrupt`, never a miss.
    pub fn read(&self, key: &str) -> Result<Option<Value>> {
        let path = self.path_for(key);
        if !path.is_file() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|source| HarvesterError::CacheCorrupt { path, source })
    }

    /// Persist a document under `key`.
    ///
    /// Writes to a hidden temp file and renames it into place, so readers
    /// never see a half-written document.
    pub fn store(&self, key: &str, value: &Value) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;

        let output_file = self.path_for(key);
        let temp_file = self.dir.join(format!(".{key}.json.tmp"));

        {
            let mut writer = BufWriter::new(File::create(&temp_file)?);
            serde_json::to_writer(&mut writer, value)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }

        // On Windows, rename fails if the destination already exists
        #[cfg(target_os = "windows")]
        if output_file.exists() {
            fs::remove_file(&output_file)?;
        }

        fs::rename(&temp_file, &output_file)?;
        Ok(output_file)
    }

    /// Return the cached document for `key`, or fetch and persist it.
    ///
    /// A failed write is logged and swallowed: the fetched document is still
    /// returned, it will simply be fetched again on the next run.
    pub fn get_or_fetch<F>(&self, key: &str, fetch: F) -> Result<Value>
    where
        F: FnOnce() -> Result<Value>,
    {
        if let Some(value) = self.read(key)? {
            tracing::debug!(key, dir = %self.dir.display(), "Cache hit");
            return Ok(value);
        }

        let value = fetch()?;

        if let Err(e) = self.store(key, &value) {
            tracing::warn!(
                key,
                dir = %self.dir.display(),
                error = %e,
                "Failed to write cache entry"
            );
        }

        Ok(value)
    }
}
