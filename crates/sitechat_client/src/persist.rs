use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use client_logging::client_info;
use serde::{Deserialize, Serialize};
use sitechat_core::{ChatId, CrawlId};
use tempfile::NamedTempFile;
use thiserror::Error;

pub const SESSION_FILENAME: &str = ".sitechat_session.ron";

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("state directory missing or not writable: {0}")]
    OutputDir(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("malformed session file: {0}")]
    Format(String),
}

/// Ensure the directory exists; create if missing.
pub fn ensure_output_dir(dir: &Path) -> Result<(), PersistError> {
    if dir.exists() {
        let meta = fs::metadata(dir).map_err(|e| PersistError::OutputDir(e.to_string()))?;
        if !meta.is_dir() {
            return Err(PersistError::OutputDir("path is not a directory".into()));
        }
    } else {
        fs::create_dir_all(dir).map_err(|e| PersistError::OutputDir(e.to_string()))?;
    }
    Ok(())
}

/// Atomically write content to `{dir}/{filename}` by writing a temp file then renaming.
pub struct AtomicFileWriter {
    dir: PathBuf,
}

impl AtomicFileWriter {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn write(&self, filename: &str, content: &str) -> Result<PathBuf, PersistError> {
        ensure_output_dir(&self.dir)?;

        let target = self.dir.join(filename);
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.flush()?;
        tmp.as_file_mut().sync_all()?;

        tmp.persist(&target).map_err(|e| PersistError::Io(e.error))?;
        Ok(target)
    }
}

/// The last session that was bound to a chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedSession {
    pub chat_id: ChatId,
    #[serde(default)]
    pub crawl_id: Option<CrawlId>,
}

/// Remembers the active chat across runs in `{dir}/.sitechat_session.ron`.
#[derive(Debug, Clone)]
pub struct SessionCache {
    dir: PathBuf,
}

impl SessionCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(SESSION_FILENAME)
    }

    /// `Ok(None)` when nothing was cached yet.
    pub fn load(&self) -> Result<Option<CachedSession>, PersistError> {
        let path = self.path();
        let content = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let session = ron::from_str(&content).map_err(|e| PersistError::Format(e.to_string()))?;
        Ok(Some(session))
    }

    pub fn save(&self, session: &CachedSession) -> Result<PathBuf, PersistError> {
        let pretty = ron::ser::PrettyConfig::new();
        let content = ron::ser::to_string_pretty(session, pretty)
            .map_err(|e| PersistError::Format(e.to_string()))?;
        let path = AtomicFileWriter::new(self.dir.clone()).write(SESSION_FILENAME, &content)?;
        client_info!("Cached session {} in {:?}", session.chat_id, path);
        Ok(path)
    }

    pub fn clear(&self) -> Result<(), PersistError> {
        match fs::remove_file(self.path()) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
