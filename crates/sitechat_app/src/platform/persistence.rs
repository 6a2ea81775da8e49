use std::path::{Path, PathBuf};

use client_logging::{client_info, client_warn};
use sitechat_client::{AtomicFileWriter, PersistError, SessionCache};

pub(crate) fn session_cache(state_dir: &Path) -> SessionCache {
    SessionCache::new(state_dir)
}

/// The chat to resume: the explicit id, else whatever the cache remembers.
pub(crate) fn resume_target(cache: &SessionCache, explicit: Option<String>) -> Option<String> {
    if let Some(chat_id) = explicit.filter(|id| !id.trim().is_empty()) {
        return Some(chat_id);
    }
    match cache.load() {
        Ok(Some(session)) => {
            client_info!("Resuming cached chat {} from {:?}", session.chat_id, cache.path());
            Some(session.chat_id)
        }
        Ok(None) => None,
        Err(err) => {
            client_warn!("Ignoring unreadable session cache {:?}: {}", cache.path(), err);
            None
        }
    }
}

/// Writes `transcript` to `path` atomically.
pub(crate) fn save_transcript(path: &Path, transcript: &str) -> Result<PathBuf, PersistError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| PersistError::OutputDir(format!("{:?} has no file name", path)))?;
    AtomicFileWriter::new(dir).write(filename, transcript)
}
