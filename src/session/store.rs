//! File-backed session store (C8, spec §4.8). Synchronous by design —
//! callers on the async HTTP surface wrap these in
//! `tokio::task::spawn_blocking` (see `handlers::sessions`), the same
//! pattern the teacher uses for its own blocking config-reload path.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, RwLock};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use regex::Regex;
use tokio_util::sync::CancellationToken;

use crate::error::CoreError;
use crate::session::model::{Session, SessionMetadata};

static SESSION_ID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-z0-9][a-z0-9_-]*[a-z0-9]$").unwrap());
pub const SESSION_ID_MAX_LEN: usize = 64;

pub fn validate_session_id(id: &str) -> Result<(), CoreError> {
    if id.len() > SESSION_ID_MAX_LEN || !SESSION_ID_RE.is_match(id) {
        return Err(CoreError::Validation(format!("invalid session id: {id:?}")));
    }
    Ok(())
}

pub struct SessionStore {
    dir: PathBuf,
    max_sessions: usize,
    max_session_size_bytes: u64,
    lock: RwLock<()>,
}

impl SessionStore {
    pub fn new(dir: impl AsRef<Path>, max_sessions: usize, max_session_size_bytes: u64) -> Result<Self, CoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            max_sessions,
            max_session_size_bytes,
            lock: RwLock::new(()),
        })
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json.gz"))
    }

    fn temp_path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!(".{id}.json.gz.tmp"))
    }

    fn session_file_ids(&self) -> Result<Vec<String>, CoreError> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(id) = name.strip_suffix(".json.gz") {
                if !id.starts_with('.') {
                    ids.push(id.to_string());
                }
            }
        }
        Ok(ids)
    }

    pub fn exists(&self, id: &str) -> bool {
        let _guard = self.lock.read().unwrap();
        self.path_for(id).exists()
    }

    /// `Save(session)`, spec §4.8.
    pub fn save(&self, session: &Session, cancel: &CancellationToken) -> Result<(), CoreError> {
        validate_session_id(&session.id)?;
        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }

        let guard = self.lock.write().unwrap();

        let is_update = self.path_for(&session.id).exists();
        if !is_update {
            let count = self.session_file_ids()?.len();
            if count >= self.max_sessions {
                return Err(CoreError::QuotaExceeded(format!(
                    "max_sessions ({}) reached",
                    self.max_sessions
                )));
            }
        }

        let json = serde_json::to_vec(session)?;
        if json.len() as u64 > self.max_session_size_bytes {
            return Err(CoreError::QuotaExceeded(format!(
                "session {} exceeds max_session_size_bytes ({})",
                session.id, self.max_session_size_bytes
            )));
        }

        let temp_path = self.temp_path_for(&session.id);
        {
            let file = fs::File::create(&temp_path)?;
            let mut encoder = GzEncoder::new(file, Compression::default());
            encoder.write_all(&json)?;
            encoder.finish()?;
        }

        if cancel.is_cancelled() {
            let _ = fs::remove_file(&temp_path);
            return Err(CoreError::Cancelled);
        }

        fs::rename(&temp_path, self.path_for(&session.id))?;
        drop(guard);
        Ok(())
    }

    /// `Load(id)`, spec §4.8.
    pub fn load(&self, id: &str) -> Result<Session, CoreError> {
        validate_session_id(id)?;
        let _guard = self.lock.read().unwrap();
        self.load_unlocked(id)
    }

    fn load_unlocked(&self, id: &str) -> Result<Session, CoreError> {
        let path = self.path_for(id);
        let bytes = fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CoreError::NotFound(format!("session {id} not found"))
            } else {
                CoreError::Io(e)
            }
        })?;
        let mut decoder = GzDecoder::new(&bytes[..]);
        let mut json = Vec::new();
        decoder
            .read_to_end(&mut json)
            .map_err(|e| CoreError::CorruptData(format!("gzip: {e}")))?;
        let session: Session = serde_json::from_slice(&json)?;
        Ok(session)
    }

    /// `List()`, spec §4.8: corrupt files are skipped (logged), not
    /// failed; sorted by `created` descending, id ascending on tie
    /// (spec §9 design note).
    pub fn list(&self) -> Result<Vec<SessionMetadata>, CoreError> {
        let _guard = self.lock.read().unwrap();
        let ids = self.session_file_ids()?;
        let mut out = Vec::new();
        for id in ids {
            match self.load_unlocked(&id) {
                Ok(session) => out.push(SessionMetadata::from(&session)),
                Err(e) => tracing::warn!(session_id = %id, error = %e, "skipping corrupt session on list"),
            }
        }
        out.sort_by(|a, b| b.created.cmp(&a.created).then_with(|| a.id.cmp(&b.id)));
        Ok(out)
    }

    /// `Delete(id)`, spec §4.8.
    pub fn delete(&self, id: &str) -> Result<(), CoreError> {
        validate_session_id(id)?;
        let _guard = self.lock.write().unwrap();
        let path = self.path_for(id);
        if !path.exists() {
            return Err(CoreError::NotFound(format!("session {id} not found")));
        }
        fs::remove_file(path)?;
        Ok(())
    }

    /// `GetMetadata(id)`, spec §4.8.
    pub fn get_metadata(&self, id: &str) -> Result<SessionMetadata, CoreError> {
        let session = self.load(id)?;
        Ok(SessionMetadata::from(&session))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::model::{SessionData, SessionStats, SESSION_FORMAT_VERSION};

    fn session(id: &str) -> Session {
        Session {
            version: SESSION_FORMAT_VERSION,
            id: id.to_string(),
            description: "test".to_string(),
            created: chrono::Utc::now(),
            signals: vec!["metrics".to_string()],
            data: SessionData::default(),
            stats: SessionStats::default(),
        }
    }

    fn temp_store(max_sessions: usize) -> (SessionStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path(), max_sessions, 100 * 1024 * 1024).unwrap();
        (store, dir)
    }

    #[test]
    fn session_id_validation_matches_spec_examples() {
        assert!(validate_session_id("snap-1").is_ok());
        assert!(validate_session_id("").is_err());
        assert!(validate_session_id("UPPER").is_err());
        assert!(validate_session_id("has space").is_err());
        assert!(validate_session_id("-leading").is_err());
        assert!(validate_session_id("trailing-").is_err());
        assert!(validate_session_id("special@chars").is_err());
    }

    #[test]
    fn save_then_load_round_trips() {
        let (store, _dir) = temp_store(50);
        let cancel = CancellationToken::new();
        store.save(&session("snap-1"), &cancel).unwrap();
        let loaded = store.load("snap-1").unwrap();
        assert_eq!(loaded.id, "snap-1");
    }

    #[test]
    fn quota_enforced_for_new_sessions_not_updates() {
        let (store, _dir) = temp_store(2);
        let cancel = CancellationToken::new();
        store.save(&session("a"), &cancel).unwrap();
        store.save(&session("b"), &cancel).unwrap();
        assert!(matches!(
            store.save(&session("c"), &cancel),
            Err(CoreError::QuotaExceeded(_))
        ));
        // Updating an existing session is allowed even at quota.
        store.save(&session("a"), &cancel).unwrap();
    }

    #[test]
    fn load_missing_session_is_not_found() {
        let (store, _dir) = temp_store(50);
        assert!(matches!(store.load("missing"), Err(CoreError::NotFound(_))));
    }

    #[test]
    fn list_sorts_by_created_descending_then_id() {
        let (store, _dir) = temp_store(50);
        let cancel = CancellationToken::new();
        let mut older = session("b");
        older.created = chrono::Utc::now() - chrono::Duration::seconds(10);
        let mut newer = session("a");
        newer.created = chrono::Utc::now();
        store.save(&older, &cancel).unwrap();
        store.save(&newer, &cancel).unwrap();

        let listed = store.list().unwrap();
        assert_eq!(listed[0].id, "a");
        assert_eq!(listed[1].id, "b");
    }

    #[test]
    fn delete_removes_session_and_rejects_missing() {
        let (store, _dir) = temp_store(50);
        let cancel = CancellationToken::new();
        store.save(&session("snap-1"), &cancel).unwrap();
        store.delete("snap-1").unwrap();
        assert!(matches!(store.delete("snap-1"), Err(CoreError::NotFound(_))));
    }
}
