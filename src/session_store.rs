//! Parks parse sessions between the upload and review/commit invocations.
//! Sessions live as JSON files next to the ledger and are never written to it.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Duration, Utc};
use rand::Rng;
use tracing::debug;

use crate::error::{Result, TallyError};
use crate::session::ParseSession;

const TOKEN_BYTES: usize = 16;

pub struct SessionStore {
    dir: PathBuf,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(data_dir: &Path, ttl: Duration) -> Self {
        Self {
            dir: data_dir.join("sessions"),
            ttl,
        }
    }

    fn path_for(&self, token: &str) -> Result<PathBuf> {
        let well_formed = token.len() == TOKEN_BYTES * 2 && token.chars().all(|c| c.is_ascii_hexdigit());
        if !well_formed {
            return Err(TallyError::SessionNotFound(token.to_string()));
        }
        Ok(self.dir.join(format!("{token}.json")))
    }

    /// Store `session` and return its token.
    pub fn put(&self, session: &ParseSession) -> Result<String> {
        fs::create_dir_all(&self.dir)?;
        self.sweep()?;
        let token = hex::encode(rand::thread_rng().gen::<[u8; TOKEN_BYTES]>());
        let json = serde_json::to_string(session)?;
        fs::write(self.path_for(&token)?, json)?;
        debug!(%token, candidates = session.transaction_count(), "parked parse session");
        Ok(token)
    }

    pub fn get(&self, token: &str) -> Result<ParseSession> {
        let path = self.path_for(token)?;
        let content = fs::read_to_string(&path)
            .map_err(|_| TallyError::SessionNotFound(token.to_string()))?;
        let session: ParseSession = serde_json::from_str(&content)?;
        if self.is_expired(&session) {
            let _ = fs::remove_file(&path);
            return Err(TallyError::SessionNotFound(token.to_string()));
        }
        Ok(session)
    }

    pub fn discard(&self, token: &str) -> Result<()> {
        match fs::remove_file(self.path_for(token)?) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn is_expired(&self, session: &ParseSession) -> bool {
        Utc::now() - session.created_at > self.ttl
    }

    /// Remove expired or unreadable session files. Returns how many went.
    pub fn sweep(&self) -> Result<usize> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let stale = fs::read_to_string(&path)
                .ok()
                .and_then(|c| serde_json::from_str::<ParseSession>(&c).ok())
                .map_or(true, |s| self.is_expired(&s));
            if stale && fs::remove_file(&path).is_ok() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    pub fn count(&self) -> usize {
        fs::read_dir(&self.dir)
            .map(|entries| entries.flatten().count())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{parse_statement_text, ParseOptions};

    fn session() -> ParseSession {
        parse_statement_text("01/15/2025  WALMART #1234  -$45.67", &ParseOptions::default()).unwrap()
    }

    #[test]
    fn test_put_get_discard() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path(), Duration::minutes(30));
        let original = session();
        let token = store.put(&original).unwrap();
        assert_eq!(token.len(), 32);

        assert_eq!(store.get(&token).unwrap(), original);
        store.discard(&token).unwrap();
        store.discard(&token).unwrap();
        assert!(matches!(store.get(&token), Err(TallyError::SessionNotFound(_))));
    }

    #[test]
    fn test_tokens_are_unique() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path(), Duration::minutes(30));
        let a = store.put(&session()).unwrap();
        let b = store.put(&session()).unwrap();
        assert_ne!(a, b);
        assert_eq!(store.count(), 2);
    }

    #[test]
    fn test_expired_session_is_missing_and_swept() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path(), Duration::minutes(30));
        let mut old = session();
        old.created_at = Utc::now() - Duration::hours(2);
        let token = store.put(&old).unwrap();
        assert!(matches!(store.get(&token), Err(TallyError::SessionNotFound(_))));
        assert_eq!(store.count(), 0);
    }

    #[test]
    fn test_rejects_path_like_tokens() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path(), Duration::minutes(30));
        assert!(matches!(
            store.get("../../etc/passwd"),
            Err(TallyError::SessionNotFound(_))
        ));
    }
}
