use std::io::ErrorKind;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::User;

/// Session file name in the data directory
const SESSION_FILE: &str = "session.json";

/// Token lifetime. The backend issues JWTs valid for 24 hours and offers no
/// refresh endpoint, so an expired session means logging in again.
const TOKEN_EXPIRY_HOURS: i64 = 24;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionData {
    pub token: String,
    pub user: User,
    pub created_at: DateTime<Utc>,
}

impl SessionData {
    pub fn new(token: String, user: User) -> Self {
        Self {
            token,
            user,
            created_at: Utc::now(),
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at()
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.created_at + Duration::hours(TOKEN_EXPIRY_HOURS)
    }
}

/// The persisted login state. The data layer only reads from it.
pub struct Session {
    data_dir: PathBuf,
    pub data: Option<SessionData>,
}

impl Session {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            data: None,
        }
    }

    /// Restore the stored session. Returns whether a still-valid session was
    /// found; an expired one is removed from disk.
    pub fn load(&mut self) -> Result<bool> {
        let path = self.session_path();
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()))
            }
        };
        let data: SessionData = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        if data.is_expired() {
            debug!(username = %data.user.username, "Stored session expired");
            self.clear()?;
            return Ok(false);
        }
        self.data = Some(data);
        Ok(true)
    }

    /// Persist the current session, replacing the file in one rename.
    /// Nothing is written while logged out.
    pub fn save(&self) -> Result<()> {
        let Some(ref data) = self.data else {
            return Ok(());
        };
        std::fs::create_dir_all(&self.data_dir)
            .with_context(|| format!("Failed to create {}", self.data_dir.display()))?;
        let tmp = self.data_dir.join(format!(".{}.tmp", SESSION_FILE));
        std::fs::write(&tmp, serde_json::to_vec_pretty(data)?)?;
        std::fs::rename(&tmp, self.session_path())?;
        Ok(())
    }

    /// Forget the session in memory and on disk.
    pub fn clear(&mut self) -> Result<()> {
        self.data = None;
        match std::fs::remove_file(self.session_path()) {
            Err(e) if e.kind() != ErrorKind::NotFound => {
                Err(e).context("Failed to remove session file")
            }
            _ => Ok(()),
        }
    }

    pub fn update(&mut self, data: SessionData) {
        self.data = Some(data);
    }

    /// Bearer token if the session is still valid
    pub fn token(&self) -> Option<&str> {
        self.data
            .as_ref()
            .filter(|d| !d.is_expired())
            .map(|d| d.token.as_str())
    }

    pub fn is_authenticated(&self) -> bool {
        self.token().is_some()
    }

    pub fn current_user(&self) -> Option<&User> {
        self.data.as_ref().map(|d| &d.user)
    }

    pub fn is_admin(&self) -> bool {
        self.is_authenticated() && self.current_user().map(User::is_admin).unwrap_or(false)
    }

    fn session_path(&self) -> PathBuf {
        self.data_dir.join(SESSION_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    fn user(role: Role) -> User {
        User {
            id: None,
            username: "operator".to_string(),
            role,
        }
    }

    #[test]
    fn test_session_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut session = Session::new(dir.path().to_path_buf());
        assert!(!session.load().expect("load"));

        session.update(SessionData::new("tok".to_string(), user(Role::Admin)));
        session.save().expect("save");

        let mut reloaded = Session::new(dir.path().to_path_buf());
        assert!(reloaded.load().expect("load"));
        assert_eq!(reloaded.token(), Some("tok"));
        assert!(reloaded.is_admin());

        reloaded.clear().expect("clear");
        assert!(!reloaded.is_authenticated());
        assert!(!Session::new(dir.path().to_path_buf()).load().expect("load"));
    }

    #[test]
    fn test_expired_session_has_no_token() {
        let mut data = SessionData::new("old".to_string(), user(Role::User));
        data.created_at = Utc::now() - Duration::hours(TOKEN_EXPIRY_HOURS + 1);
        assert!(data.is_expired());

        let dir = tempfile::tempdir().expect("tempdir");
        let mut session = Session::new(dir.path().to_path_buf());
        session.update(data);
        assert_eq!(session.token(), None);
        assert!(!session.is_admin());

        session.save().expect("save");
        let mut reloaded = Session::new(dir.path().to_path_buf());
        assert!(!reloaded.load().expect("load"));
        assert!(!dir.path().join(SESSION_FILE).exists());
    }

    #[test]
    fn test_unparseable_session_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join(SESSION_FILE), "{").expect("write");
        let mut session = Session::new(dir.path().to_path_buf());
        assert!(session.load().is_err());
        assert!(!session.is_authenticated());
    }
}
