use super::{now_epoch_secs, Database};
use crate::types::Session;
use crate::Result;
use rusqlite::{params, OptionalExtension};
use tracing::debug;

impl Database {
    // ========================================================================
    // Session operations
    // ========================================================================

    pub fn create_session(&self, user_id: i64, token_hash: &str, ttl_secs: i64) -> Result<Session> {
        let conn = self.conn.lock();
        let now = now_epoch_secs();
        let session = Session {
            token_hash: token_hash.to_string(),
            user_id,
            created_at: now,
            expires_at: now + ttl_secs,
            last_seen_at: now,
        };

        conn.execute(
            "INSERT INTO sessions (token_hash, user_id, created_at, expires_at, last_seen_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                session.token_hash,
                session.user_id,
                session.created_at,
                session.expires_at,
                session.last_seen_at
            ],
        )?;
        Ok(session)
    }

    /// Fetch a session that has not yet expired.
    pub fn get_session(&self, token_hash: &str) -> Result<Option<Session>> {
        let conn = self.conn.lock();
        let session = conn
            .query_row(
                "SELECT token_hash, user_id, created_at, expires_at, last_seen_at
                 FROM sessions WHERE token_hash = ?1 AND expires_at > ?2",
                params![token_hash, now_epoch_secs()],
                |row| {
                    Ok(Session {
                        token_hash: row.get(0)?,
                        user_id: row.get(1)?,
                        created_at: row.get(2)?,
                        expires_at: row.get(3)?,
                        last_seen_at: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(session)
    }

    pub fn touch_session(&self, token_hash: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE sessions SET last_seen_at = ?1 WHERE token_hash = ?2",
            params![now_epoch_secs(), token_hash],
        )?;
        Ok(())
    }

    pub fn delete_session(&self, token_hash: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn.execute("DELETE FROM sessions WHERE token_hash = ?1", params![token_hash])?;
        Ok(rows > 0)
    }

    /// Revoke every session of a user except `keep`.
    pub fn delete_other_sessions(&self, user_id: i64, keep: &str) -> Result<usize> {
        let conn = self.conn.lock();
        let rows = conn.execute(
            "DELETE FROM sessions WHERE user_id = ?1 AND token_hash != ?2",
            params![user_id, keep],
        )?;
        Ok(rows)
    }

    pub fn delete_user_sessions(&self, user_id: i64) -> Result<usize> {
        let conn = self.conn.lock();
        let rows = conn.execute("DELETE FROM sessions WHERE user_id = ?1", params![user_id])?;
        Ok(rows)
    }

    /// Remove expired sessions. Returns the number deleted.
    pub fn cleanup_expired_sessions(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let rows = conn.execute(
            "DELETE FROM sessions WHERE expires_at <= ?1",
            params![now_epoch_secs()],
        )?;
        if rows > 0 {
            debug!("Removed {} expired sessions", rows);
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_lifecycle() {
        let db = Database::open_memory().unwrap();
        let user = db.create_user("erin", "erin@example.com", "h", false).unwrap();

        let session = db.create_session(user.id, "tok-a", 3600).unwrap();
        assert_eq!(session.expires_at - session.created_at, 3600);
        assert!(db.get_session("tok-a").unwrap().is_some());

        db.create_session(user.id, "tok-b", 3600).unwrap();
        db.create_session(user.id, "tok-c", 3600).unwrap();
        assert_eq!(db.delete_other_sessions(user.id, "tok-a").unwrap(), 2);
        assert!(db.get_session("tok-b").unwrap().is_none());

        assert!(db.delete_session("tok-a").unwrap());
        assert!(db.get_session("tok-a").unwrap().is_none());
    }

    #[test]
    fn test_expired_sessions_are_invisible_and_swept() {
        let db = Database::open_memory().unwrap();
        let user = db.create_user("frank", "frank@example.com", "h", false).unwrap();

        db.create_session(user.id, "old", -10).unwrap();
        db.create_session(user.id, "new", 3600).unwrap();
        assert!(db.get_session("old").unwrap().is_none());

        assert_eq!(db.cleanup_expired_sessions().unwrap(), 1);
        assert!(db.get_session("new").unwrap().is_some());
    }

    #[test]
    fn test_sessions_cascade_with_user() {
        let db = Database::open_memory().unwrap();
        let user = db.create_user("gina", "gina@example.com", "h", false).unwrap();
        db.create_session(user.id, "tok", 3600).unwrap();
        db.delete_user(user.id).unwrap();
        assert!(db.get_session("tok").unwrap().is_none());
    }
}
