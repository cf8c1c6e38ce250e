use super::{now_epoch_secs, Database};
use crate::types::User;
use crate::{Error, Result};
use rusqlite::{params, OptionalExtension, Row};
use tracing::debug;

const USER_COLUMNS: &str = "id, username, email, must_change_password, created_at";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        must_change_password: row.get::<_, i64>(3)? != 0,
        created_at: row.get(4)?,
    })
}

impl Database {
    // ========================================================================
    // User operations
    // ========================================================================

    /// Insert a new user. Username and email are unique, case-insensitively.
    pub fn create_user(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
        must_change_password: bool,
    ) -> Result<User> {
        let conn = self.conn.lock();
        let now = now_epoch_secs();

        let taken: Option<(String, String)> = conn
            .query_row(
                "SELECT username, email FROM users WHERE username = ?1 OR email = ?2 LIMIT 1",
                params![username, email],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        if let Some((existing_name, _)) = taken {
            let (field, value) = if existing_name.eq_ignore_ascii_case(username) {
                ("username", username)
            } else {
                ("email", email)
            };
            return Err(Error::AlreadyExists {
                kind: "user".into(),
                field: field.into(),
                value: value.into(),
            });
        }

        conn.execute(
            "INSERT INTO users (username, email, password_hash, must_change_password, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![username, email, password_hash, must_change_password as i64, now],
        )?;
        let id = conn.last_insert_rowid();

        debug!("Created user {} ({})", username, id);
        Ok(User {
            id,
            username: username.to_string(),
            email: email.to_string(),
            must_change_password,
            created_at: now,
        })
    }

    pub fn get_user(&self, id: i64) -> Result<Option<User>> {
        let conn = self.conn.lock();
        let user = conn
            .query_row(
                &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
                params![id],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let conn = self.conn.lock();
        let user = conn
            .query_row(
                &format!("SELECT {} FROM users WHERE username = ?1", USER_COLUMNS),
                params![username],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    /// Look up a user by username or email together with the stored hash,
    /// for login.
    pub fn find_login(&self, identifier: &str) -> Result<Option<(User, String)>> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                &format!(
                    "SELECT {}, password_hash FROM users WHERE username = ?1 OR email = ?1
                     ORDER BY username = ?1 DESC LIMIT 1",
                    USER_COLUMNS
                ),
                params![identifier],
                |row| Ok((user_from_row(row)?, row.get::<_, String>(5)?)),
            )
            .optional()?;
        Ok(row)
    }

    pub fn get_password_hash(&self, user_id: i64) -> Result<Option<String>> {
        let conn = self.conn.lock();
        let hash = conn
            .query_row(
                "SELECT password_hash FROM users WHERE id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(hash)
    }

    pub fn count_users(&self) -> Result<i64> {
        let conn = self.conn.lock();
        let count = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn list_users(&self) -> Result<Vec<User>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!("SELECT {} FROM users ORDER BY id", USER_COLUMNS))?;
        let rows = stmt.query_map([], user_from_row)?;

        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }
        Ok(users)
    }

    /// Change username and email, keeping both unique.
    pub fn update_profile(&self, user_id: i64, username: &str, email: &str) -> Result<User> {
        let conn = self.conn.lock();

        let clash: Option<String> = conn
            .query_row(
                "SELECT username FROM users WHERE (username = ?1 OR email = ?2) AND id != ?3 LIMIT 1",
                params![username, email, user_id],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(other) = clash {
            let (field, value) = if other.eq_ignore_ascii_case(username) {
                ("username", username)
            } else {
                ("email", email)
            };
            return Err(Error::AlreadyExists {
                kind: "user".into(),
                field: field.into(),
                value: value.into(),
            });
        }

        let rows = conn.execute(
            "UPDATE users SET username = ?1, email = ?2 WHERE id = ?3",
            params![username, email, user_id],
        )?;
        if rows == 0 {
            return Err(Error::not_found("user", user_id.to_string()));
        }

        let user = conn.query_row(
            &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
            params![user_id],
            user_from_row,
        )?;
        Ok(user)
    }

    pub fn set_password(&self, user_id: i64, password_hash: &str, must_change: bool) -> Result<()> {
        let conn = self.conn.lock();
        let rows = conn.execute(
            "UPDATE users SET password_hash = ?1, must_change_password = ?2 WHERE id = ?3",
            params![password_hash, must_change as i64, user_id],
        )?;
        if rows == 0 {
            return Err(Error::not_found("user", user_id.to_string()));
        }
        Ok(())
    }

    /// Delete a user; sessions, integrations and the dashboard cascade.
    pub fn delete_user(&self, user_id: i64) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn.execute("DELETE FROM users WHERE id = ?1", params![user_id])?;
        if rows > 0 {
            debug!("Deleted user {}", user_id);
        }
        Ok(rows > 0)
    }

    // ========================================================================
    // Login attempts
    // ========================================================================

    /// Unix time until which the account is locked, if it is locked now.
    pub fn locked_until(&self, user_id: i64) -> Result<Option<i64>> {
        let conn = self.conn.lock();
        let locked: Option<i64> = conn
            .query_row(
                "SELECT locked_until FROM login_attempts WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(locked.filter(|until| *until > now_epoch_secs()))
    }

    /// Count a failed login. Returns the lock expiry when this failure
    /// tripped the lockout.
    pub fn record_failed_login(
        &self,
        user_id: i64,
        max_failures: i64,
        lockout_secs: i64,
    ) -> Result<Option<i64>> {
        let conn = self.conn.lock();
        let now = now_epoch_secs();

        let failed: i64 = conn
            .query_row(
                "SELECT failed_count FROM login_attempts WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?
            .unwrap_or(0)
            + 1;

        let (failed, locked_until) = if failed >= max_failures {
            (0, now + lockout_secs)
        } else {
            (failed, 0)
        };

        conn.execute(
            "INSERT INTO login_attempts (user_id, failed_count, locked_until, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id) DO UPDATE SET failed_count = ?2, locked_until = ?3, updated_at = ?4",
            params![user_id, failed, locked_until, now],
        )?;

        Ok((locked_until > 0).then_some(locked_until))
    }

    pub fn reset_failed_logins(&self, user_id: i64) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM login_attempts WHERE user_id = ?1", params![user_id])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_crud() {
        let db = Database::open_memory().unwrap();
        let user = db.create_user("alice", "alice@example.com", "hash", false).unwrap();
        assert_eq!(db.count_users().unwrap(), 1);

        let fetched = db.get_user(user.id).unwrap().unwrap();
        assert_eq!(fetched, user);

        let (by_email, hash) = db.find_login("ALICE@example.com").unwrap().unwrap();
        assert_eq!(by_email.id, user.id);
        assert_eq!(hash, "hash");

        let updated = db.update_profile(user.id, "alice2", "a2@example.com").unwrap();
        assert_eq!(updated.username, "alice2");

        db.set_password(user.id, "hash2", true).unwrap();
        assert_eq!(db.get_password_hash(user.id).unwrap().as_deref(), Some("hash2"));
        assert!(db.get_user(user.id).unwrap().unwrap().must_change_password);

        assert!(db.delete_user(user.id).unwrap());
        assert!(db.get_user(user.id).unwrap().is_none());
    }

    #[test]
    fn test_duplicate_username_and_email() {
        let db = Database::open_memory().unwrap();
        db.create_user("bob", "bob@example.com", "h", false).unwrap();

        let err = db.create_user("BOB", "other@example.com", "h", false).unwrap_err();
        assert!(matches!(err, Error::AlreadyExists { ref field, .. } if field == "username"));

        let err = db.create_user("robert", "Bob@Example.com", "h", false).unwrap_err();
        assert!(matches!(err, Error::AlreadyExists { ref field, .. } if field == "email"));

        let carol = db.create_user("carol", "carol@example.com", "h", false).unwrap();
        let err = db.update_profile(carol.id, "bob", "carol@example.com").unwrap_err();
        assert!(matches!(err, Error::AlreadyExists { .. }));
    }

    #[test]
    fn test_lockout_after_max_failures() {
        let db = Database::open_memory().unwrap();
        let user = db.create_user("dave", "dave@example.com", "h", false).unwrap();

        assert_eq!(db.record_failed_login(user.id, 3, 60).unwrap(), None);
        assert_eq!(db.record_failed_login(user.id, 3, 60).unwrap(), None);
        let until = db.record_failed_login(user.id, 3, 60).unwrap();
        assert!(until.is_some());
        assert_eq!(db.locked_until(user.id).unwrap(), until);

        db.reset_failed_logins(user.id).unwrap();
        assert_eq!(db.locked_until(user.id).unwrap(), None);
    }
}
