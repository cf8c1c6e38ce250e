use super::{dashboards::strip_bindings, now_epoch_secs, Database};
use crate::types::{Integration, IntegrationConfig, IntegrationKind};
use crate::{Error, Result};
use rusqlite::{params, OptionalExtension, Row};
use tracing::debug;

const INTEGRATION_COLUMNS: &str = "id, user_id, name, type, config, created_at, updated_at";

/// Row as stored; `type` and `config` are decoded after the query.
struct RawIntegration {
    id: String,
    user_id: i64,
    name: String,
    kind: String,
    config: String,
    created_at: i64,
    updated_at: i64,
}

impl RawIntegration {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            name: row.get(2)?,
            kind: row.get(3)?,
            config: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }

    fn decode(self) -> Result<Integration> {
        let kind: IntegrationKind = self
            .kind
            .parse()
            .map_err(|e: String| Error::Internal(format!("integration {}: {}", self.id, e)))?;
        let value: serde_json::Value = serde_json::from_str(&self.config)?;
        let config = IntegrationConfig::from_value_unchecked(kind, value)?;
        Ok(Integration {
            id: self.id,
            user_id: self.user_id,
            name: self.name,
            kind,
            config,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// New integration ids look like `proxmox-3f2a...`.
fn new_integration_id(kind: IntegrationKind) -> String {
    format!("{}-{}", kind.as_str(), uuid::Uuid::new_v4().simple())
}

impl Database {
    // ========================================================================
    // Integration operations
    // ========================================================================

    pub fn create_integration(
        &self,
        user_id: i64,
        name: &str,
        config: IntegrationConfig,
    ) -> Result<Integration> {
        let conn = self.conn.lock();
        let now = now_epoch_secs();
        let kind = config.kind();
        let id = new_integration_id(kind);

        conn.execute(
            &format!(
                "INSERT INTO integrations ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                INTEGRATION_COLUMNS
            ),
            params![
                id,
                user_id,
                name,
                kind.as_str(),
                serde_json::to_string(&config)?,
                now,
                now
            ],
        )?;

        debug!("Created {} integration {} for user {}", kind, id, user_id);
        Ok(Integration {
            id,
            user_id,
            name: name.to_string(),
            kind,
            config,
            created_at: now,
            updated_at: now,
        })
    }

    /// Fetch an integration owned by `user_id`. Other users' ids look missing.
    pub fn get_integration(&self, user_id: i64, id: &str) -> Result<Option<Integration>> {
        let raw = {
            let conn = self.conn.lock();
            conn.query_row(
                &format!(
                    "SELECT {} FROM integrations WHERE id = ?1 AND user_id = ?2",
                    INTEGRATION_COLUMNS
                ),
                params![id, user_id],
                RawIntegration::from_row,
            )
            .optional()?
        };
        raw.map(RawIntegration::decode).transpose()
    }

    /// List a user's integrations, newest first, optionally of one kind.
    pub fn list_integrations(
        &self,
        user_id: i64,
        kind: Option<IntegrationKind>,
    ) -> Result<Vec<Integration>> {
        let raws = {
            let conn = self.conn.lock();
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM integrations
                 WHERE user_id = ?1 AND (?2 IS NULL OR type = ?2)
                 ORDER BY created_at DESC, rowid DESC",
                INTEGRATION_COLUMNS
            ))?;
            let rows = stmt.query_map(
                params![user_id, kind.map(|k| k.as_str())],
                RawIntegration::from_row,
            )?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };
        raws.into_iter().map(RawIntegration::decode).collect()
    }

    /// Every integration across all users, for administration.
    pub fn list_all_integrations(&self) -> Result<Vec<Integration>> {
        let raws = {
            let conn = self.conn.lock();
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM integrations ORDER BY user_id, created_at DESC, rowid DESC",
                INTEGRATION_COLUMNS
            ))?;
            let rows = stmt.query_map([], RawIntegration::from_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };
        raws.into_iter().map(RawIntegration::decode).collect()
    }

    /// Replace name and config. The kind of an integration never changes.
    pub fn update_integration(
        &self,
        user_id: i64,
        id: &str,
        name: &str,
        config: IntegrationConfig,
    ) -> Result<Integration> {
        let existing = self
            .get_integration(user_id, id)?
            .ok_or_else(|| Error::not_found("integration", id))?;
        if existing.kind != config.kind() {
            return Err(Error::invalid(format!(
                "integration type cannot change from {} to {}",
                existing.kind,
                config.kind()
            )));
        }

        let now = now_epoch_secs();
        let conn = self.conn.lock();
        let rows = conn.execute(
            "UPDATE integrations SET name = ?1, config = ?2, updated_at = ?3
             WHERE id = ?4 AND user_id = ?5",
            params![name, serde_json::to_string(&config)?, now, id, user_id],
        )?;
        if rows == 0 {
            return Err(Error::not_found("integration", id));
        }

        Ok(Integration {
            name: name.to_string(),
            config,
            updated_at: now,
            ..existing
        })
    }

    /// Delete an integration and every dashboard binding that points at it.
    pub fn delete_integration(&self, user_id: i64, id: &str) -> Result<bool> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let rows = tx.execute(
            "DELETE FROM integrations WHERE id = ?1 AND user_id = ?2",
            params![id, user_id],
        )?;
        if rows > 0 {
            let removed = strip_bindings(&tx, user_id, id)?;
            if removed > 0 {
                debug!("Removed {} dashboard bindings to {}", removed, id);
            }
        }

        tx.commit()?;
        Ok(rows > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn proxmox(host: &str) -> IntegrationConfig {
        IntegrationConfig::from_value(
            IntegrationKind::Proxmox,
            json!({"host": host, "tokenId": "root@pam!nexus", "tokenSecret": "secret"}),
        )
        .unwrap()
    }

    fn adguard() -> IntegrationConfig {
        IntegrationConfig::from_value(
            IntegrationKind::AdGuard,
            json!({"host": "dns.lan", "username": "admin", "password": "pw"}),
        )
        .unwrap()
    }

    #[test]
    fn test_integration_crud() {
        let db = Database::open_memory().unwrap();
        let user = db.create_user("hank", "hank@example.com", "h", false).unwrap();

        let created = db.create_integration(user.id, "PVE", proxmox("pve.lan")).unwrap();
        assert!(created.id.starts_with("proxmox-"));

        let fetched = db.get_integration(user.id, &created.id).unwrap().unwrap();
        assert_eq!(fetched.config, created.config);

        let updated = db
            .update_integration(user.id, &created.id, "PVE 2", proxmox("pve2.lan"))
            .unwrap();
        assert_eq!(updated.name, "PVE 2");
        assert_eq!(updated.config.host(), "pve2.lan");
        assert_eq!(updated.created_at, created.created_at);

        assert!(db.delete_integration(user.id, &created.id).unwrap());
        assert!(!db.delete_integration(user.id, &created.id).unwrap());
    }

    #[test]
    fn test_integrations_are_scoped_per_user() {
        let db = Database::open_memory().unwrap();
        let a = db.create_user("ivy", "ivy@example.com", "h", false).unwrap();
        let b = db.create_user("jack", "jack@example.com", "h", false).unwrap();

        let owned = db.create_integration(a.id, "DNS", adguard()).unwrap();
        assert!(db.get_integration(b.id, &owned.id).unwrap().is_none());
        assert!(!db.delete_integration(b.id, &owned.id).unwrap());
        assert!(db.list_integrations(b.id, None).unwrap().is_empty());
    }

    #[test]
    fn test_list_filters_by_kind_newest_first() {
        let db = Database::open_memory().unwrap();
        let user = db.create_user("kate", "kate@example.com", "h", false).unwrap();

        let first = db.create_integration(user.id, "one", proxmox("a")).unwrap();
        db.create_integration(user.id, "dns", adguard()).unwrap();
        let third = db.create_integration(user.id, "two", proxmox("b")).unwrap();

        let all = db.list_integrations(user.id, None).unwrap();
        assert_eq!(all.len(), 3);

        let pve = db.list_integrations(user.id, Some(IntegrationKind::Proxmox)).unwrap();
        let ids: Vec<_> = pve.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, [third.id.as_str(), first.id.as_str()]);
    }

    #[test]
    fn test_kind_change_rejected() {
        let db = Database::open_memory().unwrap();
        let user = db.create_user("liam", "liam@example.com", "h", false).unwrap();
        let created = db.create_integration(user.id, "PVE", proxmox("pve")).unwrap();
        let err = db.update_integration(user.id, &created.id, "x", adguard()).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
