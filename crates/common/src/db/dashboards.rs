use super::{now_epoch_secs, Database};
use crate::types::DashboardConfig;
use crate::Result;
use rusqlite::{params, Connection, OptionalExtension};

impl Database {
    // ========================================================================
    // Dashboard operations
    // ========================================================================

    /// Stored dashboard and its last update time.
    pub fn get_dashboard(&self, user_id: i64) -> Result<Option<(DashboardConfig, i64)>> {
        let conn = self.conn.lock();
        let row: Option<(String, i64)> = conn
            .query_row(
                "SELECT config, updated_at FROM dashboards WHERE user_id = ?1",
                params![user_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            Some((json, updated_at)) => Ok(Some((serde_json::from_str(&json)?, updated_at))),
            None => Ok(None),
        }
    }

    pub fn save_dashboard(&self, user_id: i64, config: &DashboardConfig) -> Result<i64> {
        let conn = self.conn.lock();
        let now = now_epoch_secs();
        write_dashboard(&conn, user_id, config, now)?;
        Ok(now)
    }

    pub fn delete_dashboard(&self, user_id: i64) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn.execute("DELETE FROM dashboards WHERE user_id = ?1", params![user_id])?;
        Ok(rows > 0)
    }
}

fn write_dashboard(conn: &Connection, user_id: i64, config: &DashboardConfig, now: i64) -> Result<()> {
    conn.execute(
        "INSERT INTO dashboards (user_id, config, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(user_id) DO UPDATE SET config = ?2, updated_at = ?3",
        params![user_id, serde_json::to_string(config)?, now],
    )?;
    Ok(())
}

/// Drop every tile binding that references `integration_id`. Tiles stay.
pub(super) fn strip_bindings(conn: &Connection, user_id: i64, integration_id: &str) -> Result<usize> {
    let json: Option<String> = conn
        .query_row(
            "SELECT config FROM dashboards WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )
        .optional()?;
    let Some(json) = json else {
        return Ok(0);
    };

    let mut config: DashboardConfig = serde_json::from_str(&json)?;
    let before = config.service_configs.len();
    config
        .service_configs
        .retain(|_, binding| binding.integration_id != integration_id);
    let removed = before - config.service_configs.len();

    if removed > 0 {
        write_dashboard(conn, user_id, &config, now_epoch_secs())?;
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{IntegrationConfig, IntegrationKind, ServiceBinding, Tile};
    use serde_json::json;

    fn tile(i: &str) -> Tile {
        Tile {
            i: i.to_string(),
            x: 0,
            y: Some(0),
            w: 4,
            h: 4,
            title: String::new(),
            widget_type: "adguard".to_string(),
        }
    }

    #[test]
    fn test_dashboard_upsert_and_delete() {
        let db = Database::open_memory().unwrap();
        let user = db.create_user("mia", "mia@example.com", "h", false).unwrap();
        assert!(db.get_dashboard(user.id).unwrap().is_none());

        let mut config = DashboardConfig {
            tiles: vec![tile("a")],
            ..Default::default()
        };
        db.save_dashboard(user.id, &config).unwrap();
        config.tiles.push(tile("b"));
        db.save_dashboard(user.id, &config).unwrap();

        let (stored, _) = db.get_dashboard(user.id).unwrap().unwrap();
        assert_eq!(stored, config);

        assert!(db.delete_dashboard(user.id).unwrap());
        assert!(db.get_dashboard(user.id).unwrap().is_none());
    }

    #[test]
    fn test_deleting_integration_unbinds_tiles() {
        let db = Database::open_memory().unwrap();
        let user = db.create_user("noah", "noah@example.com", "h", false).unwrap();
        let dns = db
            .create_integration(
                user.id,
                "DNS",
                IntegrationConfig::from_value(
                    IntegrationKind::AdGuard,
                    json!({"host": "dns", "username": "u", "password": "p"}),
                )
                .unwrap(),
            )
            .unwrap();

        let mut config = DashboardConfig {
            tiles: vec![tile("a"), tile("b")],
            ..Default::default()
        };
        config.service_configs.insert(
            "a".into(),
            ServiceBinding {
                integration_id: dns.id.clone(),
                node: None,
            },
        );
        config.service_configs.insert(
            "b".into(),
            ServiceBinding {
                integration_id: "adguard-other".into(),
                node: None,
            },
        );
        db.save_dashboard(user.id, &config).unwrap();

        db.delete_integration(user.id, &dns.id).unwrap();

        let (stored, _) = db.get_dashboard(user.id).unwrap().unwrap();
        assert_eq!(stored.tiles.len(), 2);
        assert!(!stored.service_configs.contains_key("a"));
        assert!(stored.service_configs.contains_key("b"));
    }
}
