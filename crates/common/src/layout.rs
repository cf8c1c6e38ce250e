//! Dashboard layout validation and normalization
//!
//! Dragging and resizing happen in the browser; the server only checks that
//! a submitted layout is well-formed and resolves "append at bottom" tiles
//! to a concrete row so stored layouts are always fully positioned.

use crate::catalog::widget_type;
use crate::types::{DashboardConfig, IntegrationKind};
use crate::{Database, Error, Result};
use std::collections::{HashMap, HashSet};

/// Number of grid columns used by the dashboard.
pub const GRID_COLUMNS: u32 = 12;

/// Upper bound on tiles per dashboard.
pub const MAX_TILES: usize = 200;

const MAX_TILE_ID_LEN: usize = 64;
const MAX_TITLE_LEN: usize = 120;
const MAX_NODE_LEN: usize = 64;

/// Outcome of normalizing a dashboard against the user's integrations.
#[derive(Debug, Default)]
pub struct Normalized {
    pub config: DashboardConfig,
    /// Tile ids whose binding was removed because it referenced an unknown
    /// integration (only populated in lenient mode).
    pub dropped_bindings: Vec<String>,
}

/// Validate and normalize a dashboard.
///
/// `lookup` resolves an integration id to its kind, or `None` when the user
/// has no such integration. In strict mode dangling bindings are an error;
/// otherwise they are dropped and reported.
pub fn normalize<F>(mut config: DashboardConfig, lookup: F, strict: bool) -> Result<Normalized>
where
    F: Fn(&str) -> Option<IntegrationKind>,
{
    if config.tiles.len() > MAX_TILES {
        return Err(Error::invalid(format!(
            "dashboard has {} tiles (max {})",
            config.tiles.len(),
            MAX_TILES
        )));
    }

    let mut seen = HashSet::new();
    for tile in &config.tiles {
        if tile.i.trim().is_empty() || tile.i.chars().count() > MAX_TILE_ID_LEN {
            return Err(Error::invalid("tile id must be 1-64 characters"));
        }
        if !seen.insert(tile.i.as_str()) {
            return Err(Error::invalid(format!("duplicate tile id '{}'", tile.i)));
        }
        if tile.w == 0 || tile.h == 0 {
            return Err(Error::invalid(format!("tile '{}' must be at least 1x1", tile.i)));
        }
        if tile.x.saturating_add(tile.w) > GRID_COLUMNS {
            return Err(Error::invalid(format!(
                "tile '{}' exceeds the {}-column grid",
                tile.i, GRID_COLUMNS
            )));
        }
        if tile.title.chars().count() > MAX_TITLE_LEN {
            return Err(Error::invalid(format!("tile '{}' title too long", tile.i)));
        }
        if widget_type(&tile.widget_type).is_none() {
            return Err(Error::invalid(format!(
                "tile '{}' has unknown type '{}'",
                tile.i, tile.widget_type
            )));
        }
    }

    place_unpositioned(&mut config);

    let mut dropped = Vec::new();
    let mut bindings = std::mem::take(&mut config.service_configs);
    bindings.retain(|tile_id, _| config.tile(tile_id).is_some());

    for (tile_id, mut binding) in bindings {
        let Some(tile) = config.tile(&tile_id) else {
            continue;
        };
        binding.node = binding
            .node
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        if let Some(node) = &binding.node {
            validate_node_name(node)?;
        }
        let expected = widget_type(&tile.widget_type).map(|w| w.integration);
        match lookup(&binding.integration_id) {
            Some(kind) if Some(kind) == expected => {
                config.service_configs.insert(tile_id, binding);
            }
            Some(kind) => {
                return Err(Error::invalid(format!(
                    "tile '{}' of type '{}' cannot use a {} integration",
                    tile_id, tile.widget_type, kind
                )));
            }
            None if strict => {
                return Err(Error::invalid(format!(
                    "tile '{}' references unknown integration '{}'",
                    tile_id, binding.integration_id
                )));
            }
            None => dropped.push(tile_id),
        }
    }

    Ok(Normalized {
        config,
        dropped_bindings: dropped,
    })
}

/// Proxmox node names end up in API paths: 1-64 chars of `[A-Za-z0-9._-]`.
pub fn validate_node_name(node: &str) -> Result<()> {
    let ok = !node.is_empty()
        && node.chars().count() <= MAX_NODE_LEN
        && !node.contains("..")
        && node
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if ok {
        Ok(())
    } else {
        Err(Error::invalid(format!("invalid node name '{}'", node)))
    }
}

/// [`normalize`] against the integrations `user_id` owns in `db`.
pub fn normalize_for_user(
    db: &Database,
    user_id: i64,
    config: DashboardConfig,
    strict: bool,
) -> Result<Normalized> {
    let kinds: HashMap<String, IntegrationKind> = db
        .list_integrations(user_id, None)?
        .into_iter()
        .map(|i| (i.id, i.kind))
        .collect();
    normalize(config, |id| kinds.get(id).copied(), strict)
}

/// Give every tile without a row a concrete one below all positioned tiles,
/// in submission order.
fn place_unpositioned(config: &mut DashboardConfig) {
    let mut bottom = config
        .tiles
        .iter()
        .filter_map(|t| t.y.map(|y| y.saturating_add(t.h)))
        .max()
        .unwrap_or(0);

    for tile in config.tiles.iter_mut().filter(|t| t.y.is_none()) {
        tile.y = Some(bottom);
        bottom = bottom.saturating_add(tile.h);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ServiceBinding, Tile};

    fn tile(i: &str, x: u32, y: Option<u32>, w: u32, h: u32, t: &str) -> Tile {
        Tile {
            i: i.to_string(),
            x,
            y,
            w,
            h,
            title: String::new(),
            widget_type: t.to_string(),
        }
    }

    fn binding(id: &str) -> ServiceBinding {
        ServiceBinding {
            integration_id: id.to_string(),
            node: None,
        }
    }

    fn lookup(id: &str) -> Option<IntegrationKind> {
        match id {
            "proxmox-1" => Some(IntegrationKind::Proxmox),
            "adguard-1" => Some(IntegrationKind::AdGuard),
            _ => None,
        }
    }

    #[test]
    fn test_places_null_rows_at_bottom() {
        let config = DashboardConfig {
            tiles: vec![
                tile("a", 0, Some(0), 6, 4, "proxmox"),
                tile("b", 6, Some(2), 6, 3, "adguard"),
                tile("c", 0, None, 4, 2, "adguard"),
                tile("d", 4, None, 4, 2, "adguard"),
            ],
            ..Default::default()
        };
        let out = normalize(config, lookup, true).unwrap().config;
        assert_eq!(out.tile("c").unwrap().y, Some(5));
        assert_eq!(out.tile("d").unwrap().y, Some(7));
    }

    #[test]
    fn test_rejects_overflowing_tile() {
        let config = DashboardConfig {
            tiles: vec![tile("a", 8, Some(0), 6, 4, "proxmox")],
            ..Default::default()
        };
        assert!(normalize(config, lookup, true).is_err());
    }

    #[test]
    fn test_rejects_duplicate_ids_and_unknown_types() {
        let dup = DashboardConfig {
            tiles: vec![
                tile("a", 0, Some(0), 2, 2, "proxmox"),
                tile("a", 2, Some(0), 2, 2, "proxmox"),
            ],
            ..Default::default()
        };
        assert!(normalize(dup, lookup, true).is_err());

        let unknown = DashboardConfig {
            tiles: vec![tile("a", 0, Some(0), 2, 2, "weather")],
            ..Default::default()
        };
        assert!(normalize(unknown, lookup, true).is_err());
    }

    #[test]
    fn test_binding_kind_must_match_tile() {
        let mut config = DashboardConfig {
            tiles: vec![tile("a", 0, Some(0), 2, 2, "proxmox")],
            ..Default::default()
        };
        config.service_configs.insert("a".into(), binding("adguard-1"));
        assert!(normalize(config, lookup, false).is_err());
    }

    #[test]
    fn test_dangling_binding_strict_vs_lenient() {
        let mut config = DashboardConfig {
            tiles: vec![tile("a", 0, Some(0), 2, 2, "proxmox")],
            ..Default::default()
        };
        config.service_configs.insert("a".into(), binding("proxmox-gone"));

        assert!(normalize(config.clone(), lookup, true).is_err());

        let out = normalize(config, lookup, false).unwrap();
        assert_eq!(out.dropped_bindings, vec!["a".to_string()]);
        assert!(out.config.service_configs.is_empty());
    }

    #[test]
    fn test_bindings_for_removed_tiles_are_pruned() {
        let mut config = DashboardConfig {
            tiles: vec![tile("a", 0, Some(0), 2, 2, "proxmox")],
            ..Default::default()
        };
        config.service_configs.insert("a".into(), binding("proxmox-1"));
        config.service_configs.insert("ghost".into(), binding("proxmox-1"));
        let out = normalize(config, lookup, true).unwrap();
        assert_eq!(out.config.service_configs.len(), 1);
        assert!(out.dropped_bindings.is_empty());
    }

    #[test]
    fn test_normalize_for_user_uses_owned_integrations() {
        use crate::types::{AdGuardConfig, IntegrationConfig};

        let db = Database::open_memory().unwrap();
        let alice = db.create_user("alice", "alice@example.com", "x", false).unwrap();
        let bob = db.create_user("bob", "bob@example.com", "x", false).unwrap();
        let config = IntegrationConfig::AdGuard(AdGuardConfig {
            host: "dns.lan".into(),
            port: 80,
            username: "admin".into(),
            password: "pw".into(),
            https: false,
        });
        let dns = db.create_integration(alice.id, "DNS", config).unwrap();

        let mut dashboard = DashboardConfig {
            tiles: vec![tile("a", 0, Some(0), 4, 2, "adguard")],
            ..Default::default()
        };
        dashboard.service_configs.insert("a".into(), binding(&dns.id));

        assert!(normalize_for_user(&db, alice.id, dashboard.clone(), true).is_ok());
        assert!(normalize_for_user(&db, bob.id, dashboard, true).is_err());
    }

    #[test]
    fn test_limits_count_characters() {
        let config = DashboardConfig {
            tiles: vec![Tile {
                title: "é".repeat(MAX_TITLE_LEN),
                ..tile(&"ü".repeat(MAX_TILE_ID_LEN), 0, Some(0), 2, 2, "proxmox")
            }],
            ..Default::default()
        };
        assert!(normalize(config.clone(), lookup, true).is_ok());

        let mut long = config;
        long.tiles[0].title.push('é');
        assert!(normalize(long, lookup, true).is_err());
    }

    #[test]
    fn test_node_names_are_checked() {
        assert!(validate_node_name("pve-1.lan").is_ok());
        for bad in ["", "pve/..", "pve?x=1", "pve#a", "pve 1", ".."] {
            assert!(validate_node_name(bad).is_err(), "{:?} accepted", bad);
        }

        let mut config = DashboardConfig {
            tiles: vec![tile("a", 0, Some(0), 2, 2, "proxmox")],
            ..Default::default()
        };
        let mut bound = binding("proxmox-1");
        bound.node = Some("pve?x=1".into());
        config.service_configs.insert("a".into(), bound);
        assert!(normalize(config.clone(), lookup, false).is_err());

        config.service_configs.get_mut("a").unwrap().node = Some("  ".into());
        let out = normalize(config, lookup, true).unwrap();
        assert_eq!(out.config.service_configs["a"].node, None);
    }
}
