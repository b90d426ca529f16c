use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::store::settings;

/// Beacon tunables. Loaded from the `settings` table at startup; first boot
/// seeds the defaults, subsequent boots read existing values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeaconCfg {
    /// Seconds between automatic pings while the gate is open.
    pub ping_interval_secs: u64,
    /// Seconds between power-source samples.
    pub power_poll_secs: u64,
    /// Seconds between reachability samples.
    pub net_poll_secs: u64,
    /// Address the reachability probe connects to.
    pub net_probe_addr: String,
    /// Reachability connect timeout in seconds.
    pub net_probe_timeout_secs: u64,
}

impl Default for BeaconCfg {
    fn default() -> Self {
        Self {
            ping_interval_secs: 60,
            power_poll_secs: 5,
            net_poll_secs: 15,
            net_probe_addr: "1.1.1.1:443".into(),
            net_probe_timeout_secs: 5,
        }
    }
}

impl BeaconCfg {
    /// Load config from the settings table, seeding missing keys with
    /// defaults first.
    pub async fn load(pool: &SqlitePool) -> Result<Self, sqlx::Error> {
        let defaults = Self::default();
        for (key, value, desc) in defaults.to_entries() {
            settings::seed(pool, key, &value, desc).await?;
        }

        let rows: Vec<(String, String)> = sqlx::query_as("SELECT key, value FROM settings")
            .fetch_all(pool)
            .await?;
        let map: HashMap<String, String> = rows.into_iter().collect();
        Ok(Self::from_map(&map))
    }

    fn from_map(m: &HashMap<String, String>) -> Self {
        let d = Self::default();
        Self {
            ping_interval_secs: get_or(m, "ping_interval_secs", d.ping_interval_secs),
            power_poll_secs: get_or(m, "power_poll_secs", d.power_poll_secs),
            net_poll_secs: get_or(m, "net_poll_secs", d.net_poll_secs),
            net_probe_addr: get_or(m, "net_probe_addr", d.net_probe_addr),
            net_probe_timeout_secs: get_or(m, "net_probe_timeout_secs", d.net_probe_timeout_secs),
        }
    }

    fn to_entries(&self) -> Vec<(&'static str, String, &'static str)> {
        vec![
            (
                "ping_interval_secs",
                self.ping_interval_secs.to_string(),
                "Seconds between automatic pings",
            ),
            (
                "power_poll_secs",
                self.power_poll_secs.to_string(),
                "Power-source poll interval seconds",
            ),
            (
                "net_poll_secs",
                self.net_poll_secs.to_string(),
                "Reachability poll interval seconds",
            ),
            (
                "net_probe_addr",
                self.net_probe_addr.clone(),
                "Reachability probe address",
            ),
            (
                "net_probe_timeout_secs",
                self.net_probe_timeout_secs.to_string(),
                "Reachability connect timeout seconds",
            ),
        ]
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    pub fn power_poll_interval(&self) -> Duration {
        Duration::from_secs(self.power_poll_secs)
    }

    pub fn net_poll_interval(&self) -> Duration {
        Duration::from_secs(self.net_poll_secs)
    }

    pub fn net_probe_timeout(&self) -> Duration {
        Duration::from_secs(self.net_probe_timeout_secs)
    }
}

fn get_or<T: std::str::FromStr>(map: &HashMap<String, String>, key: &str, default: T) -> T {
    map.get(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_pool;

    #[test]
    fn defaults() {
        let cfg = BeaconCfg::default();
        assert_eq!(cfg.ping_interval_secs, 60);
        assert_eq!(cfg.ping_interval(), Duration::from_secs(60));
    }

    #[test]
    fn from_map_ignores_garbage() {
        let mut m = HashMap::new();
        m.insert("ping_interval_secs".to_string(), "not a number".to_string());
        m.insert("net_probe_addr".to_string(), "example.com:80".to_string());
        let cfg = BeaconCfg::from_map(&m);
        assert_eq!(cfg.ping_interval_secs, 60);
        assert_eq!(cfg.net_probe_addr, "example.com:80");
    }

    #[tokio::test]
    async fn first_load_seeds_defaults() {
        let pool = test_pool().await;
        let cfg = BeaconCfg::load(&pool).await.unwrap();
        assert_eq!(cfg.ping_interval_secs, 60);

        let stored = settings::get(&pool, "ping_interval_secs").await.unwrap();
        assert_eq!(stored.as_deref(), Some("60"));
    }

    #[tokio::test]
    async fn load_respects_existing_values() {
        let pool = test_pool().await;
        settings::set(&pool, "ping_interval_secs", "120").await.unwrap();
        let cfg = BeaconCfg::load(&pool).await.unwrap();
        assert_eq!(cfg.ping_interval_secs, 120);
    }
}
