use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Upper bound on cached response snapshots.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    /// Fallback lifetime for entries without a usable Cache-Control header.
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,
    /// Cron expression for the background purge sweep. Empty disables it.
    #[serde(default = "default_purge_schedule")]
    pub purge_schedule: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            default_ttl_secs: default_ttl_secs(),
            purge_schedule: default_purge_schedule(),
        }
    }
}

fn default_max_entries() -> usize {
    2048
}

fn default_ttl_secs() -> u64 {
    60
}

fn default_purge_schedule() -> String {
    "0 */10 * * * *".to_string()
}
