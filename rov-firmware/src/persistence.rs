use std::path::Path;

use anyhow::{Context, Result};
use rov_types::config::migrate_legacy_json;
use rov_types::RovConfig;
use tokio::fs;
use tracing::{info, warn};

const CONFIG_FILE: &str = "rov-config.json";

/// Load the persisted vehicle configuration. A missing file is not an
/// error — it means first run, and defaults are written back immediately
/// so the file always exists afterward. A corrupt file falls back to
/// defaults without overwriting it, so the operator can inspect it.
pub async fn load_config() -> RovConfig {
    if !Path::new(CONFIG_FILE).exists() {
        info!("no {CONFIG_FILE} found, writing defaults");
        let config = RovConfig::default();
        if let Err(e) = save_config(&config).await {
            warn!("failed to write default config: {e}");
        }
        return config;
    }

    match fs::read_to_string(CONFIG_FILE).await {
        Ok(data) => match serde_json::from_str::<serde_json::Value>(&data) {
            Ok(raw) => {
                let migrated = migrate_legacy_json(raw);
                match serde_json::from_value::<RovConfig>(migrated) {
                    Ok(config) => {
                        info!("loaded {CONFIG_FILE}");
                        config
                    }
                    Err(e) => {
                        warn!("failed to parse {CONFIG_FILE}: {e}, using defaults");
                        RovConfig::default()
                    }
                }
            }
            Err(e) => {
                warn!("{CONFIG_FILE} is not valid JSON: {e}, using defaults");
                RovConfig::default()
            }
        },
        Err(e) => {
            warn!("failed to read {CONFIG_FILE}: {e}, using defaults");
            RovConfig::default()
        }
    }
}

/// Write-replace: serialize to a temp file in the same directory, then
/// rename over the target. A crash mid-write leaves the old file intact
/// rather than a truncated one.
pub async fn save_config(config: &RovConfig) -> Result<()> {
    let json = serde_json::to_string_pretty(config)?;
    let tmp_path = format!("{CONFIG_FILE}.tmp");
    fs::write(&tmp_path, json).await.with_context(|| format!("writing {tmp_path}"))?;
    fs::rename(&tmp_path, CONFIG_FILE).await.with_context(|| format!("renaming {tmp_path} to {CONFIG_FILE}"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::fs as tfs;

    #[tokio::test]
    async fn round_trips_through_disk() {
        let dir = std::env::temp_dir().join(format!("rov-config-test-{:?}", std::thread::current().id()));
        tfs::create_dir_all(&dir).await.unwrap();
        let guard = std::env::current_dir().unwrap();
        std::env::set_current_dir(&dir).unwrap();

        let mut config = RovConfig::default();
        config.power.user_max_power = 55.0;
        save_config(&config).await.unwrap();
        let loaded = load_config().await;
        assert_eq!(loaded.power.user_max_power, 55.0);

        std::env::set_current_dir(guard).unwrap();
        let _ = tfs::remove_dir_all(&dir).await;
    }
}
