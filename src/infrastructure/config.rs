use crate::domain::models::Coordinates;
use crate::infrastructure::error::InfraError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

const APP_JSON: &str = "app.json";
const MAP_JSON: &str = "map.json";
const DEFAULT_BACKEND_BASE_URL: &str = "http://localhost:8080/api";
const BACKEND_URL_KEYS: [&str; 1] = ["ITINERARY_BACKEND_URL"];
const MAX_FETCH_CONCURRENCY: usize = 16;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    pub backend_base_url: String,
    pub fetch_concurrency: usize,
    pub reinitialize_map_after_mutation: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend_base_url: DEFAULT_BACKEND_BASE_URL.to_string(),
            fetch_concurrency: 4,
            reinitialize_map_after_mutation: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MapTimingsConfig {
    pub mutation_refresh_delay_ms: u64,
    pub failure_reinit_delay_ms: u64,
    pub container_retry_delay_ms: u64,
    pub forced_reinit_settle_ms: u64,
}

impl Default for MapTimingsConfig {
    fn default() -> Self {
        Self {
            mutation_refresh_delay_ms: 200,
            failure_reinit_delay_ms: 100,
            container_retry_delay_ms: 100,
            forced_reinit_settle_ms: 4_000,
        }
    }
}

impl MapTimingsConfig {
    pub fn mutation_refresh_delay(&self) -> Duration {
        Duration::from_millis(self.mutation_refresh_delay_ms)
    }

    pub fn failure_reinit_delay(&self) -> Duration {
        Duration::from_millis(self.failure_reinit_delay_ms)
    }

    pub fn container_retry_delay(&self) -> Duration {
        Duration::from_millis(self.container_retry_delay_ms)
    }

    pub fn forced_reinit_settle(&self) -> Duration {
        Duration::from_millis(self.forced_reinit_settle_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MapConfig {
    pub container_id: String,
    /// `[longitude, latitude]`
    pub default_center: [f64; 2],
    pub default_zoom: f64,
    pub focused_zoom: f64,
    pub timings: MapTimingsConfig,
    pub max_consecutive_failures: u32,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            container_id: "container".to_string(),
            default_center: [104.114129, 37.550339],
            default_zoom: 4.0,
            focused_zoom: 11.0,
            timings: MapTimingsConfig::default(),
            max_consecutive_failures: 5,
        }
    }
}

impl MapConfig {
    pub fn default_center(&self) -> Coordinates {
        Coordinates::new(self.default_center[0], self.default_center[1])
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigBundle {
    pub app: AppConfig,
    pub map: MapConfig,
}

fn default_files() -> HashMap<&'static str, serde_json::Value> {
    HashMap::from([
        (
            APP_JSON,
            serde_json::json!({
                "schema": 1,
                "backendBaseUrl": DEFAULT_BACKEND_BASE_URL,
                "fetchConcurrency": 4,
                "reinitializeMapAfterMutation": false
            }),
        ),
        (
            MAP_JSON,
            serde_json::json!({
                "schema": 1,
                "containerId": "container",
                "defaultCenter": [104.114129, 37.550339],
                "defaultZoom": 4,
                "focusedZoom": 11,
                "timings": {
                    "mutationRefreshDelayMs": 200,
                    "failureReinitDelayMs": 100,
                    "containerRetryDelayMs": 100,
                    "forcedReinitSettleMs": 4000
                },
                "maxConsecutiveFailures": 5
            }),
        ),
    ])
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), InfraError> {
    for (name, value) in default_files() {
        let path = config_dir.join(name);
        if !path.exists() {
            let formatted = serde_json::to_string_pretty(&value)?;
            fs::write(path, format!("{formatted}\n"))?;
        }
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, InfraError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != 1 {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

pub fn read_app_config(config_dir: &Path) -> Result<AppConfig, InfraError> {
    let path = config_dir.join(APP_JSON);
    let mut app: AppConfig = serde_json::from_value(read_config(&path)?)?;
    app.backend_base_url = app.backend_base_url.trim().to_string();
    if app.backend_base_url.is_empty() {
        app.backend_base_url = DEFAULT_BACKEND_BASE_URL.to_string();
    }
    app.fetch_concurrency = app.fetch_concurrency.clamp(1, MAX_FETCH_CONCURRENCY);
    Ok(app)
}

pub fn read_map_config(config_dir: &Path) -> Result<MapConfig, InfraError> {
    let path = config_dir.join(MAP_JSON);
    let map: MapConfig = serde_json::from_value(read_config(&path)?)?;
    if map.container_id.trim().is_empty() {
        return Err(InfraError::InvalidConfig(format!(
            "containerId must not be empty in {}",
            path.display()
        )));
    }
    if !map.default_center().is_plottable() {
        return Err(InfraError::InvalidConfig(format!(
            "defaultCenter must be a valid [longitude, latitude] pair in {}",
            path.display()
        )));
    }
    Ok(map)
}

pub fn load_configs(config_dir: &Path) -> Result<ConfigBundle, InfraError> {
    load_configs_with_lookup(config_dir, |key| std::env::var(key).ok())
}

/// Reads both config files, then applies environment overrides fetched through
/// `lookup`.
pub fn load_configs_with_lookup<F>(config_dir: &Path, lookup: F) -> Result<ConfigBundle, InfraError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut app = read_app_config(config_dir)?;
    if let Some(url) = optional_lookup_value(&lookup, &BACKEND_URL_KEYS) {
        app.backend_base_url = url;
    }
    Ok(ConfigBundle {
        app,
        map: read_map_config(config_dir)?,
    })
}

fn optional_lookup_value<F>(lookup: &F, keys: &[&str]) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    for key in keys {
        if let Some(value) = lookup(key) {
            let normalized = value.trim();
            if !normalized.is_empty() {
                return Some(normalized.to_string());
            }
        }
    }
    None
}
