//! Service config loader (strict parsing).

pub mod schema;

use std::fs;
use std::path::Path;

use meterline_core::error::{MeterlineError, Result};

pub use schema::{MetricsSection, ServerSection, ServiceConfig};

/// Env var naming an explicit config file.
pub const CONFIG_ENV: &str = "METERLINE_CONFIG";
/// Picked up from the working directory when present.
pub const DEFAULT_CONFIG_FILE: &str = "meterline.yaml";

/// Resolve the config source: `$METERLINE_CONFIG`, then `./meterline.yaml`, then defaults.
pub fn load() -> Result<ServiceConfig> {
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        tracing::info!(%path, "loading config from {}", CONFIG_ENV);
        return load_from_file(&path);
    }
    if Path::new(DEFAULT_CONFIG_FILE).exists() {
        tracing::info!(path = DEFAULT_CONFIG_FILE, "loading config");
        return load_from_file(DEFAULT_CONFIG_FILE);
    }
    tracing::info!("no config file, using defaults");
    Ok(ServiceConfig::default())
}

pub fn load_from_file(path: &str) -> Result<ServiceConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| MeterlineError::BadConfig(format!("read config {path} failed: {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<ServiceConfig> {
    let cfg: ServiceConfig = serde_yaml::from_str(s)
        .map_err(|e| MeterlineError::BadConfig(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}
