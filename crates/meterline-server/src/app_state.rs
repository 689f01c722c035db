//! Shared application state for the meterline server.
//!
//! The metrics registry is built here from config and handed out as an
//! `Arc`, so the instrumentation layer and the `/metrics` handler share one
//! instance without any process-wide global.

use std::sync::Arc;

use crate::config::ServiceConfig;
use crate::obs::metrics::ServiceMetrics;

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
    metrics: Arc<ServiceMetrics>,
}

struct AppStateInner {
    cfg: ServiceConfig,
}

impl AppState {
    /// Build application state with a registry derived from `cfg.metrics`.
    pub fn new(cfg: ServiceConfig) -> Self {
        let metrics = Arc::new(ServiceMetrics::from_config(&cfg.metrics));
        Self::with_metrics(cfg, metrics)
    }

    /// Build application state around an existing registry.
    pub fn with_metrics(cfg: ServiceConfig, metrics: Arc<ServiceMetrics>) -> Self {
        Self {
            inner: Arc::new(AppStateInner { cfg }),
            metrics,
        }
    }

    pub fn cfg(&self) -> &ServiceConfig {
        &self.inner.cfg
    }

    pub fn metrics(&self) -> Arc<ServiceMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn set_draining(&self) {
        self.metrics.set_draining();
    }

    pub fn is_draining(&self) -> bool {
        self.metrics.is_draining()
    }
}
