use std::net::SocketAddr;

use serde::Deserialize;
use meterline_core::error::{MeterlineError, Result};
use meterline_core::expo::is_valid_metric_name;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    pub version: u32,

    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub metrics: MetricsSection,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            version: 1,
            server: ServerSection::default(),
            metrics: MetricsSection::default(),
        }
    }
}

impl ServiceConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(MeterlineError::UnsupportedVersion(self.version));
        }
        self.server.validate()?;
        self.metrics.validate()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl ServerSection {
    pub fn validate(&self) -> Result<()> {
        self.listen_addr().map(|_| ())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.listen.parse().map_err(|e| {
            MeterlineError::BadConfig(format!(
                "server.listen {:?} is not a socket address: {e}",
                self.listen
            ))
        })
    }
}

fn default_listen() -> String {
    "0.0.0.0:8000".into()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsSection {
    /// Name of the (path, method, status) request counter.
    #[serde(default = "default_requests_total")]
    pub requests_total: String,

    /// Name of the per-path latency histogram.
    #[serde(default = "default_request_latency")]
    pub request_latency: String,

    /// Upper bucket bounds in seconds; `+Inf` is implicit.
    #[serde(default = "default_latency_buckets")]
    pub latency_buckets: Vec<f64>,

    /// Series cap per metric family.
    #[serde(default = "default_max_series")]
    pub max_series: usize,
}

impl Default for MetricsSection {
    fn default() -> Self {
        Self {
            requests_total: default_requests_total(),
            request_latency: default_request_latency(),
            latency_buckets: default_latency_buckets(),
            max_series: default_max_series(),
        }
    }
}

impl MetricsSection {
    pub fn validate(&self) -> Result<()> {
        for name in [&self.requests_total, &self.request_latency] {
            if !is_valid_metric_name(name) {
                return Err(MeterlineError::BadConfig(format!(
                    "invalid metric name: {name:?}"
                )));
            }
        }
        if self.requests_total == self.request_latency {
            return Err(MeterlineError::BadConfig(
                "metrics.requests_total and metrics.request_latency must differ".into(),
            ));
        }
        if self.latency_buckets.is_empty() {
            return Err(MeterlineError::BadConfig(
                "metrics.latency_buckets must not be empty".into(),
            ));
        }
        if self.latency_buckets.iter().any(|b| !b.is_finite() || *b <= 0.0) {
            return Err(MeterlineError::BadConfig(
                "metrics.latency_buckets must be finite and positive".into(),
            ));
        }
        if self.latency_buckets.windows(2).any(|w| w[0] >= w[1]) {
            return Err(MeterlineError::BadConfig(
                "metrics.latency_buckets must be strictly increasing".into(),
            ));
        }
        if self.max_series == 0 {
            return Err(MeterlineError::BadConfig(
                "metrics.max_series must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

fn default_requests_total() -> String {
    "http_requests_total".into()
}
fn default_request_latency() -> String {
    "request_latency_seconds".into()
}
fn default_latency_buckets() -> Vec<f64> {
    vec![0.005, 0.01, 0.025, 0.05, 0.075, 0.1, 0.25, 0.5, 0.75, 1.0, 2.5, 5.0, 7.5, 10.0]
}
fn default_max_series() -> usize {
    10_000
}
