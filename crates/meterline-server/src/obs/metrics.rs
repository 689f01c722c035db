//! In-process metrics registry for the service.
//!
//! Counter and histogram families with labels fixed at creation, backed by
//! `DashMap` shards holding atomics. Series keys are label values in the
//! family's label-name order, so every update is a single shard lookup plus
//! relaxed atomic adds. Histogram bounds are seconds; sums are accumulated in
//! nanoseconds to stay on integer atomics.

use dashmap::DashMap;
use std::fmt::Write;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use meterline_core::error::{MeterlineError, Result};
use meterline_core::expo;

use crate::config::MetricsSection;

/// Labels of the request counter, in key order.
pub const REQUEST_LABELS: [&str; 3] = ["path", "method", "status"];
/// Labels of the latency histogram.
pub const LATENCY_LABELS: [&str; 1] = ["path"];

/// Name, help and label names shared by both family kinds.
#[derive(Debug)]
struct Desc {
    name: String,
    help: String,
    label_names: Vec<String>,
    max_series: usize,
    rejected: AtomicBool,
}

impl Desc {
    fn new(name: &str, help: &str, label_names: &[&str], max_series: usize) -> Self {
        debug_assert!(label_names.iter().all(|n| expo::is_valid_label_name(n)));
        Self {
            name: name.to_string(),
            help: help.to_string(),
            label_names: label_names.iter().map(|s| s.to_string()).collect(),
            max_series: max_series.max(1),
            rejected: AtomicBool::new(false),
        }
    }

    /// True only for the first rejected update of this family.
    fn first_rejection(&self) -> bool {
        !self.rejected.swap(true, Ordering::Relaxed)
    }

    /// Order label values by the family's label names.
    ///
    /// Callers may pass pairs in any order, but the name set must match exactly.
    fn key(&self, labels: &[(&str, &str)]) -> Result<Vec<String>> {
        let mismatch = || MeterlineError::LabelMismatch {
            metric: self.name.clone(),
            expected: self.label_names.clone(),
            got: labels.iter().map(|(k, _)| k.to_string()).collect(),
        };
        if labels.len() != self.label_names.len() {
            return Err(mismatch());
        }
        self.label_names
            .iter()
            .map(|n| {
                labels
                    .iter()
                    .find(|(k, _)| *k == n.as_str())
                    .map(|(_, v)| v.to_string())
                    .ok_or_else(mismatch)
            })
            .collect()
    }

    fn label_map(&self, key: &[String]) -> Vec<(String, String)> {
        self.label_names.iter().cloned().zip(key.iter().cloned()).collect()
    }

    fn limit_reached(&self) -> MeterlineError {
        MeterlineError::CardinalityExceeded {
            metric: self.name.clone(),
            limit: self.max_series,
        }
    }
}

/// Fetch the series for `key`, creating it unless the family is full.
///
/// The len check and the insert are not one atomic step, so under a burst of
/// brand-new keys the cap can be overshot by the number of racing writers.
fn series<'a, V>(
    map: &'a DashMap<Vec<String>, V>,
    desc: &Desc,
    key: Vec<String>,
    init: impl FnOnce() -> V,
) -> Result<dashmap::mapref::one::Ref<'a, Vec<String>, V>> {
    if let Some(existing) = map.get(&key) {
        return Ok(existing);
    }
    if map.len() >= desc.max_series {
        return Err(desc.limit_reached());
    }
    Ok(map.entry(key).or_insert_with(init).downgrade())
}

/// Monotonic counter family.
#[derive(Debug)]
pub struct CounterVec {
    desc: Desc,
    map: DashMap<Vec<String>, AtomicU64>,
}

impl CounterVec {
    pub fn new(name: &str, help: &str, label_names: &[&str], max_series: usize) -> Self {
        Self {
            desc: Desc::new(name, help, label_names, max_series),
            map: DashMap::new(),
        }
    }

    /// Increment by 1.
    pub fn inc(&self, labels: &[(&str, &str)]) -> Result<()> {
        self.add(labels, 1)
    }

    /// Increment by an arbitrary value.
    pub fn add(&self, labels: &[(&str, &str)], v: u64) -> Result<()> {
        let key = self.desc.key(labels)?;
        let counter = series(&self.map, &self.desc, key, || AtomicU64::new(0))?;
        counter.fetch_add(v, Ordering::Relaxed);
        Ok(())
    }

    /// Current value of one series, `None` if it was never incremented.
    pub fn get(&self, labels: &[(&str, &str)]) -> Option<u64> {
        let key = self.desc.key(labels).ok()?;
        self.map.get(&key).map(|c| c.load(Ordering::Relaxed))
    }

    /// All series, sorted by label values.
    pub fn samples(&self) -> Vec<CounterSample> {
        let mut out: Vec<_> = self
            .map
            .iter()
            .map(|r| CounterSample {
                labels: self.desc.label_map(r.key()),
                value: r.value().load(Ordering::Relaxed),
            })
            .collect();
        out.sort_by(|a, b| a.labels.cmp(&b.labels));
        out
    }

    /// Render in Prometheus text exposition format.
    fn render(&self, out: &mut String) {
        let name = &self.desc.name;
        expo::write_header(out, name, &self.desc.help, "counter");
        for s in self.samples() {
            let _ = writeln!(out, "{}{{{}}} {}", name, pairs(&s.labels, None), s.value);
        }
    }
}

struct AtomicHistogram {
    count: AtomicU64,
    sum_nanos: AtomicU64,
    buckets: Box<[AtomicU64]>,
}

impl AtomicHistogram {
    fn new(n: usize) -> Self {
        Self {
            count: AtomicU64::new(0),
            sum_nanos: AtomicU64::new(0),
            buckets: (0..n).map(|_| AtomicU64::new(0)).collect(),
        }
    }
}

/// Histogram family over durations, bucket bounds in seconds.
pub struct HistogramVec {
    desc: Desc,
    bounds: Vec<f64>,
    map: DashMap<Vec<String>, AtomicHistogram>,
}

impl HistogramVec {
    /// `bounds` must be strictly increasing; config validation guarantees it.
    pub fn new(
        name: &str,
        help: &str,
        label_names: &[&str],
        bounds: &[f64],
        max_series: usize,
    ) -> Self {
        Self {
            desc: Desc::new(name, help, label_names, max_series),
            bounds: bounds.to_vec(),
            map: DashMap::new(),
        }
    }

    /// Observe a duration and increment cumulative buckets.
    pub fn observe(&self, labels: &[(&str, &str)], duration: Duration) -> Result<()> {
        let key = self.desc.key(labels)?;
        let n = self.bounds.len();
        let hist = series(&self.map, &self.desc, key, || AtomicHistogram::new(n))?;
        let secs = duration.as_secs_f64();
        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);

        hist.count.fetch_add(1, Ordering::Relaxed);
        hist.sum_nanos.fetch_add(nanos, Ordering::Relaxed);

        // Cumulative: every bucket whose bound is >= the sample.
        for (i, &le) in self.bounds.iter().enumerate() {
            if secs <= le {
                hist.buckets[i].fetch_add(1, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    /// One series, `None` if nothing was observed for it.
    pub fn get(&self, labels: &[(&str, &str)]) -> Option<HistogramSample> {
        let key = self.desc.key(labels).ok()?;
        self.map.get(&key).map(|h| self.sample(&key, &h))
    }

    /// All series, sorted by label values.
    pub fn samples(&self) -> Vec<HistogramSample> {
        let mut out: Vec<_> = self.map.iter().map(|r| self.sample(r.key(), r.value())).collect();
        out.sort_by(|a, b| a.labels.cmp(&b.labels));
        out
    }

    fn sample(&self, key: &[String], hist: &AtomicHistogram) -> HistogramSample {
        HistogramSample {
            labels: self.desc.label_map(key),
            buckets: self
                .bounds
                .iter()
                .zip(hist.buckets.iter())
                .map(|(&le, c)| (le, c.load(Ordering::Relaxed)))
                .collect(),
            count: hist.count.load(Ordering::Relaxed),
            sum: Duration::from_nanos(hist.sum_nanos.load(Ordering::Relaxed)).as_secs_f64(),
        }
    }

    /// Render in Prometheus text exposition format (unit: seconds).
    fn render(&self, out: &mut String) {
        let name = &self.desc.name;
        expo::write_header(out, name, &self.desc.help, "histogram");
        for s in self.samples() {
            for &(le, count) in &s.buckets {
                let le = expo::format_float(le);
                let labels = pairs(&s.labels, Some(&le));
                let _ = writeln!(out, "{}_bucket{{{}}} {}", name, labels, count);
            }
            let inf = pairs(&s.labels, Some("+Inf"));
            let _ = writeln!(out, "{}_bucket{{{}}} {}", name, inf, s.count);
            let _ = writeln!(out, "{}_count{{{}}} {}", name, pairs(&s.labels, None), s.count);
            let _ = writeln!(
                out,
                "{}_sum{{{}}} {}",
                name,
                pairs(&s.labels, None),
                expo::format_float(s.sum)
            );
        }
    }
}

fn pairs(labels: &[(String, String)], le: Option<&str>) -> String {
    let (names, values): (Vec<String>, Vec<String>) = labels
        .iter()
        .cloned()
        .chain(le.map(|le| ("le".to_string(), le.to_string())))
        .unzip();
    expo::label_pairs(&names, &values)
}

/// One counter series.
#[derive(Debug, Clone, PartialEq)]
pub struct CounterSample {
    pub labels: Vec<(String, String)>,
    pub value: u64,
}

/// One histogram series: cumulative `(le, count)` buckets without `+Inf`.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramSample {
    pub labels: Vec<(String, String)>,
    pub buckets: Vec<(f64, u64)>,
    pub count: u64,
    pub sum: f64,
}

/// Point-in-time read of every series in the registry.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSnapshot {
    pub requests: Vec<CounterSample>,
    pub latency: Vec<HistogramSample>,
}

/// The two request metrics plus the draining flag.
pub struct ServiceMetrics {
    pub requests_total: CounterVec,
    pub request_latency: HistogramVec,
    draining: AtomicBool,
}

impl ServiceMetrics {
    pub fn from_config(cfg: &MetricsSection) -> Self {
        Self {
            requests_total: CounterVec::new(
                &cfg.requests_total,
                "Total HTTP requests",
                &REQUEST_LABELS,
                cfg.max_series,
            ),
            request_latency: HistogramVec::new(
                &cfg.request_latency,
                "Request latency",
                &LATENCY_LABELS,
                &cfg.latency_buckets,
                cfg.max_series,
            ),
            draining: AtomicBool::new(false),
        }
    }

    /// Record one finished request on both families.
    ///
    /// Both updates are attempted even if the first fails; the first error is returned.
    pub fn record(&self, path: &str, method: &str, status: u16, elapsed: Duration) -> Result<()> {
        let status = status.to_string();
        let counted = self
            .requests_total
            .inc(&[("path", path), ("method", method), ("status", &status)]);
        let observed = self.request_latency.observe(&[("path", path)], elapsed);
        counted.and(observed)
    }

    /// Whether `err` is the first rejected update of its family.
    ///
    /// Lets callers log the first rejection loudly and the rest quietly.
    pub fn first_rejection(&self, err: &MeterlineError) -> bool {
        match err.metric() {
            Some(m) if m == self.requests_total.desc.name => {
                self.requests_total.desc.first_rejection()
            }
            Some(m) if m == self.request_latency.desc.name => {
                self.request_latency.desc.first_rejection()
            }
            _ => true,
        }
    }

    /// Mark draining state.
    pub fn set_draining(&self) { self.draining.store(true, Ordering::Relaxed); }
    /// Return whether draining is active.
    pub fn is_draining(&self) -> bool { self.draining.load(Ordering::Relaxed) }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests: self.requests_total.samples(),
            latency: self.request_latency.samples(),
        }
    }

    /// Render every family.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.requests_total.render(&mut out);
        self.request_latency.render(&mut out);
        out
    }
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self::from_config(&MetricsSection::default())
    }
}
