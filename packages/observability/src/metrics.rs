//! Metrics registry with Prometheus text export.

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Keep this many recent samples per histogram.
const MAX_HISTOGRAM_SAMPLES: usize = 10_000;

type LabelSet = Vec<(String, String)>;

fn label_key(name: &str, labels: &[(&str, &str)]) -> (String, LabelSet) {
    let owned: LabelSet = labels
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    (name.to_string(), owned)
}

#[derive(Debug)]
struct Histogram {
    count: AtomicU64,
    sum_micros: AtomicU64,
    samples: Mutex<Vec<f64>>,
}

impl Histogram {
    fn new() -> Self {
        Self {
            count: AtomicU64::new(0),
            sum_micros: AtomicU64::new(0),
            samples: Mutex::new(Vec::new()),
        }
    }

    fn observe(&self, value: f64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum_micros
            .fetch_add((value * 1_000_000.0).max(0.0) as u64, Ordering::Relaxed);
        let mut samples = self.samples.lock();
        samples.push(value);
        if samples.len() > MAX_HISTOGRAM_SAMPLES {
            samples.remove(0);
        }
    }

    fn quantile(&self, q: f64) -> f64 {
        let samples = self.samples.lock();
        if samples.is_empty() {
            return 0.0;
        }
        let mut sorted = samples.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let idx = ((sorted.len() as f64) * q) as usize;
        sorted[idx.min(sorted.len() - 1)]
    }

    fn sum(&self) -> f64 {
        self.sum_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0
    }
}

/// Registry of named, labelled metrics.
#[derive(Default)]
pub struct MetricsRegistry {
    counters: RwLock<HashMap<(String, LabelSet), Arc<AtomicU64>>>,
    gauges: RwLock<HashMap<(String, LabelSet), Arc<AtomicI64>>>,
    histograms: RwLock<HashMap<(String, LabelSet), Arc<Histogram>>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn counter(&self, name: &str, labels: &[(&str, &str)]) -> Arc<AtomicU64> {
        let key = label_key(name, labels);
        if let Some(c) = self.counters.read().get(&key) {
            return c.clone();
        }
        self.counters
            .write()
            .entry(key)
            .or_insert_with(|| Arc::new(AtomicU64::new(0)))
            .clone()
    }

    pub fn inc_counter(&self, name: &str, labels: &[(&str, &str)]) {
        self.add_counter(name, labels, 1);
    }

    pub fn add_counter(&self, name: &str, labels: &[(&str, &str)], delta: u64) {
        self.counter(name, labels).fetch_add(delta, Ordering::Relaxed);
    }

    pub fn counter_value(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        self.counters
            .read()
            .get(&label_key(name, labels))
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn set_gauge(&self, name: &str, labels: &[(&str, &str)], value: i64) {
        let key = label_key(name, labels);
        if let Some(g) = self.gauges.read().get(&key) {
            g.store(value, Ordering::Relaxed);
            return;
        }
        self.gauges
            .write()
            .entry(key)
            .or_insert_with(|| Arc::new(AtomicI64::new(0)))
            .store(value, Ordering::Relaxed);
    }

    pub fn gauge_value(&self, name: &str, labels: &[(&str, &str)]) -> i64 {
        self.gauges
            .read()
            .get(&label_key(name, labels))
            .map(|g| g.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn observe(&self, name: &str, labels: &[(&str, &str)], value: f64) {
        let key = label_key(name, labels);
        let histogram = {
            if let Some(h) = self.histograms.read().get(&key) {
                h.clone()
            } else {
                self.histograms
                    .write()
                    .entry(key)
                    .or_insert_with(|| Arc::new(Histogram::new()))
                    .clone()
            }
        };
        histogram.observe(value);
    }

    pub fn histogram_count(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        self.histograms
            .read()
            .get(&label_key(name, labels))
            .map(|h| h.count.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Start a timer that observes elapsed milliseconds into `name` on drop.
    pub fn start_timer(self: &Arc<Self>, name: &str, labels: &[(&str, &str)]) -> Timer {
        Timer {
            registry: self.clone(),
            name: name.to_string(),
            labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            started: Instant::now(),
        }
    }

    /// Export everything in Prometheus text format.
    pub fn export_prometheus(&self) -> String {
        let mut output = String::new();

        for ((name, labels), counter) in self.counters.read().iter() {
            output.push_str(&format!(
                "{}{} {}\n",
                name,
                format_labels(labels),
                counter.load(Ordering::Relaxed)
            ));
        }
        for ((name, labels), gauge) in self.gauges.read().iter() {
            output.push_str(&format!(
                "{}{} {}\n",
                name,
                format_labels(labels),
                gauge.load(Ordering::Relaxed)
            ));
        }
        for ((name, labels), histogram) in self.histograms.read().iter() {
            let count = histogram.count.load(Ordering::Relaxed);
            output.push_str(&format!(
                "{}_count{} {}\n{}_sum{} {:.6}\n{}_p99{} {:.6}\n",
                name,
                format_labels(labels),
                count,
                name,
                format_labels(labels),
                histogram.sum(),
                name,
                format_labels(labels),
                histogram.quantile(0.99),
            ));
        }

        output
    }
}

fn format_labels(labels: &LabelSet) -> String {
    if labels.is_empty() {
        return String::new();
    }
    let inner: Vec<String> = labels
        .iter()
        .map(|(k, v)| format!("{k}=\"{v}\""))
        .collect();
    format!("{{{}}}", inner.join(","))
}

/// Guard returned by [`MetricsRegistry::start_timer`].
pub struct Timer {
    registry: Arc<MetricsRegistry>,
    name: String,
    labels: LabelSet,
    started: Instant,
}

impl Drop for Timer {
    fn drop(&mut self) {
        let labels: Vec<(&str, &str)> = self
            .labels
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        self.registry.observe(
            &self.name,
            &labels,
            self.started.elapsed().as_secs_f64() * 1000.0,
        );
    }
}
