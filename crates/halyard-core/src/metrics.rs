use std::time::{Duration, Instant};

use halyard_protocol::{HalDocument, Link, VIA_REL};
use parking_lot::Mutex;
use serde_json::{json, Value};

/// One upstream fetch attributed to a request.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamTiming {
    pub uri: String,
    pub title: Option<String>,
    pub max_age: Option<u64>,
    pub duration: Duration,
}

#[derive(Debug, Clone)]
struct Measurement {
    description: String,
    count: u64,
    total: Duration,
}

#[derive(Debug, Default)]
struct MetricsState {
    upstream: Vec<UpstreamTiming>,
    measurements: Vec<Measurement>,
    ceiling: Option<u64>,
}

/// Per-request accumulator of upstream timings, stopwatch measurements and
/// the max-age the response may advertise.
///
/// Appends may come from concurrent render or navigation branches.
#[derive(Debug)]
pub struct RequestMetrics {
    title: Option<String>,
    started: Instant,
    state: Mutex<MetricsState>,
}

impl Default for RequestMetrics {
    fn default() -> Self {
        Self::new(None)
    }
}

impl RequestMetrics {
    pub fn new(title: Option<String>) -> Self {
        Self {
            title,
            started: Instant::now(),
            state: Mutex::new(MetricsState::default()),
        }
    }

    pub fn record_upstream(&self, timing: UpstreamTiming) {
        tracing::trace!(
            target: "halyard::metrics",
            uri = %timing.uri,
            max_age = ?timing.max_age,
            elapsed_ms = timing.duration.as_millis() as u64,
            "upstream response"
        );
        self.state.lock().upstream.push(timing);
    }

    /// Adds `duration` to the measurement named `description`; repeated
    /// descriptions are grouped.
    pub fn measure(&self, description: impl Into<String>, duration: Duration) {
        let description = description.into();
        let mut state = self.state.lock();
        match state
            .measurements
            .iter_mut()
            .find(|entry| entry.description == description)
        {
            Some(entry) => {
                entry.count = entry.count.saturating_add(1);
                entry.total += duration;
            }
            None => state.measurements.push(Measurement {
                description,
                count: 1,
                total: duration,
            }),
        }
    }

    /// Starts a measurement that is recorded when the guard drops.
    pub fn stopwatch(&self, description: impl Into<String>) -> Stopwatch<'_> {
        Stopwatch {
            metrics: self,
            description: Some(description.into()),
            started: Instant::now(),
        }
    }

    /// Caps the response max-age; repeated calls keep the smallest value.
    pub fn limit_max_age(&self, secs: u64) {
        let mut state = self.state.lock();
        state.ceiling = Some(state.ceiling.map_or(secs, |current| current.min(secs)));
    }

    pub fn effective_max_age(&self) -> Option<u64> {
        let state = self.state.lock();
        let upstream = state
            .upstream
            .iter()
            .filter_map(|timing| timing.max_age)
            .min();
        match (state.ceiling, upstream) {
            (Some(ceiling), Some(upstream)) => Some(ceiling.min(upstream)),
            (ceiling, upstream) => ceiling.or(upstream),
        }
    }

    pub fn upstream(&self) -> Vec<UpstreamTiming> {
        self.state.lock().upstream.clone()
    }

    pub fn upstream_count(&self) -> usize {
        self.state.lock().upstream.len()
    }

    /// Total and count recorded for `description`, if any.
    pub fn measurement(&self, description: &str) -> Option<(u64, Duration)> {
        self.state
            .lock()
            .measurements
            .iter()
            .find(|entry| entry.description == description)
            .map(|entry| (entry.count, entry.total))
    }

    /// A HAL document summarizing everything recorded so far.
    pub fn diagnostics(&self) -> HalDocument {
        let max_age = self.effective_max_age();
        let state = self.state.lock();

        let mut doc = HalDocument::new()
            .with_field("title", opt_string(self.title.as_deref()))
            .with_field("maxAge", max_age.map_or(Value::Null, Value::from))
            .with_field("totalMs", millis(self.started.elapsed()))
            .with_field("upstreamCount", state.upstream.len() as u64);

        let mut seen: Vec<&str> = Vec::new();
        for timing in &state.upstream {
            if seen.contains(&timing.uri.as_str()) {
                continue;
            }
            seen.push(timing.uri.as_str());
            let mut link = Link::new(timing.uri.clone());
            link.templated = false;
            if let Some(title) = &timing.title {
                link = link.with_title(title.clone());
            }
            doc.push_link(VIA_REL, link);
        }

        let mut timings: Vec<&UpstreamTiming> = state.upstream.iter().collect();
        timings.sort_by(|a, b| b.duration.cmp(&a.duration));
        for timing in timings {
            let mut entry = HalDocument::new()
                .with_field("uri", timing.uri.clone())
                .with_field("title", opt_string(timing.title.as_deref()))
                .with_field("maxAge", timing.max_age.map_or(Value::Null, Value::from))
                .with_field("durationMs", millis(timing.duration));
            entry.set_self_link(Link {
                templated: false,
                ..Link::new(timing.uri.clone())
            });
            doc.push_embedded("responseTimes", entry);
        }

        let mut measurements: Vec<&Measurement> = state.measurements.iter().collect();
        measurements.sort_by(|a, b| b.total.cmp(&a.total));
        for measurement in measurements {
            doc.push_embedded(
                "measurements",
                HalDocument::new()
                    .with_field("description", measurement.description.clone())
                    .with_field("count", measurement.count)
                    .with_field("durationMs", millis(measurement.total)),
            );
        }
        doc
    }
}

fn opt_string(value: Option<&str>) -> Value {
    value.map_or(Value::Null, |s| json!(s))
}

fn millis(duration: Duration) -> Value {
    json!((duration.as_secs_f64() * 1000.0 * 1000.0).round() / 1000.0)
}

/// Records the time between creation and drop as a measurement.
#[must_use = "the measurement is recorded when the stopwatch is dropped"]
pub struct Stopwatch<'a> {
    metrics: &'a RequestMetrics,
    description: Option<String>,
    started: Instant,
}

impl Stopwatch<'_> {
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

impl Drop for Stopwatch<'_> {
    fn drop(&mut self) {
        if let Some(description) = self.description.take() {
            self.metrics.measure(description, self.started.elapsed());
        }
    }
}
