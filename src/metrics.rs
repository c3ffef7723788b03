//! In-memory request metrics
//!
//! Counts completed requests per method, route and status, keeps a bounded
//! window of latencies per method and route, and tracks requests in flight.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Latencies kept per method and route; older samples are discarded
pub const MAX_LATENCIES_PER_ROUTE: usize = 1000;

#[derive(Default)]
struct Recorded {
    counts: HashMap<String, u64>,
    latencies: HashMap<String, VecDeque<f64>>,
}

/// Request metrics shared by every request
#[derive(Default)]
pub struct RequestMetrics {
    recorded: Mutex<Recorded>,
    in_flight: Arc<AtomicU64>,
}

/// Latency summary for one method and route, in milliseconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    pub count: usize,
    pub min_ms: f64,
    pub max_ms: f64,
    pub avg_ms: f64,
    pub p95_ms: f64,
}

/// Point-in-time copy of the collected metrics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Keyed by `"METHOD route status"`
    pub request_counts: BTreeMap<String, u64>,
    /// Keyed by `"METHOD route"`
    pub request_latencies: BTreeMap<String, LatencySummary>,
    pub in_flight_requests: u64,
}

/// Marks one request as in flight until dropped
pub struct InFlight {
    counter: Arc<AtomicU64>,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::Relaxed);
    }
}

impl RequestMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a request as in flight for the lifetime of the returned guard
    pub fn begin(&self) -> InFlight {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        InFlight {
            counter: Arc::clone(&self.in_flight),
        }
    }

    /// Record a completed request
    pub fn record(&self, method: &str, route: &str, status: u16, elapsed: Duration) {
        let latency_ms = elapsed.as_secs_f64() * 1000.0;
        let mut recorded = self.recorded.lock();

        *recorded
            .counts
            .entry(format!("{} {} {}", method, route, status))
            .or_insert(0) += 1;

        let window = recorded
            .latencies
            .entry(format!("{} {}", method, route))
            .or_default();
        if window.len() == MAX_LATENCIES_PER_ROUTE {
            window.pop_front();
        }
        window.push_back(latency_ms);
    }

    pub fn in_flight(&self) -> u64 {
        self.in_flight.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let recorded = self.recorded.lock();

        let request_latencies = recorded
            .latencies
            .iter()
            .filter_map(|(key, window)| summarize(window).map(|summary| (key.clone(), summary)))
            .collect();

        MetricsSnapshot {
            request_counts: recorded.counts.iter().map(|(k, v)| (k.clone(), *v)).collect(),
            request_latencies,
            in_flight_requests: self.in_flight(),
        }
    }
}

fn summarize(window: &VecDeque<f64>) -> Option<LatencySummary> {
    if window.is_empty() {
        return None;
    }

    let mut sorted: Vec<f64> = window.iter().copied().collect();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let count = sorted.len();
    let p95_index = ((count as f64 * 0.95) as usize).min(count - 1);
    let sum: f64 = sorted.iter().sum();

    Some(LatencySummary {
        count,
        min_ms: round1(sorted[0]),
        max_ms: round1(sorted[count - 1]),
        avg_ms: round1(sum / count as f64),
        p95_ms: round1(sorted[p95_index]),
    })
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
