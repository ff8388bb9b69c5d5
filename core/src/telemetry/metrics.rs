use serde::Serialize;
use std::sync::Mutex;

/// Run counters shared by the per-beam workers.
pub struct MetricsRecorder {
    inner: Mutex<MetricsSnapshot>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub beams_corrected: usize,
    pub pb_reprojections: usize,
    pub errors: usize,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MetricsSnapshot::default()),
        }
    }

    pub fn record_corrected(&self) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.beams_corrected += 1;
        }
    }

    pub fn record_reprojection(&self) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.pb_reprojections += 1;
        }
    }

    pub fn record_error(&self) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.errors += 1;
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.inner
            .lock()
            .map(|metrics| *metrics)
            .unwrap_or_default()
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}
