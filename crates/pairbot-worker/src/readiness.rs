//! One-shot readiness detection over worker diagnostics

/// Marker printed by the review server once it accepts connections
pub const DEFAULT_READINESS_MARKER: &str = "Uvicorn running on http://127.0.0.1:8000";

/// A latch that fires on the first line containing the marker and never again.
///
/// One latch belongs to one run of the worker; a restarted worker gets a fresh
/// latch (or [`ReadinessLatch::reset`]).
#[derive(Debug, Clone)]
pub struct ReadinessLatch {
    marker: String,
    fired: bool,
}

impl ReadinessLatch {
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
            fired: false,
        }
    }

    /// Feed one line. Returns `true` exactly once: on the first matching line.
    pub fn observe(&mut self, line: &str) -> bool {
        if self.fired || self.marker.is_empty() {
            return false;
        }
        if line.contains(&self.marker) {
            self.fired = true;
            return true;
        }
        false
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    pub fn reset(&mut self) {
        self.fired = false;
    }
}

impl Default for ReadinessLatch {
    fn default() -> Self {
        Self::new(DEFAULT_READINESS_MARKER)
    }
}
