// Path: crates/telemetry/src/time.rs
use crate::sinks::SettlementMetricsSink;
use std::time::Instant;

/// Measures the duration of a scope and reports it to a sink on drop.
pub struct Timer<'a> {
    sink: &'a dyn SettlementMetricsSink,
    start: Instant,
}

impl<'a> Timer<'a> {
    /// Starts the timer.
    pub fn new(sink: &'a dyn SettlementMetricsSink) -> Self {
        Self {
            sink,
            start: Instant::now(),
        }
    }
}

impl Drop for Timer<'_> {
    fn drop(&mut self) {
        self.sink
            .observe_settlement_duration(self.start.elapsed().as_secs_f64());
    }
}
