// Metrics and monitoring

use prometheus::{Counter, Histogram, Registry};
use std::sync::Arc;

/// Handshake engine metrics
pub struct RelayerMetrics {
    // Driver metrics
    pub handshake_rounds: Counter,
    pub handshakes_completed: Counter,
    pub handshakes_failed: Counter,
    pub handshake_duration: Histogram,

    // Dispatch and light client metrics
    pub messages_dispatched: Counter,
    pub dispatch_failures: Counter,
    pub header_sync_failures: Counter,

    registry: Arc<Registry>,
}

impl RelayerMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let handshake_rounds = Counter::new("handshake_rounds_total", "Total handshake rounds started")?;
        let handshakes_completed = Counter::new("handshakes_completed_total", "Total handshakes that reached their terminal state")?;
        let handshakes_failed = Counter::new("handshakes_failed_total", "Total handshakes that failed or timed out")?;
        let handshake_duration = Histogram::with_opts(
            prometheus::HistogramOpts::new("handshake_duration_seconds", "Wall-clock time of a handshake attempt")
        )?;
        let messages_dispatched = Counter::new("handshake_messages_dispatched_total", "Total messages included on chain")?;
        let dispatch_failures = Counter::new("handshake_dispatch_failures_total", "Total failed dispatches")?;
        let header_sync_failures = Counter::new("header_sync_failures_total", "Total failed header synchronizations")?;

        registry.register(Box::new(handshake_rounds.clone()))?;
        registry.register(Box::new(handshakes_completed.clone()))?;
        registry.register(Box::new(handshakes_failed.clone()))?;
        registry.register(Box::new(handshake_duration.clone()))?;
        registry.register(Box::new(messages_dispatched.clone()))?;
        registry.register(Box::new(dispatch_failures.clone()))?;
        registry.register(Box::new(header_sync_failures.clone()))?;

        Ok(Self {
            handshake_rounds,
            handshakes_completed,
            handshakes_failed,
            handshake_duration,
            messages_dispatched,
            dispatch_failures,
            header_sync_failures,
            registry,
        })
    }

    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registered() {
        let metrics = RelayerMetrics::new().unwrap();

        metrics.handshake_rounds.inc();
        metrics.messages_dispatched.inc_by(2.0);
        metrics.handshake_duration.observe(1.5);

        let families = metrics.registry().gather();
        let names: Vec<&str> = families.iter().map(|f| f.get_name()).collect();
        assert!(names.contains(&"handshake_rounds_total"));
        assert!(names.contains(&"handshake_messages_dispatched_total"));
        assert!(names.contains(&"handshake_duration_seconds"));
        assert_eq!(metrics.messages_dispatched.get(), 2.0);
    }
}
