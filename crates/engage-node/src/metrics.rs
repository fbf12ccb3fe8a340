use prometheus::{IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::Arc;

#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,

    // Lifecycle
    pub attempts_started: IntCounter,
    pub attempts_accepted: IntCounter,
    pub attempts_rejected: IntCounter,
    pub signal_reports: IntCounter,
    pub tasks_created: IntCounter,

    // Rewards
    pub rewards_credited: IntCounter,
    pub reward_minor_units: IntCounter,

    // Live sync
    pub events_emitted_total: IntCounter,
    pub sse_connections: IntGauge,
    pub sse_messages_sent: IntCounter,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Arc::new(Registry::new());

        let attempts_started =
            IntCounter::new("engage_attempts_started_total", "Attempts started").unwrap();
        let attempts_accepted =
            IntCounter::new("engage_attempts_accepted_total", "Submissions accepted").unwrap();
        let attempts_rejected =
            IntCounter::new("engage_attempts_rejected_total", "Submissions rejected").unwrap();
        let signal_reports =
            IntCounter::new("engage_signal_reports_total", "Signal snapshots reported").unwrap();
        let tasks_created =
            IntCounter::new("engage_tasks_created_total", "Task definitions created").unwrap();
        let rewards_credited =
            IntCounter::new("engage_rewards_credited_total", "Rewards credited").unwrap();
        let reward_minor_units = IntCounter::new(
            "engage_reward_minor_units_total",
            "Reward value credited, in minor currency units",
        )
        .unwrap();
        let events_emitted_total =
            IntCounter::new("engage_events_emitted_total", "Live events emitted").unwrap();
        let sse_connections =
            IntGauge::new("engage_sse_connections", "Open SSE connections").unwrap();
        let sse_messages_sent =
            IntCounter::new("engage_sse_messages_sent_total", "SSE messages sent").unwrap();

        registry
            .register(Box::new(attempts_started.clone()))
            .unwrap();
        registry
            .register(Box::new(attempts_accepted.clone()))
            .unwrap();
        registry
            .register(Box::new(attempts_rejected.clone()))
            .unwrap();
        registry.register(Box::new(signal_reports.clone())).unwrap();
        registry.register(Box::new(tasks_created.clone())).unwrap();
        registry
            .register(Box::new(rewards_credited.clone()))
            .unwrap();
        registry
            .register(Box::new(reward_minor_units.clone()))
            .unwrap();
        registry
            .register(Box::new(events_emitted_total.clone()))
            .unwrap();
        registry
            .register(Box::new(sse_connections.clone()))
            .unwrap();
        registry
            .register(Box::new(sse_messages_sent.clone()))
            .unwrap();

        Self {
            registry,
            attempts_started,
            attempts_accepted,
            attempts_rejected,
            signal_reports,
            tasks_created,
            rewards_credited,
            reward_minor_units,
            events_emitted_total,
            sse_connections,
            sse_messages_sent,
        }
    }

    pub fn gather(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder
            .encode_to_string(&metric_families)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_gather() {
        let metrics = Metrics::new();
        metrics.attempts_started.inc();
        metrics.sse_connections.inc();

        let output = metrics.gather();
        assert!(output.contains("engage_attempts_started_total 1"));
        assert!(output.contains("engage_sse_connections 1"));
    }
}
