#![allow(dead_code)]

use bankflow::application::pipeline::Pipeline;
use bankflow::config::SimulationConfig;
use bankflow::domain::metrics::{MetricsSnapshot, QueueName};
use bankflow::infrastructure::in_memory::{InMemoryOutcomeStore, InMemorySnapshotSink};

/// A seeded configuration with no emitters and quick screening stages.
pub fn quiet_config() -> SimulationConfig {
    SimulationConfig::default()
        .without_generators()
        .with_throughput(10.0, 10.0, (5.0, 10.0))
        .with_seed(7)
}

/// A pipeline wired to in-memory adapters the test can inspect.
pub fn pipeline_with_stores(
    config: SimulationConfig,
) -> (Pipeline, InMemoryOutcomeStore, InMemorySnapshotSink) {
    let store = InMemoryOutcomeStore::new();
    let sink = InMemorySnapshotSink::new();
    let pipeline = Pipeline::builder(config)
        .outcome_store(Box::new(store.clone()))
        .snapshot_sink(Box::new(sink.clone()))
        .build()
        .unwrap();
    (pipeline, store, sink)
}

/// Checks the relations every observable snapshot must satisfy.
pub fn assert_snapshot_consistent(snapshot: &MetricsSnapshot) {
    let totals = snapshot.totals;
    assert!(
        totals.completed + totals.rejected <= totals.generated,
        "outcomes exceed generated: {totals:?}"
    );
    assert_eq!(
        totals.rejected,
        totals.rejected_auto + totals.rejected_retry_exhausted + totals.rejected_manual
    );

    for m in &snapshot.queues {
        assert_eq!(m.current_length as u64, m.enqueued - m.dequeued, "{m:?}");
        assert!(m.current_length <= m.peak_length, "{m:?}");
        if let Some(capacity) = m.capacity {
            assert!(m.peak_length <= capacity, "{m:?}");
        }
    }
    for queue in [QueueName::PriorityCheck, QueueName::PriorityExecute] {
        assert!(snapshot.queue(queue).unwrap().capacity.is_some());
    }
}
