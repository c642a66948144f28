mod common;

use bankflow::application::pipeline::{Pipeline, PipelineState};
use bankflow::config::SimulationConfig;
use bankflow::domain::metrics::QueueName;
use bankflow::domain::transaction::{Transaction, TransactionStatus};
use bankflow::error::PipelineError;
use common::{pipeline_with_stores, quiet_config};
use rust_decimal_macros::dec;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

fn busy_config() -> SimulationConfig {
    SimulationConfig::default()
        .with_corporate_batches((1, 2), (10, 30))
        .with_seed(99)
}

#[tokio::test(start_paused = true)]
async fn test_stop_joins_all_tasks_and_closes_queues() {
    let (pipeline, store, _) = pipeline_with_stores(busy_config());
    pipeline.start().await.unwrap();
    assert_eq!(pipeline.running_tasks().await, 6);

    tokio::time::sleep(Duration::from_secs(20)).await;
    let report = pipeline.stop().await.unwrap();

    assert_eq!(pipeline.state().await, PipelineState::Stopped);
    assert_eq!(pipeline.running_tasks().await, 0);
    for queue in QueueName::ALL {
        assert!(pipeline.is_queue_closed(queue), "{queue} still open");
    }
    assert!(report.queues.iter().all(|m| m.closed));

    // Every recorded outcome is a distinct terminal transaction, one per
    // processed count.
    let outcomes = store.snapshot().await;
    assert!(report.total_processed > 0);
    assert_eq!(outcomes.len() as u64, report.total_processed);
    let ids: HashSet<_> = outcomes.iter().map(|tx| tx.id()).collect();
    assert_eq!(ids.len(), outcomes.len());
    assert!(outcomes.iter().all(|tx| tx.status().is_terminal()));
    let completed = outcomes
        .iter()
        .filter(|tx| tx.status() == TransactionStatus::Completed)
        .count() as u64;
    assert_eq!(completed, report.totals.completed);
    assert_eq!(outcomes.len() as u64 - completed, report.totals.rejected);

    // Abandoned and still-queued work makes up the rest of what was
    // generated, so none of it can be among the outcomes.
    let in_queues: usize = report.queues.iter().map(|m| m.current_length).sum();
    assert_eq!(
        report.totals.generated - outcomes.len() as u64,
        report.totals.abandoned + in_queues as u64
    );
}

#[tokio::test(start_paused = true)]
async fn test_queued_work_is_not_recorded_as_outcome() {
    // Execution is the bottleneck, so work is still queued when the run stops.
    let config = quiet_config()
        .with_auto_screen_rates(1.0, 0.0, 0.0)
        .with_throughput(10.0, 10.0, (0.2, 0.2));
    let (pipeline, store, _) = pipeline_with_stores(config);
    pipeline.start().await.unwrap();

    let mut submitted = HashSet::new();
    for _ in 0..10 {
        let tx = Transaction::corporate_payment(dec!(10.00));
        submitted.insert(tx.id());
        pipeline.submit(tx).await.unwrap();
    }
    tokio::time::sleep(Duration::from_secs(7)).await;
    let report = pipeline.stop().await.unwrap();
    assert_eq!(pipeline.running_tasks().await, 0);

    let outcomes = store.snapshot().await;
    assert_eq!(outcomes.len() as u64, report.total_processed);
    assert_eq!(report.totals.completed, 1);
    assert!(outcomes.iter().all(|tx| submitted.contains(&tx.id())));

    // One transaction was interrupted mid-execution, the rest never left the queue.
    assert_eq!(report.totals.abandoned, 1);
    let queued: usize = report.queues.iter().map(|m| m.current_length).sum();
    assert_eq!(queued, 8);
    assert_eq!(outcomes.len() + queued + report.totals.abandoned as usize, submitted.len());
}

#[tokio::test(start_paused = true)]
async fn test_stop_twice_returns_same_report() {
    let (pipeline, _, _) = pipeline_with_stores(busy_config());
    pipeline.start().await.unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;

    let first = pipeline.stop().await.unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;
    let second = pipeline.stop().await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test(start_paused = true)]
async fn test_start_after_start_fails() {
    let pipeline = Pipeline::new(quiet_config()).unwrap();
    pipeline.start().await.unwrap();
    assert!(matches!(
        pipeline.start().await,
        Err(PipelineError::AlreadyStarted)
    ));
    pipeline.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_no_writes_after_stop() {
    let (pipeline, _, _) = pipeline_with_stores(quiet_config());
    pipeline.start().await.unwrap();
    pipeline.stop().await.unwrap();

    let generated_before = pipeline.snapshot().totals.generated;
    let result = pipeline
        .submit(Transaction::client_transfer(dec!(5.00)))
        .await;
    assert!(result.is_err());
    assert_eq!(pipeline.snapshot().totals.generated, generated_before);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_token_ends_run_early() {
    let config = busy_config().with_run_duration(Duration::from_secs(600));
    let pipeline = Arc::new(Pipeline::new(config).unwrap());
    let cancel = pipeline.cancel_token();

    let runner = {
        let pipeline = pipeline.clone();
        tokio::spawn(async move { pipeline.run().await })
    };
    tokio::time::sleep(Duration::from_secs(3)).await;
    cancel.cancel();

    let report = runner.await.unwrap().unwrap();
    assert!(report.elapsed_secs >= 2.9 && report.elapsed_secs < 4.0);
    assert_eq!(pipeline.state().await, PipelineState::Stopped);
    assert_eq!(pipeline.running_tasks().await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_run_stops_after_configured_duration() {
    let config = busy_config().with_run_duration(Duration::from_secs(30));
    let pipeline = Pipeline::new(config).unwrap();

    let report = pipeline.run().await.unwrap();
    assert!((report.elapsed_secs - 30.0).abs() < 0.5);
    assert!(report.totals.generated > 0);
    assert!(report.throughput_per_hour >= 0.0);
}
