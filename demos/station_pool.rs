//! # Station pool
//!
//! Demonstrates the full slotvisor flow:
//! - Two workers with three slots each
//! - Station ids pushed on the inbound queue
//! - Group-free (`All`) placement by the assignator
//! - Per-station polling state threaded through renewing slot loops
//! - Events forwarded to `tracing` through `LogWriter`
//!
//! ```text
//! RUST_LOG=debug cargo run --example station_pool --features logging
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use slotvisor::{
    AssignatorConfig, Assignator, KnownItems, LogWriter, SchedulerConfig, SlotContext, SlotStep,
    SlotWork, Subscribe, SubscriberSet, TaskError, TaskScheduler, WorkItem, WorkQueue,
};

/// Polls one station; finishes it after a fixed number of reads.
struct StationPoller {
    reads_per_station: u64,
}

#[async_trait]
impl SlotWork<u64> for StationPoller {
    fn name(&self) -> &str {
        "station-poller"
    }

    async fn prepare(&self, item: &str, _reads: u64) -> Result<u64, TaskError> {
        tracing::info!(station = item, "connecting");
        Ok(0)
    }

    async fn run(&self, ctx: SlotContext, reads: u64) -> Result<SlotStep<u64>, TaskError> {
        tokio::time::sleep(Duration::from_millis(200)).await;
        let reads = reads + 1;
        tracing::debug!(station = %ctx.item, slot = %ctx.slot, reads, "read");
        if reads >= self.reads_per_station {
            tracing::info!(station = %ctx.item, reads, "station done");
            return Ok(SlotStep::Release(reads));
        }
        Ok(SlotStep::Continue(reads))
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let sched = TaskScheduler::<u64>::new(SchedulerConfig {
        lnproc: 3,
        manager_interval: Duration::from_millis(500),
        ..SchedulerConfig::default()
    });
    sched.set_new_run_task(
        Arc::new(StationPoller {
            reads_per_station: 5,
        }),
        None,
        None,
    )?;

    let token = CancellationToken::new();
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let subscribers = Arc::new(SubscriberSet::new(subs, sched.bus().clone()));
    let listener = Arc::clone(&subscribers).listen(token.clone());

    let workers = vec![sched.spawn_worker().await?, sched.spawn_worker().await?];

    let stations: Vec<String> = (1..=8).map(|n| format!("ST{n:02}")).collect();
    let known: KnownItems = stations.iter().map(WorkItem::new).collect();

    let (queue, producer) = WorkQueue::new();
    let (tx, mut records) = mpsc::unbounded_channel();
    let assignator = Arc::new(Assignator::new(
        sched.clone(),
        queue,
        tx,
        known,
        AssignatorConfig {
            ts: Duration::from_secs(1),
            ..AssignatorConfig::default()
        },
    ));
    let process = Arc::clone(&assignator).spawn(token.clone());

    for station in &stations {
        producer.put(station.as_str());
    }

    let reporter = tokio::spawn(async move {
        while let Some(rec) = records.recv().await {
            println!("{}", serde_json::to_string(&rec).unwrap_or_default());
        }
    });

    producer.join().await;
    tokio::time::sleep(Duration::from_secs(3)).await;
    println!("assigned {} stations", assignator.assigned_total());

    token.cancel();
    process.await??;
    for worker in workers {
        worker.close();
        worker.join().await?;
    }
    drop(assignator);
    reporter.await?;
    listener.await?;
    if let Ok(subscribers) = Arc::try_unwrap(subscribers) {
        subscribers.shutdown().await;
    }
    Ok(())
}
