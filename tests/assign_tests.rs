use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use slotvisor::{
    AssignatorConfig, Assignator, AssignmentRecord, Distribution, EventKind, ItemStatus,
    KnownItems, SchedulerConfig, SlotContext, SlotFn, SlotStep, TaskError, TaskScheduler,
    WorkItem, WorkQueue, WorkerHandle,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

struct Fixture {
    sched: Arc<TaskScheduler<u64>>,
    worker: WorkerHandle,
    assignator: Arc<Assignator<u64>>,
    records: mpsc::UnboundedReceiver<AssignmentRecord>,
}

async fn fixture(lnproc: usize, known: Vec<WorkItem>, cfg: AssignatorConfig) -> Fixture {
    let sched = TaskScheduler::<u64>::new(SchedulerConfig {
        lnproc,
        idle_interval: Duration::from_millis(10),
        manager_interval: Duration::from_millis(50),
        ..SchedulerConfig::default()
    });
    sched
        .set_new_run_task(
            SlotFn::arc("poll", |_ctx: SlotContext, polls: u64| async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok::<_, TaskError>(SlotStep::Continue(polls + 1))
            }),
            None,
            None,
        )
        .unwrap();
    let worker = sched.spawn_worker().await.unwrap();

    let (queue, _producer) = WorkQueue::new();
    let (tx, records) = mpsc::unbounded_channel();
    let assignator = Arc::new(Assignator::new(
        sched.clone(),
        queue,
        tx,
        known.into_iter().collect(),
        cfg,
    ));
    Fixture {
        sched,
        worker,
        assignator,
        records,
    }
}

fn drain(rx: &mut mpsc::UnboundedReceiver<AssignmentRecord>) -> Vec<AssignmentRecord> {
    let mut out = Vec::new();
    while let Ok(rec) = rx.try_recv() {
        out.push(rec);
    }
    out
}

#[tokio::test(start_paused = true)]
async fn all_mode_fills_capacity_and_reports_each_placement() {
    let mut f = fixture(
        2,
        vec![WorkItem::new("s1"), WorkItem::new("s2"), WorkItem::new("s3")],
        AssignatorConfig {
            ts: Duration::from_secs(1),
            ..AssignatorConfig::default()
        },
    )
    .await;

    let producer = f.assignator.queue();
    for id in ["s1", "s2", "s3"] {
        producer.put(id);
    }

    let token = CancellationToken::new();
    let process = f.assignator.clone().spawn(token.clone());
    tokio::time::sleep(Duration::from_millis(1500)).await;

    let records = drain(&mut f.records);
    assert_eq!(
        records,
        vec![
            AssignmentRecord::added("s1", f.worker.worker()),
            AssignmentRecord::added("s2", f.worker.worker()),
        ]
    );
    assert_eq!(f.assignator.assigned_total(), 2);

    let table = f.sched.table().read().await;
    let s1 = table.locate("s1").unwrap();
    let s2 = table.locate("s2").unwrap();
    assert_ne!(s1.1, s2.1);
    assert_eq!(table.status("s3"), ItemStatus::Unassigned);
    assert_eq!(table.status("s1"), ItemStatus::Running);
    assert_eq!(
        table.assigned_items(),
        HashSet::from(["s1".to_string(), "s2".to_string()])
    );
    drop(table);

    // s3 keeps coming back until a slot frees up.
    assert_eq!(producer.unfinished(), 1);
    f.sched.release("s1").await;
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(
        drain(&mut f.records),
        vec![AssignmentRecord::added("s3", f.worker.worker())]
    );
    assert_eq!(producer.unfinished(), 0);

    token.cancel();
    process.await.unwrap().unwrap();
    f.worker.close();
    f.worker.join().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn group_mode_consumes_each_code_once() {
    let mut f = fixture(
        4,
        vec![
            WorkItem::new("s1").with_group("A"),
            WorkItem::new("s2").with_group("A"),
            WorkItem::new("s3").with_group("B"),
        ],
        AssignatorConfig::group(["A"]),
    )
    .await;
    let mut events = f.sched.bus().subscribe();

    let producer = f.assignator.queue();
    producer.put("s1");
    producer.put("s2");
    producer.put("s3");

    let report = f.assignator.run_cycle().await.unwrap();
    assert_eq!(report.drained, 3);
    assert_eq!(report.assigned_count(), 1);
    assert_eq!(report.filtered, 2);
    assert_eq!(report.requeued, 0);
    assert_eq!(
        drain(&mut f.records),
        vec![AssignmentRecord::added("s1", f.worker.worker())]
    );
    assert!(f.assignator.open_groups().is_empty());
    assert_eq!(f.assignator.config().distribution, Distribution::Group);

    // Free capacity does not reopen a consumed code.
    producer.put("s2");
    let report = f.assignator.run_cycle().await.unwrap();
    assert_eq!(report.assigned_count(), 0);
    assert_eq!(report.filtered, 1);
    assert!(drain(&mut f.records).is_empty());
    assert_eq!(producer.unfinished(), 0);

    let mut skipped = 0;
    let mut assigned = Vec::new();
    while let Ok(ev) = events.try_recv() {
        match ev.kind {
            EventKind::ItemSkipped => {
                assert_eq!(ev.reason.as_deref(), Some("group_consumed"));
                skipped += 1;
            }
            EventKind::ItemAssigned => {
                assert_eq!(ev.group.as_deref(), Some("A"));
                assigned.push(ev.item.as_deref().map(str::to_string));
            }
            _ => {}
        }
    }
    assert_eq!(skipped, 3);
    assert_eq!(assigned, vec![Some("s1".to_string())]);

    f.worker.close();
    f.worker.join().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn first_fit_prefers_earlier_workers() {
    let mut f = fixture(
        1,
        vec![WorkItem::new("s1"), WorkItem::new("s2"), WorkItem::new("s3")],
        AssignatorConfig {
            requeue_unassigned: false,
            ..AssignatorConfig::default()
        },
    )
    .await;
    let second = f.sched.spawn_worker().await.unwrap();

    let producer = f.assignator.queue();
    for id in ["s1", "s2", "s3"] {
        producer.put(id);
    }
    let report = f.assignator.run_cycle().await.unwrap();

    assert_eq!(report.no_capacity, 1);
    assert_eq!(report.requeued, 0);
    assert_eq!(
        drain(&mut f.records),
        vec![
            AssignmentRecord::added("s1", f.worker.worker()),
            AssignmentRecord::added("s2", second.worker()),
        ]
    );
    assert_eq!(producer.unfinished(), 0);

    f.worker.close();
    second.close();
    f.worker.join().await.unwrap();
    second.join().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn duplicate_and_unknown_items_are_skipped() {
    let mut f = fixture(
        2,
        vec![WorkItem::new("s1")],
        AssignatorConfig::default(),
    )
    .await;

    let producer = f.assignator.queue();
    producer.put("s1");
    producer.put("s1");
    producer.put("nope");
    let report = f.assignator.run_cycle().await.unwrap();

    assert_eq!(report.assigned_count(), 1);
    assert_eq!(report.already_assigned, 1);
    assert_eq!(report.unknown, 1);
    assert_eq!(drain(&mut f.records).len(), 1);

    // Registering an item later makes it placeable.
    f.assignator.known().insert(WorkItem::new("nope")).await;
    producer.put("nope");
    let report = f.assignator.run_cycle().await.unwrap();
    assert_eq!(report.assigned_count(), 1);

    f.worker.close();
    f.worker.join().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cycle_survives_concurrent_reconciliation() {
    for _ in 0..200 {
        let sched = TaskScheduler::<u64>::new(SchedulerConfig {
            lnproc: 2,
            ..SchedulerConfig::default()
        });
        sched
            .table()
            .lock()
            .await
            .register_worker("w", vec!["a".to_string(), "b".to_string()])
            .unwrap();
        sched.add_task("s1", "w").await.unwrap();

        let (queue, producer) = WorkQueue::new();
        let (tx, mut records) = mpsc::unbounded_channel();
        let asg = Arc::new(Assignator::new(
            sched.clone(),
            queue,
            tx,
            [WorkItem::new("s1")].into_iter().collect(),
            AssignatorConfig::default(),
        ));
        // Unknown ids widen the window between snapshot and placement.
        for n in 0..300 {
            producer.put(format!("ghost-{n}"));
        }
        producer.put("s1");

        let barrier = Arc::new(tokio::sync::Barrier::new(2));
        let cycle = {
            let (asg, barrier) = (asg.clone(), barrier.clone());
            tokio::spawn(async move {
                barrier.wait().await;
                asg.run_cycle().await
            })
        };
        let reconcile = {
            let (sched, barrier) = (sched.clone(), barrier.clone());
            tokio::spawn(async move {
                barrier.wait().await;
                sched.process_sta_manager("w").await
            })
        };

        let report = cycle.await.unwrap().unwrap();
        let bound = reconcile.await.unwrap().unwrap();

        // Exactly one side binds s1.
        assert_eq!(report.assigned_count() + bound, 1);
        assert_eq!(report.unknown, 300);
        assert_eq!(report.assigned_count() + report.already_assigned, 1);
        assert_eq!(drain(&mut records).len(), report.assigned_count());
        assert!(sched.table().read().await.locate("s1").is_some());
        assert_eq!(producer.unfinished(), 0);
    }
}
