//! Scheduler scenarios: timed windows, progressive phases, lifecycle.

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use common::{seed_registry, settle_events, Behavior, EventCollector, MockDelivery};
use fleetvisor::{
    BackoffPolicy, BytesPayload, EngineConfig, EventKind, Filter, RetryPolicy,
    RolloutEngine, RolloutPhase, ScheduleError, Scheduler, SchedulerConfig, Update, UpdateStatus,
    UpdateStrategy,
};

struct Harness {
    scheduler: Arc<Scheduler>,
    delivery: Arc<MockDelivery>,
    collector: Arc<EventCollector>,
}

async fn harness(device_count: usize, delivery: MockDelivery) -> Harness {
    let registry: Arc<dyn fleetvisor::DeviceRegistry> = seed_registry(device_count).await;
    let delivery = Arc::new(delivery);
    let engine = Arc::new(
        RolloutEngine::new(
            EngineConfig {
                max_concurrent: 100,
                retry: RetryPolicy {
                    max_attempts: 2,
                    backoff: BackoffPolicy {
                        first: Duration::from_millis(5),
                        max: Duration::from_millis(10),
                        factor: 2.0,
                    },
                },
                event_buffer_size: 1000,
            },
            Arc::clone(&registry),
            Arc::clone(&delivery) as Arc<dyn fleetvisor::Delivery>,
        )
        .expect("engine"),
    );
    let collector = EventCollector::new();
    engine.subscribe_all(collector.clone());

    let scheduler = Arc::new(Scheduler::new(
        SchedulerConfig {
            tick_interval: Duration::from_millis(50),
            max_concurrent_updates: 5,
        },
        engine,
        registry,
    ));
    Harness {
        scheduler,
        delivery,
        collector,
    }
}

async fn wait_for_status(
    scheduler: &Scheduler,
    id: &str,
    want: UpdateStatus,
    timeout: Duration,
) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if let Ok(status) = scheduler.status(id).await {
            if status.status == want {
                return true;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

fn payload() -> Arc<BytesPayload> {
    Arc::new(BytesPayload::new(&b"IMAGE"[..]))
}

#[tokio::test]
async fn immediate_updates_run_on_the_next_tick() {
    let h = harness(3, MockDelivery::new()).await;
    h.scheduler.start().expect("start");

    let update = Update::new("u1", UpdateStrategy::Immediate, Filter::default());
    h.scheduler.schedule(update, payload()).await.expect("schedule");

    assert!(wait_for_status(&h.scheduler, "u1", UpdateStatus::Completed, Duration::from_secs(2)).await);
    let status = h.scheduler.status("u1").await.expect("status");
    assert_eq!(status.completed, 3);
    assert_eq!(h.delivery.sink_count(), 3);

    let done = h.scheduler.list(UpdateStatus::Completed).await;
    assert_eq!(done.len(), 1);
    assert_eq!(done[0].update_id, "u1");

    h.scheduler.stop().await.expect("stop");
}

#[tokio::test]
async fn scheduled_updates_wait_for_their_time_and_window() {
    let h = harness(3, MockDelivery::new()).await;
    h.scheduler.start().expect("start");

    let now = Utc::now();
    let mut update = Update::new("u1", UpdateStrategy::Scheduled, Filter::default());
    update.scheduled_at = Some(now + chrono::Duration::milliseconds(200));
    update.window_start = Some(now + chrono::Duration::milliseconds(200));
    update.window_end = Some(now + chrono::Duration::milliseconds(500));
    h.scheduler.schedule(update, payload()).await.expect("schedule");

    // Still queued well before the scheduled time.
    tokio::time::sleep(Duration::from_millis(120)).await;
    let status = h.scheduler.status("u1").await.expect("status");
    assert_eq!(status.status, UpdateStatus::Scheduled);

    // Dispatched within a tick or two of the scheduled time.
    assert!(wait_for_status(&h.scheduler, "u1", UpdateStatus::Completed, Duration::from_secs(2)).await);

    h.scheduler.stop().await.expect("stop");
}

#[tokio::test]
async fn scheduled_time_past_the_window_never_runs() {
    let h = harness(3, MockDelivery::new()).await;
    h.scheduler.start().expect("start");

    let now = Utc::now();
    let mut update = Update::new("u1", UpdateStrategy::Scheduled, Filter::default());
    update.scheduled_at = Some(now + chrono::Duration::milliseconds(600));
    update.window_start = Some(now + chrono::Duration::milliseconds(200));
    update.window_end = Some(now + chrono::Duration::milliseconds(500));
    h.scheduler.schedule(update, payload()).await.expect("schedule");

    tokio::time::sleep(Duration::from_millis(900)).await;
    let status = h.scheduler.status("u1").await.expect("status");
    assert_eq!(status.status, UpdateStatus::Scheduled);

    h.scheduler.cancel("u1").await.expect("cancel");
    let status = h.scheduler.status("u1").await.expect("status");
    assert_eq!(status.status, UpdateStatus::Cancelled);

    h.scheduler.stop().await.expect("stop");
}

#[tokio::test]
async fn progressive_phases_slice_and_pace_the_fleet() {
    let h = harness(10, MockDelivery::new()).await;
    h.scheduler.start().expect("start");

    let mut update = Update::new("u1", UpdateStrategy::Progressive, Filter::default());
    update.rollout_phases = vec![
        RolloutPhase {
            name: "canary".into(),
            percentage: 10,
            wait_time: Duration::from_millis(100),
            success_rate: 0,
        },
        RolloutPhase {
            name: "wave-2".into(),
            percentage: 40,
            wait_time: Duration::from_millis(100),
            success_rate: 0,
        },
        RolloutPhase {
            name: "rest".into(),
            percentage: 50,
            wait_time: Duration::ZERO,
            success_rate: 0,
        },
    ];
    h.scheduler.schedule(update, payload()).await.expect("schedule");

    assert!(wait_for_status(&h.scheduler, "u1", UpdateStatus::Completed, Duration::from_secs(3)).await);
    settle_events().await;

    // Phase device counts 1 / 4 / 5, visible in the derived updates.
    let started = h.collector.of_kind(EventKind::UpdateStarted);
    let totals: Vec<_> = started.iter().filter_map(|e| e.total_devices).collect();
    assert_eq!(totals, vec![1, 4, 5]);
    assert_eq!(started[0].update_id, "u1:phase1");
    assert_eq!(started[1].update_id, "u1:phase2");
    assert_eq!(started[2].update_id, "u1:phase3");

    // The aggregate spans all phases.
    let status = h.scheduler.status("u1").await.expect("status");
    assert_eq!(status.completed, 10);
    assert_eq!(status.total_devices, 10);

    // Inter-phase pacing: at least the configured wait between the last
    // completion of one phase and the first start of the next.
    let completed = h.collector.of_kind(EventKind::DeviceCompleted);
    let device_started = h.collector.of_kind(EventKind::DeviceStarted);
    for (a, b) in [("u1:phase1", "u1:phase2"), ("u1:phase2", "u1:phase3")] {
        let last_done = completed
            .iter()
            .filter(|e| e.update_id == a)
            .map(|e| e.at)
            .max()
            .expect("phase completions");
        let first_start = device_started
            .iter()
            .filter(|e| e.update_id == b)
            .map(|e| e.at)
            .min()
            .expect("next phase starts");
        let gap = first_start - last_done;
        assert!(
            gap >= chrono::Duration::milliseconds(95),
            "gap {a}->{b} too small: {gap}"
        );
    }

    h.scheduler.stop().await.expect("stop");
}

#[tokio::test]
async fn progressive_success_gate_aborts_remaining_phases() {
    let delivery = MockDelivery::new();
    delivery.set_behavior("d1", Behavior::Permanent);
    let h = harness(10, delivery).await;
    h.scheduler.start().expect("start");

    let mut update = Update::new("u1", UpdateStrategy::Progressive, Filter::default());
    update.rollout_phases = vec![
        RolloutPhase {
            name: "canary".into(),
            percentage: 50,
            wait_time: Duration::from_millis(10),
            success_rate: 100,
        },
        RolloutPhase {
            name: "rest".into(),
            percentage: 50,
            wait_time: Duration::ZERO,
            success_rate: 0,
        },
    ];
    h.scheduler.schedule(update, payload()).await.expect("schedule");

    assert!(wait_for_status(&h.scheduler, "u1", UpdateStatus::Failed, Duration::from_secs(3)).await);
    settle_events().await;

    // Only the first phase ran: 5 devices, one of them rejected.
    let started = h.collector.of_kind(EventKind::UpdateStarted);
    assert_eq!(started.len(), 1);
    assert_eq!(started[0].update_id, "u1:phase1");
    assert_eq!(h.collector.count(EventKind::DeviceStarted), 5);
    assert_eq!(h.collector.count(EventKind::UpdateFailed), 1);

    h.scheduler.stop().await.expect("stop");
}

#[tokio::test]
async fn cancelling_a_running_update_is_terminal() {
    let h = harness(20, MockDelivery::with_delay(Duration::from_millis(150))).await;
    h.scheduler.start().expect("start");

    let update = Update::new("u1", UpdateStrategy::Immediate, Filter::default());
    h.scheduler.schedule(update, payload()).await.expect("schedule");

    assert!(wait_for_status(&h.scheduler, "u1", UpdateStatus::InProgress, Duration::from_secs(2)).await);
    h.scheduler.cancel("u1").await.expect("cancel");

    let status = h.scheduler.status("u1").await.expect("status");
    assert_eq!(status.status, UpdateStatus::Cancelled);

    // The dispatch finishing must not overwrite the cancellation.
    tokio::time::sleep(Duration::from_millis(600)).await;
    let status = h.scheduler.status("u1").await.expect("status");
    assert_eq!(status.status, UpdateStatus::Cancelled);

    settle_events().await;
    assert_eq!(h.collector.count(EventKind::UpdateCancelled), 1);

    h.scheduler.stop().await.expect("stop");
}

#[tokio::test]
async fn on_connect_updates_never_run_from_the_clock() {
    let h = harness(3, MockDelivery::new()).await;
    h.scheduler.start().expect("start");

    let update = Update::new("u1", UpdateStrategy::OnConnect, Filter::default());
    h.scheduler.schedule(update, payload()).await.expect("schedule");

    tokio::time::sleep(Duration::from_millis(300)).await;
    let status = h.scheduler.status("u1").await.expect("status");
    assert_eq!(status.status, UpdateStatus::Scheduled);

    h.scheduler.stop().await.expect("stop");
}

#[tokio::test]
async fn schedule_validations() {
    let h = harness(1, MockDelivery::new()).await;

    let mut update = Update::new("", UpdateStrategy::Immediate, Filter::default());
    assert!(matches!(
        h.scheduler.schedule(update.clone(), payload()).await,
        Err(ScheduleError::MissingId)
    ));

    update.id = "u1".into();
    update.strategy = UpdateStrategy::Scheduled;
    assert!(matches!(
        h.scheduler.schedule(update.clone(), payload()).await,
        Err(ScheduleError::MissingScheduleTime)
    ));

    update.strategy = UpdateStrategy::Progressive;
    assert!(matches!(
        h.scheduler.schedule(update.clone(), payload()).await,
        Err(ScheduleError::MissingPhases)
    ));

    update.strategy = UpdateStrategy::Immediate;
    h.scheduler.schedule(update.clone(), payload()).await.expect("schedule");
    assert!(matches!(
        h.scheduler.schedule(update, payload()).await,
        Err(ScheduleError::AlreadyScheduled { .. })
    ));

    assert!(matches!(
        h.scheduler.status("ghost").await,
        Err(ScheduleError::NotFound { .. })
    ));
}

#[tokio::test]
async fn concurrency_cap_defers_excess_updates() {
    let registry = seed_registry(4).await;
    let delivery = Arc::new(MockDelivery::with_delay(Duration::from_millis(200)));
    let engine = Arc::new(
        RolloutEngine::new(
            EngineConfig::default(),
            Arc::clone(&registry),
            Arc::clone(&delivery) as Arc<dyn fleetvisor::Delivery>,
        )
        .expect("engine"),
    );
    let scheduler = Arc::new(Scheduler::new(
        SchedulerConfig {
            tick_interval: Duration::from_millis(30),
            max_concurrent_updates: 1,
        },
        engine,
        registry,
    ));
    scheduler.start().expect("start");

    scheduler
        .schedule(
            Update::new("u1", UpdateStrategy::Immediate, Filter::default()),
            payload(),
        )
        .await
        .expect("schedule u1");
    scheduler
        .schedule(
            Update::new("u2", UpdateStrategy::Immediate, Filter::default()),
            payload(),
        )
        .await
        .expect("schedule u2");

    assert!(wait_for_status(&scheduler, "u1", UpdateStatus::InProgress, Duration::from_secs(1)).await
        || wait_for_status(&scheduler, "u2", UpdateStatus::InProgress, Duration::from_secs(1)).await);

    // While one runs, the other is still waiting its turn.
    let one = scheduler.status("u1").await.expect("u1").status;
    let two = scheduler.status("u2").await.expect("u2").status;
    assert!(
        !(one == UpdateStatus::InProgress && two == UpdateStatus::InProgress),
        "both updates running under a cap of one"
    );

    assert!(wait_for_status(&scheduler, "u1", UpdateStatus::Completed, Duration::from_secs(3)).await);
    assert!(wait_for_status(&scheduler, "u2", UpdateStatus::Completed, Duration::from_secs(3)).await);

    scheduler.stop().await.expect("stop");
}
