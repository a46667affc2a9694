//! # Rollout engine core.
//!
//! [`RolloutEngine`] borrows an [`Update`] and a payload factory for the
//! duration of one execution; it owns no per-update state across
//! executions (all of that lives in the progress tracker).
//!
//! ## Rules
//! - `update.started` is published before any device task is submitted;
//!   `update.completed` is published after every task has drained,
//!   whatever the per-device outcomes. Consumers classify an execution
//!   by inspecting the final aggregate [`Status`].
//! - One device's failure never aborts another device's task.
//! - A device task that observes cancellation before starting records
//!   nothing and emits nothing.
//! - Every push attempt starts by seeking the device's own payload
//!   source back to byte zero; a failed push is retried from the start,
//!   never resumed.

use std::io::SeekFrom;
use std::sync::Arc;

use tokio::io::AsyncSeekExt;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::delivery::Delivery;
use crate::error::{DeliveryError, RolloutError};
use crate::events::{Bus, Event, EventKind, Subscribe};
use crate::model::{Device, Status, Update, UpdateStatus};
use crate::payload::PayloadFactory;
use crate::policies::RetryPolicy;
use crate::pool::{Job, WorkerPool};
use crate::progress::{Progress, ProgressTracker};
use crate::registry::DeviceRegistry;

use super::config::EngineConfig;

/// Executes updates against a device registry through a delivery
/// transport. Cheap to share behind an `Arc`.
pub struct RolloutEngine {
    config: EngineConfig,
    registry: Arc<dyn DeviceRegistry>,
    delivery: Arc<dyn Delivery>,
    progress: Arc<ProgressTracker>,
    bus: Bus,
}

impl RolloutEngine {
    /// Creates an engine with its own progress tracker wired to publish
    /// `progress.update` events.
    pub fn new(
        config: EngineConfig,
        registry: Arc<dyn DeviceRegistry>,
        delivery: Arc<dyn Delivery>,
    ) -> Result<Self, RolloutError> {
        config.validate()?;
        let bus = Bus::new(config.event_buffer_size);
        let progress = Arc::new(ProgressTracker::with_publisher(bus.clone()));
        Ok(Self {
            config,
            registry,
            delivery,
            progress,
            bus,
        })
    }

    /// Creates an engine over a caller-provided tracker.
    pub fn with_tracker(
        config: EngineConfig,
        registry: Arc<dyn DeviceRegistry>,
        delivery: Arc<dyn Delivery>,
        progress: Arc<ProgressTracker>,
    ) -> Result<Self, RolloutError> {
        config.validate()?;
        let bus = Bus::new(config.event_buffer_size);
        Ok(Self {
            config,
            registry,
            delivery,
            progress,
            bus,
        })
    }

    /// The engine's event bus.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Registers a subscriber for one event kind.
    pub fn subscribe(&self, kind: EventKind, subscriber: Arc<dyn Subscribe>) {
        self.bus.subscribe(kind, subscriber);
    }

    /// Registers a subscriber for every event kind through one queue.
    pub fn subscribe_all(&self, subscriber: Arc<dyn Subscribe>) {
        self.bus.subscribe_all(subscriber);
    }

    /// Executes one update: resolves its target set, pushes the payload
    /// to every device under bounded concurrency, and records outcomes.
    ///
    /// Returns `Ok(())` once all device tasks have drained, whatever
    /// their individual outcomes. Errors only for invalid input, an
    /// empty target set, or registry failure.
    pub async fn execute_update(
        &self,
        token: &CancellationToken,
        update: &Update,
        payload: Arc<dyn PayloadFactory>,
    ) -> Result<(), RolloutError> {
        if update.id.trim().is_empty() {
            return Err(RolloutError::validation("update id is required"));
        }
        let filter = update
            .filter
            .as_ref()
            .ok_or_else(|| RolloutError::validation("update filter is required"))?;

        let devices = self.registry.list(filter).await?;
        if devices.is_empty() {
            return Err(RolloutError::NoDevices);
        }

        log::info!(
            "rollout {}: pushing to {} device(s), strategy={}",
            update.id,
            devices.len(),
            update.strategy.as_str()
        );
        self.progress.start(&update.id, devices.len()).await;
        self.bus.publish(
            Event::now(EventKind::UpdateStarted, &update.id)
                .with_total(devices.len())
                .with_strategy(update.strategy),
        );

        let mut pool = WorkerPool::new(self.config.max_concurrent);
        pool.start(token.clone());

        let mut submit_failure = None;
        for device in devices {
            let job = self.device_job(update.id.clone(), device, Arc::clone(&payload));
            if let Err(e) = pool.submit(job).await {
                submit_failure = Some(e);
                break;
            }
        }
        pool.stop().await;

        if let Some(e) = submit_failure {
            return Err(RolloutError::Internal {
                reason: format!("worker pool refused a device task: {e}"),
            });
        }

        self.progress.complete(&update.id).await;
        let progress = self.progress.get(&update.id).await?;
        self.bus.publish(
            Event::now(EventKind::UpdateCompleted, &update.id)
                .with_counts(progress.completed, progress.failed),
        );
        log::info!(
            "rollout {}: finished, completed={} failed={}",
            update.id,
            progress.completed,
            progress.failed
        );
        Ok(())
    }

    /// Aggregate status for an executed (or executing) update, derived
    /// from the progress tracker.
    pub async fn get_status(&self, update_id: &str) -> Result<Status, RolloutError> {
        let progress = self.progress.get(update_id).await?;
        Ok(status_from_progress(&progress))
    }

    /// Builds the worker-pool job for one device.
    fn device_job(&self, update_id: String, device: Device, payload: Arc<dyn PayloadFactory>) -> Job {
        let delivery = Arc::clone(&self.delivery);
        let progress = Arc::clone(&self.progress);
        let bus = self.bus.clone();
        let retry = self.config.retry;

        Box::new(move |token| {
            Box::pin(run_device_task(
                update_id, device, payload, delivery, progress, bus, retry, token,
            ))
        })
    }
}

/// Derives the operator-facing status from a progress snapshot.
pub(crate) fn status_from_progress(progress: &Progress) -> Status {
    let status = if progress.completed + progress.failed < progress.total_devices {
        UpdateStatus::InProgress
    } else if progress.failed > 0 {
        UpdateStatus::Failed
    } else {
        UpdateStatus::Completed
    };

    let device_status = progress
        .device_progress
        .iter()
        .map(|(id, d)| (id.clone(), d.status.as_str().to_string()))
        .collect();

    Status {
        update_id: progress.update_id.clone(),
        status,
        total_devices: progress.total_devices,
        completed: progress.completed,
        failed: progress.failed,
        in_progress: progress.in_progress,
        device_status,
        started_at: progress.start_time,
        estimated_end: progress.estimated_end,
    }
}

/// One device's push: progress transitions, events, and the retried
/// delivery call.
#[allow(clippy::too_many_arguments)]
async fn run_device_task(
    update_id: String,
    device: Device,
    payload: Arc<dyn PayloadFactory>,
    delivery: Arc<dyn Delivery>,
    progress: Arc<ProgressTracker>,
    bus: Bus,
    retry: RetryPolicy,
    token: CancellationToken,
) {
    // Short-circuit before recording anything: a cancelled update emits
    // no events for devices that never started.
    if token.is_cancelled() {
        return;
    }

    progress
        .update_device(&update_id, &device.id, UpdateStatus::InProgress, 0)
        .await;
    bus.publish(
        Event::now(EventKind::DeviceStarted, &update_id)
            .with_device(&device.id)
            .with_address(&device.address),
    );

    let result = push_with_retry(&retry, &token, &payload, &delivery, &device).await;

    match result {
        Ok(()) => {
            progress
                .update_device(&update_id, &device.id, UpdateStatus::Completed, 0)
                .await;
            bus.publish(
                Event::now(EventKind::DeviceCompleted, &update_id)
                    .with_device(&device.id)
                    .with_success(true),
            );
        }
        Err(err) => {
            log::warn!(
                "rollout {update_id}: device {} failed: {err}",
                device.id
            );
            progress
                .set_device_error(&update_id, &device.id, &err.to_string())
                .await;
            progress
                .update_device(&update_id, &device.id, UpdateStatus::Failed, 0)
                .await;
            bus.publish(
                Event::now(EventKind::DeviceFailed, &update_id)
                    .with_device(&device.id)
                    .with_error(err.to_string()),
            );
        }
    }
}

/// Opens the device's own payload source and drives the push through the
/// retry policy, seeking back to byte zero at the start of every attempt.
async fn push_with_retry(
    retry: &RetryPolicy,
    token: &CancellationToken,
    payload: &Arc<dyn PayloadFactory>,
    delivery: &Arc<dyn Delivery>,
    device: &Device,
) -> Result<(), DeliveryError> {
    // Factory failures are payload errors: non-retryable by
    // classification, so no attempt budget is spent on them.
    let source = payload.open().await?;
    let source = Arc::new(Mutex::new(source));
    let device = Arc::new(device.clone());

    retry
        .run(token, || {
            let source = Arc::clone(&source);
            let delivery = Arc::clone(delivery);
            let device = Arc::clone(&device);
            let token = token.clone();
            async move {
                let mut guard = source.lock().await;
                guard
                    .seek(SeekFrom::Start(0))
                    .await
                    .map_err(|e| DeliveryError::Payload {
                        reason: format!("rewind payload: {e}"),
                    })?;
                delivery.push(&token, &device, guard.as_mut()).await
            }
        })
        .await
}
