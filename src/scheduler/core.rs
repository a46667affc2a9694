//! # Scheduler core: the update table and the tick loop.
//!
//! ## Rules
//! - One lock serializes `schedule`/`cancel`/`status`/`list` and tick
//!   decisions over the update table.
//! - The tick loop skips dispatch while `max_concurrent_updates` updates
//!   are already running.
//! - Dispatch completion never overwrites a terminal status: an update
//!   cancelled mid-run stays `cancelled`.
//! - Progressive phases run as derived updates (`{id}:phase{n}`) whose
//!   filters select exactly the phase's device ids; the parent entry
//!   records the phase ids so `status()` can aggregate them.
//! - `on_connect` updates are never dispatched by the clock; they stay
//!   `scheduled` until cancelled (or triggered by an embedder-supplied
//!   connectivity signal).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::engine::RolloutEngine;
use crate::error::{RolloutError, ScheduleError};
use crate::events::{Event, EventKind};
use crate::model::{Filter, Status, Update, UpdateStatus, UpdateStrategy};
use crate::payload::PayloadFactory;
use crate::registry::DeviceRegistry;

use super::config::SchedulerConfig;

/// One tracked update with its scheduling metadata.
struct Entry {
    update: Update,
    payload: Arc<dyn PayloadFactory>,
    status: UpdateStatus,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    cancel: Option<CancellationToken>,
    /// Derived update ids of executed progressive phases.
    phase_ids: Vec<String>,
}

/// Handle to the running tick loop.
struct Runner {
    token: CancellationToken,
    join: JoinHandle<()>,
}

/// Accepts updates, tracks their lifecycle, and dispatches them into the
/// rollout engine according to strategy, window, and the global
/// concurrency cap.
pub struct Scheduler {
    inner: Arc<Inner>,
    runner: Mutex<Option<Runner>>,
}

/// Shared scheduler state; the tick loop and dispatch tasks hold clones
/// of this.
struct Inner {
    config: SchedulerConfig,
    engine: Arc<RolloutEngine>,
    registry: Arc<dyn DeviceRegistry>,
    state: RwLock<HashMap<String, Entry>>,
}

impl Scheduler {
    /// Creates a scheduler over the given engine and registry.
    pub fn new(
        config: SchedulerConfig,
        engine: Arc<RolloutEngine>,
        registry: Arc<dyn DeviceRegistry>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                engine,
                registry,
                state: RwLock::new(HashMap::new()),
            }),
            runner: Mutex::new(None),
        }
    }

    /// The engine this scheduler dispatches into.
    pub fn engine(&self) -> &Arc<RolloutEngine> {
        &self.inner.engine
    }

    /// Queues an update for execution with the payload it will deliver.
    ///
    /// The initial lifecycle status depends on the strategy: `immediate`
    /// and `progressive` enter `pending`, `scheduled` and `on_connect`
    /// enter `scheduled`.
    pub async fn schedule(
        &self,
        update: Update,
        payload: Arc<dyn PayloadFactory>,
    ) -> Result<(), ScheduleError> {
        self.inner.schedule(update, payload).await
    }

    /// Current aggregate status of one update.
    ///
    /// Reads through to the engine whenever a progress record exists
    /// (running or finished executions); queued and cancelled-before-start
    /// updates synthesize a minimal status from the table.
    pub async fn status(&self, update_id: &str) -> Result<Status, ScheduleError> {
        self.inner.status(update_id).await
    }

    /// Cancels an update: fires its cancel token when running and marks
    /// it `cancelled`. A no-op on already-terminal updates.
    pub async fn cancel(&self, update_id: &str) -> Result<(), ScheduleError> {
        self.inner.cancel(update_id).await
    }

    /// Summary rows for every update currently in `status`.
    pub async fn list(&self, status: UpdateStatus) -> Vec<Status> {
        self.inner.list(status).await
    }

    /// Full status for every tracked update, regardless of state.
    pub async fn list_all(&self) -> Vec<Status> {
        self.inner.list_all().await
    }

    /// Starts the background tick loop.
    pub fn start(&self) -> Result<(), ScheduleError> {
        let mut runner = lock_runner(&self.runner);
        if runner.is_some() {
            return Err(ScheduleError::AlreadyRunning);
        }

        let token = CancellationToken::new();
        let loop_token = token.clone();
        let inner = Arc::clone(&self.inner);
        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(inner.config.tick_interval);
            loop {
                tokio::select! {
                    _ = loop_token.cancelled() => break,
                    _ = ticker.tick() => Inner::process_tick(&inner, &loop_token).await,
                }
            }
        });

        *runner = Some(Runner { token, join });
        log::info!(
            "scheduler: started (tick={:?}, max_concurrent_updates={})",
            self.inner.config.tick_interval,
            self.inner.config.max_concurrent_updates
        );
        Ok(())
    }

    /// Stops the tick loop and fires the cancel token of every running
    /// update.
    pub async fn stop(&self) -> Result<(), ScheduleError> {
        let runner = lock_runner(&self.runner)
            .take()
            .ok_or(ScheduleError::NotRunning)?;
        runner.token.cancel();
        let _ = runner.join.await;

        let mut state = self.inner.state.write().await;
        for entry in state.values_mut() {
            if let Some(cancel) = entry.cancel.take() {
                cancel.cancel();
            }
        }
        log::info!("scheduler: stopped");
        Ok(())
    }
}

impl Inner {
    async fn schedule(
        &self,
        update: Update,
        payload: Arc<dyn PayloadFactory>,
    ) -> Result<(), ScheduleError> {
        if update.id.trim().is_empty() {
            return Err(ScheduleError::MissingId);
        }

        let status = match update.strategy {
            UpdateStrategy::Immediate => UpdateStatus::Pending,
            UpdateStrategy::Scheduled => {
                if update.scheduled_at.is_none() {
                    return Err(ScheduleError::MissingScheduleTime);
                }
                UpdateStatus::Scheduled
            }
            UpdateStrategy::Progressive => {
                if update.rollout_phases.is_empty() {
                    return Err(ScheduleError::MissingPhases);
                }
                for phase in &update.rollout_phases {
                    if phase.percentage == 0 || phase.percentage > 100 {
                        return Err(ScheduleError::InvalidPhase {
                            name: phase.name.clone(),
                            reason: format!("percentage {} out of 1..=100", phase.percentage),
                        });
                    }
                    if phase.success_rate > 100 {
                        return Err(ScheduleError::InvalidPhase {
                            name: phase.name.clone(),
                            reason: format!("success_rate {} out of 0..=100", phase.success_rate),
                        });
                    }
                }
                UpdateStatus::Pending
            }
            // Triggered by a device-connection signal, not the clock.
            UpdateStrategy::OnConnect => UpdateStatus::Scheduled,
        };

        let mut state = self.state.write().await;
        if state.contains_key(&update.id) {
            return Err(ScheduleError::AlreadyScheduled {
                id: update.id.clone(),
            });
        }
        log::info!(
            "scheduler: accepted update {} (strategy={}, status={})",
            update.id,
            update.strategy.as_str(),
            status.as_str()
        );
        state.insert(
            update.id.clone(),
            Entry {
                update,
                payload,
                status,
                created_at: Utc::now(),
                started_at: None,
                cancel: None,
                phase_ids: Vec::new(),
            },
        );
        Ok(())
    }

    async fn status(&self, update_id: &str) -> Result<Status, ScheduleError> {
        let state = self.state.read().await;
        let entry = state
            .get(update_id)
            .ok_or_else(|| ScheduleError::NotFound {
                id: update_id.to_string(),
            })?;
        Ok(self.entry_status(update_id, entry).await)
    }

    async fn cancel(&self, update_id: &str) -> Result<(), ScheduleError> {
        let mut state = self.state.write().await;
        let entry = state
            .get_mut(update_id)
            .ok_or_else(|| ScheduleError::NotFound {
                id: update_id.to_string(),
            })?;
        if entry.status.is_terminal() {
            return Ok(());
        }

        entry.status = UpdateStatus::Cancelled;
        if let Some(cancel) = entry.cancel.take() {
            cancel.cancel();
        }
        log::info!("scheduler: cancelled update {update_id}");
        self.engine
            .bus()
            .publish(Event::now(EventKind::UpdateCancelled, update_id));
        Ok(())
    }

    async fn list(&self, status: UpdateStatus) -> Vec<Status> {
        let state = self.state.read().await;
        state
            .iter()
            .filter(|(_, e)| e.status == status)
            .map(|(id, e)| Status::queued(id.clone(), e.status, e.created_at))
            .collect()
    }

    async fn list_all(&self) -> Vec<Status> {
        let state = self.state.read().await;
        let mut statuses = Vec::with_capacity(state.len());
        for (id, entry) in state.iter() {
            statuses.push(self.entry_status(id, entry).await);
        }
        statuses
    }

    /// One pass over the table: dispatch everything whose strategy says
    /// it should run now, up to the concurrency cap.
    async fn process_tick(me: &Arc<Inner>, runtime_token: &CancellationToken) {
        let now = Utc::now();
        let mut state = me.state.write().await;
        let mut running = state
            .values()
            .filter(|e| e.status == UpdateStatus::InProgress)
            .count();

        let candidates: Vec<String> = state
            .iter()
            .filter(|(_, e)| matches!(e.status, UpdateStatus::Pending | UpdateStatus::Scheduled))
            .map(|(id, _)| id.clone())
            .collect();

        for id in candidates {
            if running >= me.config.max_concurrent_updates {
                continue;
            }
            let Some(entry) = state.get_mut(&id) else {
                continue;
            };

            let should_run = match entry.update.strategy {
                UpdateStrategy::Immediate | UpdateStrategy::Progressive => true,
                UpdateStrategy::Scheduled => {
                    entry
                        .update
                        .scheduled_at
                        .map(|at| now >= at)
                        .unwrap_or(false)
                        && in_update_window(&entry.update, now)
                }
                UpdateStrategy::OnConnect => false,
            };
            if !should_run {
                continue;
            }

            entry.status = UpdateStatus::InProgress;
            entry.started_at = Some(now);
            let child = runtime_token.child_token();
            entry.cancel = Some(child.clone());
            running += 1;

            let inner = Arc::clone(me);
            let update = entry.update.clone();
            let payload = Arc::clone(&entry.payload);
            tokio::spawn(async move {
                Inner::dispatch(inner, update, payload, child).await;
            });
        }
    }

    /// Runs one update to completion and records the terminal state.
    async fn dispatch(
        me: Arc<Inner>,
        update: Update,
        payload: Arc<dyn PayloadFactory>,
        token: CancellationToken,
    ) {
        let id = update.id.clone();
        log::info!(
            "scheduler: dispatching update {id} (strategy={})",
            update.strategy.as_str()
        );

        let result = match update.strategy {
            UpdateStrategy::Progressive => me.run_progressive(&update, payload, &token).await,
            _ => me.engine.execute_update(&token, &update, payload).await,
        };

        let mut state = me.state.write().await;
        let Some(entry) = state.get_mut(&id) else {
            return;
        };
        entry.cancel = None;
        // Cancellation already moved the entry to a terminal state; the
        // dispatch outcome must not overwrite it.
        if entry.status != UpdateStatus::InProgress {
            return;
        }

        match result {
            Ok(()) => {
                entry.status = UpdateStatus::Completed;
                log::info!("scheduler: update {id} completed");
            }
            Err(err) => {
                entry.status = UpdateStatus::Failed;
                log::warn!("scheduler: update {id} failed: {err}");
                me.engine
                    .bus()
                    .publish(Event::now(EventKind::UpdateFailed, &id).with_error(err.to_string()));
            }
        }
    }

    /// Progressive dispatch: slice the resolved target set per phase,
    /// execute each slice as a derived update, enforce the success gate,
    /// and wait between phases.
    async fn run_progressive(
        &self,
        update: &Update,
        payload: Arc<dyn PayloadFactory>,
        token: &CancellationToken,
    ) -> Result<(), RolloutError> {
        let filter = update.filter.clone().unwrap_or_default();
        let devices = self.registry.list(&filter).await?;
        let total = devices.len();
        if total == 0 {
            return Err(RolloutError::NoDevices);
        }

        let phase_count = update.rollout_phases.len();
        let mut offset = 0usize;

        for (index, phase) in update.rollout_phases.iter().enumerate() {
            if offset >= total {
                break;
            }
            if token.is_cancelled() {
                return Ok(());
            }

            let remaining = total - offset;
            let count = ((total * phase.percentage as usize) / 100)
                .max(1)
                .min(remaining);
            let ids: Vec<String> = devices[offset..offset + count]
                .iter()
                .map(|d| d.id.clone())
                .collect();

            let phase_id = format!("{}:phase{}", update.id, index + 1);
            let mut derived = update.clone();
            derived.id = phase_id.clone();
            derived.filter = Some(Filter::for_ids(ids));
            derived.rollout_phases = Vec::new();

            {
                let mut state = self.state.write().await;
                if let Some(entry) = state.get_mut(&update.id) {
                    entry.phase_ids.push(phase_id.clone());
                }
            }

            log::info!(
                "scheduler: update {} phase {}/{} covering {count} device(s)",
                update.id,
                index + 1,
                phase_count
            );
            self.engine
                .execute_update(token, &derived, Arc::clone(&payload))
                .await?;

            // Gate sampled only after the phase has fully drained.
            if phase.success_rate > 0 {
                let status = self.engine.get_status(&phase_id).await?;
                let achieved = (status.completed * 100 / count) as u8;
                if achieved < phase.success_rate {
                    return Err(RolloutError::PhaseGate {
                        phase: if phase.name.is_empty() {
                            phase_id
                        } else {
                            phase.name.clone()
                        },
                        achieved,
                        required: phase.success_rate,
                    });
                }
            }

            offset += count;
            let is_last = index + 1 == phase_count;
            if !is_last && !phase.wait_time.is_zero() {
                let sleep = tokio::time::sleep(phase.wait_time);
                tokio::pin!(sleep);
                tokio::select! {
                    _ = &mut sleep => {}
                    _ = token.cancelled() => return Ok(()),
                }
            }
        }

        Ok(())
    }

    /// Derives the status for one table entry: engine read-through where
    /// a record exists, synthesized minimal status otherwise.
    async fn entry_status(&self, id: &str, entry: &Entry) -> Status {
        if !entry.phase_ids.is_empty() {
            if let Some(aggregated) = self.aggregate_phases(id, entry).await {
                return aggregated;
            }
        }

        if let Ok(mut status) = self.engine.get_status(id).await {
            // The table owns the lifecycle verdict for cancelled updates
            // and dispatch-level failures.
            if matches!(entry.status, UpdateStatus::Cancelled | UpdateStatus::Failed) {
                status.status = entry.status;
            }
            if let Some(started) = entry.started_at {
                status.started_at = started;
            }
            return status;
        }

        Status::queued(id, entry.status, entry.created_at)
    }

    /// Sums the engine records of a progressive update's executed phases.
    async fn aggregate_phases(&self, id: &str, entry: &Entry) -> Option<Status> {
        let mut aggregate = Status::queued(id, entry.status, entry.created_at);
        let mut found = false;

        for phase_id in &entry.phase_ids {
            let Ok(status) = self.engine.get_status(phase_id).await else {
                continue;
            };
            found = true;
            aggregate.total_devices += status.total_devices;
            aggregate.completed += status.completed;
            aggregate.failed += status.failed;
            aggregate.in_progress += status.in_progress;
            aggregate.device_status.extend(status.device_status);
        }

        if !found {
            return None;
        }
        if let Some(started) = entry.started_at {
            aggregate.started_at = started;
        }
        Some(aggregate)
    }
}

/// Checks the update window against `now`.
///
/// - Both bounds absent: always inside.
/// - Only start: inside iff `now >= window_start`.
/// - Only end: inside iff `now < window_end`.
/// - Both: inside iff `window_start <= now < window_end`.
fn in_update_window(update: &Update, now: DateTime<Utc>) -> bool {
    match (update.window_start, update.window_end) {
        (None, None) => true,
        (Some(start), None) => now >= start,
        (None, Some(end)) => now < end,
        (Some(start), Some(end)) => now >= start && now < end,
    }
}

fn lock_runner(runner: &Mutex<Option<Runner>>) -> std::sync::MutexGuard<'_, Option<Runner>> {
    match runner.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
