//! Job registry: one recurring timer per monitored host service.
//!
//! Each job is a background task that sleeps for the host service's
//! interval and then runs the check pipeline through the registered
//! [`CheckRunner`]. All mutations of the id → job map happen under one
//! async mutex, so add/remove/reschedule from concurrent callers cannot
//! leave two timers for the same id.
//!
//! Cancellation is cooperative: removing a job signals its task to stop
//! before the next tick, and a pipeline already running is left to finish.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};
use vigil_core::Preferences;
use vigil_state::{HostService, HostServiceId};

use crate::emitter::{Emitter, epoch_secs};
use crate::error::{MonitorError, MonitorResult};

pub type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Invoked on every tick with the id of the host service to check.
pub type CheckRunner = Arc<dyn Fn(HostServiceId) -> BoxFuture + Send + Sync>;

type NextRun = Arc<std::sync::Mutex<Option<u64>>>;

struct JobSlot {
    handle: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
    next_run: NextRun,
    host_name: String,
    service_name: String,
    schedule: String,
}

impl JobSlot {
    fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        drop(self.handle);
    }
}

/// A live job as listed on the schedule view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduleEntry {
    pub host_service_id: HostServiceId,
    pub host_name: String,
    pub service_name: String,
    pub schedule: String,
    /// Unix seconds of the next firing, if known.
    pub next_run: Option<u64>,
}

/// Owns every live job.
#[derive(Clone)]
pub struct JobRegistry {
    jobs: Arc<Mutex<HashMap<HostServiceId, JobSlot>>>,
    runner: CheckRunner,
    emitter: Emitter,
    preferences: Preferences,
}

impl JobRegistry {
    pub fn new(runner: CheckRunner, emitter: Emitter, preferences: Preferences) -> Self {
        Self {
            jobs: Arc::new(Mutex::new(HashMap::new())),
            runner,
            emitter,
            preferences,
        }
    }

    /// Schedule `hs`, replacing any job already registered for its id.
    ///
    /// Returns `Ok(false)` without doing anything when monitoring is off
    /// or the host service is inactive.
    pub async fn add(&self, hs: &HostService) -> MonitorResult<bool> {
        if !self.preferences.monitoring_live() || !hs.active {
            debug!(host_service_id = hs.id, active = hs.active, "not scheduling");
            return Ok(false);
        }
        let mut jobs = self.jobs.lock().await;
        self.insert_locked(&mut jobs, hs)?;
        Ok(true)
    }

    /// Cancel the job for `id`. A missing job is not an error.
    ///
    /// Returns whether a job was cancelled. Does nothing when monitoring
    /// is off.
    pub async fn remove(&self, id: HostServiceId) -> bool {
        if !self.preferences.monitoring_live() {
            return false;
        }
        let mut jobs = self.jobs.lock().await;
        self.remove_locked(&mut jobs, id)
    }

    /// Remove then re-add `hs` as one step under the registry lock.
    pub async fn reschedule(&self, hs: &HostService) -> MonitorResult<bool> {
        if !self.preferences.monitoring_live() {
            return Ok(false);
        }
        let mut jobs = self.jobs.lock().await;
        self.remove_locked(&mut jobs, hs.id);
        if !hs.active {
            return Ok(false);
        }
        self.insert_locked(&mut jobs, hs)?;
        Ok(true)
    }

    /// Cancel every job, broadcasting a removal for each.
    pub async fn clear(&self) -> usize {
        let mut jobs = self.jobs.lock().await;
        let ids: Vec<HostServiceId> = jobs.keys().copied().collect();
        for id in &ids {
            self.remove_locked(&mut jobs, *id);
        }
        ids.len()
    }

    /// Cancel every job without broadcasting (for graceful shutdown).
    pub async fn stop_all(&self) {
        let mut jobs = self.jobs.lock().await;
        for (id, slot) in jobs.drain() {
            slot.stop();
            debug!(host_service_id = id, "job stopped");
        }
        info!("all check jobs stopped");
    }

    pub async fn active_jobs(&self) -> Vec<HostServiceId> {
        let jobs = self.jobs.lock().await;
        let mut ids: Vec<_> = jobs.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub async fn is_scheduled(&self, id: HostServiceId) -> bool {
        self.jobs.lock().await.contains_key(&id)
    }

    /// Unix seconds of the next firing for `id`, or `None` without a job.
    pub async fn next_run(&self, id: HostServiceId) -> Option<u64> {
        let jobs = self.jobs.lock().await;
        jobs.get(&id).and_then(|slot| read_next_run(&slot.next_run))
    }

    /// Snapshot of all live jobs, ordered by id.
    pub async fn entries(&self) -> Vec<ScheduleEntry> {
        let jobs = self.jobs.lock().await;
        let mut entries: Vec<_> = jobs
            .iter()
            .map(|(id, slot)| ScheduleEntry {
                host_service_id: *id,
                host_name: slot.host_name.clone(),
                service_name: slot.service_name.clone(),
                schedule: slot.schedule.clone(),
                next_run: read_next_run(&slot.next_run),
            })
            .collect();
        entries.sort_by_key(|e| e.host_service_id);
        entries
    }

    fn insert_locked(
        &self,
        jobs: &mut HashMap<HostServiceId, JobSlot>,
        hs: &HostService,
    ) -> MonitorResult<()> {
        let period = hs.interval().ok_or(MonitorError::InvalidSchedule(hs.id))?;
        let slot = self.spawn_job(hs, period);
        if let Some(old) = jobs.insert(hs.id, slot) {
            old.stop();
            debug!(host_service_id = hs.id, "replaced existing job");
        }
        info!(
            host_service_id = hs.id,
            schedule = %hs.schedule_descriptor(),
            "check job scheduled"
        );
        let _ = self.emitter.scheduling(hs);
        Ok(())
    }

    fn remove_locked(&self, jobs: &mut HashMap<HostServiceId, JobSlot>, id: HostServiceId) -> bool {
        let removed = match jobs.remove(&id) {
            Some(slot) => {
                slot.stop();
                info!(host_service_id = id, "check job removed");
                true
            }
            None => {
                debug!(host_service_id = id, "no job to remove");
                false
            }
        };
        let _ = self.emitter.schedule_item_removed(id);
        removed
    }

    fn spawn_job(&self, hs: &HostService, period: Duration) -> JobSlot {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let next_run: NextRun = Arc::new(std::sync::Mutex::new(Some(
            epoch_secs() + period.as_secs(),
        )));

        let handle = tokio::spawn(run_job_loop(
            hs.id,
            period,
            self.runner.clone(),
            next_run.clone(),
            shutdown_rx,
        ));

        JobSlot {
            handle,
            shutdown_tx,
            next_run,
            host_name: hs.host_name.clone(),
            service_name: hs.service.service_name.clone(),
            schedule: hs.schedule_descriptor(),
        }
    }
}

fn read_next_run(next_run: &NextRun) -> Option<u64> {
    *next_run.lock().unwrap_or_else(|e| e.into_inner())
}

/// The timer loop for a single host service.
async fn run_job_loop(
    id: HostServiceId,
    period: Duration,
    runner: CheckRunner,
    next_run: NextRun,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    debug!(host_service_id = id, ?period, "job loop starting");

    loop {
        tokio::select! {
            biased;

            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                // A removal that landed while the previous run was in flight
                // leaves both branches ready; it must win.
                if *shutdown.borrow() {
                    break;
                }
                *next_run.lock().unwrap_or_else(|e| e.into_inner()) =
                    Some(epoch_secs() + period.as_secs());
                runner(id).await;
            }
        }
    }
    debug!(host_service_id = id, "job loop shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use vigil_core::preferences::MONITORING_LIVE;
    use vigil_notify::ChannelHub;
    use vigil_notify::broadcast::{SCHEDULE_CHANGED, SCHEDULE_ITEM_REMOVED};
    use vigil_state::ScheduleUnit;

    fn counting_runner() -> (CheckRunner, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let runner: CheckRunner = Arc::new(move |_id| -> BoxFuture {
            let c = c.clone();
            Box::pin(async move {
                c.fetch_add(1, Ordering::SeqCst);
            })
        });
        (runner, count)
    }

    fn live_prefs(live: bool) -> Preferences {
        Preferences::new(HashMap::from([(
            MONITORING_LIVE.to_string(),
            if live { "1" } else { "0" }.to_string(),
        )]))
    }

    fn host_service(id: HostServiceId, seconds: u32) -> HostService {
        HostService {
            id,
            host_id: 1,
            service_id: 1,
            active: true,
            schedule_number: seconds,
            schedule_unit: ScheduleUnit::Seconds,
            host_name: "web".to_string(),
            ..Default::default()
        }
    }

    fn registry(live: bool) -> (JobRegistry, ChannelHub, Arc<AtomicUsize>) {
        let hub = ChannelHub::new(64);
        let (runner, count) = counting_runner();
        let emitter = Emitter::new(Arc::new(hub.clone()), "public-channel");
        (JobRegistry::new(runner, emitter, live_prefs(live)), hub, count)
    }

    #[tokio::test]
    async fn add_is_noop_when_monitoring_off() {
        let (registry, hub, _) = registry(false);
        let mut rx = hub.subscribe();

        assert!(!registry.add(&host_service(1, 5)).await.unwrap());
        assert!(registry.active_jobs().await.is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn add_is_noop_for_inactive_service() {
        let (registry, _, _) = registry(true);
        let mut hs = host_service(1, 5);
        hs.active = false;
        assert!(!registry.add(&hs).await.unwrap());
        assert!(!registry.is_scheduled(1).await);
    }

    #[tokio::test]
    async fn add_broadcasts_scheduling() {
        let (registry, hub, _) = registry(true);
        let mut rx = hub.subscribe();

        registry.add(&host_service(4, 5)).await.unwrap();
        let msg = rx.try_recv().unwrap();
        assert_eq!(msg.event, SCHEDULE_CHANGED);
        assert_eq!(msg.data["message"], "scheduling");
        assert_eq!(msg.data["next_run"], "Pending...");
        assert_eq!(msg.data["schedule"], "@every 5s");
        registry.stop_all().await;
    }

    #[tokio::test]
    async fn zero_interval_is_rejected() {
        let (registry, _, _) = registry(true);
        let err = registry.add(&host_service(9, 0)).await.unwrap_err();
        assert!(matches!(err, MonitorError::InvalidSchedule(9)));
        assert!(!registry.is_scheduled(9).await);
    }

    #[tokio::test]
    async fn remove_missing_job_is_safe() {
        let (registry, hub, _) = registry(true);
        let mut rx = hub.subscribe();

        assert!(!registry.remove(42).await);
        let msg = rx.try_recv().unwrap();
        assert_eq!(msg.event, SCHEDULE_ITEM_REMOVED);
        assert_eq!(msg.data["host_service_id"], "42");
    }

    #[tokio::test(start_paused = true)]
    async fn job_fires_every_period() {
        let (registry, _, count) = registry(true);
        registry.add(&host_service(1, 10)).await.unwrap();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);

        registry.stop_all().await;
    }

    #[tokio::test(start_paused = true)]
    async fn removed_job_stops_firing() {
        let (registry, _, count) = registry(true);
        registry.add(&host_service(1, 10)).await.unwrap();

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        assert!(registry.remove(1).await);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(registry.next_run(1).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn removal_during_a_slow_run_cancels_the_next_tick() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let runner: CheckRunner = Arc::new(move |_id| -> BoxFuture {
            let c = c.clone();
            Box::pin(async move {
                c.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(15)).await;
            })
        });
        let emitter = Emitter::new(Arc::new(ChannelHub::new(64)), "public-channel");

        for _ in 0..20 {
            count.store(0, Ordering::SeqCst);
            let registry = JobRegistry::new(runner.clone(), emitter.clone(), live_prefs(true));
            registry.add(&host_service(1, 10)).await.unwrap();

            tokio::time::sleep(Duration::from_secs(12)).await;
            assert_eq!(count.load(Ordering::SeqCst), 1);
            assert!(registry.remove(1).await);

            tokio::time::sleep(Duration::from_secs(60)).await;
            assert_eq!(count.load(Ordering::SeqCst), 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn re_adding_replaces_the_timer() {
        let (registry, _, count) = registry(true);
        registry.add(&host_service(1, 10)).await.unwrap();
        registry.add(&host_service(1, 10)).await.unwrap();
        assert_eq!(registry.active_jobs().await, vec![1]);

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        registry.stop_all().await;
    }

    #[tokio::test(start_paused = true)]
    async fn reschedule_changes_period() {
        let (registry, _, count) = registry(true);
        registry.add(&host_service(1, 100)).await.unwrap();
        registry.reschedule(&host_service(1, 10)).await.unwrap();

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);

        let entries = registry.entries().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].schedule, "@every 10s");
        assert!(entries[0].next_run.is_some());
        registry.stop_all().await;
    }

    #[tokio::test]
    async fn reschedule_of_inactive_service_only_removes() {
        let (registry, _, _) = registry(true);
        registry.add(&host_service(1, 10)).await.unwrap();

        let mut hs = host_service(1, 10);
        hs.active = false;
        assert!(!registry.reschedule(&hs).await.unwrap());
        assert!(!registry.is_scheduled(1).await);
    }

    #[tokio::test]
    async fn clear_removes_and_broadcasts_each() {
        let (registry, hub, _) = registry(true);
        registry.add(&host_service(1, 10)).await.unwrap();
        registry.add(&host_service(2, 10)).await.unwrap();
        let mut rx = hub.subscribe();

        assert_eq!(registry.clear().await, 2);
        assert!(registry.active_jobs().await.is_empty());
        let mut removed = 0;
        while let Ok(msg) = rx.try_recv() {
            if msg.event == SCHEDULE_ITEM_REMOVED {
                removed += 1;
            }
        }
        assert_eq!(removed, 2);
    }
}
