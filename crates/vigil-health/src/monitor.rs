//! Monitor: the entry points collaborators call into.
//!
//! Ties the probe, transition engine and job registry together. All
//! collaborators are passed in through [`MonitorDeps`]; nothing is read from
//! process globals.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};
use vigil_core::preferences::MONITORING_LIVE;
use vigil_core::{MonitorConfig, Preferences};
use vigil_notify::{Broadcaster, Notifier};
use vigil_state::{Host, HostService, HostServiceId, Repository, ScheduleUnit, ServiceId};

use crate::checker::{ProbeOutcome, probe};
use crate::emitter::{Emitter, epoch_secs};
use crate::error::{MonitorError, MonitorResult};
use crate::registry::{BoxFuture, CheckRunner, JobRegistry, ScheduleEntry};
use crate::transition::{TransitionEngine, TransitionReport};

/// Collaborators the monitor is built from.
pub struct MonitorDeps {
    pub store: Arc<dyn Repository>,
    pub broadcaster: Arc<dyn Broadcaster>,
    pub notifier: Arc<Notifier>,
    pub preferences: Preferences,
    pub config: MonitorConfig,
}

/// Response to an on-demand check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManualCheckResult {
    pub ok: bool,
    pub message: String,
    pub service_id: ServiceId,
    pub host_service_id: HostServiceId,
    pub host_id: u64,
    pub old_status: String,
    pub new_status: String,
    /// Unix seconds.
    pub last_check: u64,
}

impl ManualCheckResult {
    fn failed(host_service_id: HostServiceId, old_status: &str) -> Self {
        Self {
            ok: false,
            message: "Something went wrong".to_string(),
            service_id: 0,
            host_service_id,
            host_id: 0,
            old_status: old_status.to_string(),
            new_status: String::new(),
            last_check: 0,
        }
    }
}

/// Per-host-service async locks around read → probe → reconcile.
#[derive(Default)]
struct CheckLocks {
    locks: std::sync::Mutex<HashMap<HostServiceId, Arc<Mutex<()>>>>,
}

impl CheckLocks {
    async fn acquire(&self, id: HostServiceId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks.entry(id).or_default().clone()
        };
        lock.lock_owned().await
    }
}

struct MonitorInner {
    engine: TransitionEngine,
    registry: JobRegistry,
    locks: CheckLocks,
    preferences: Preferences,
    probe_timeout: Duration,
}

/// Check engine facade. Cheap to clone.
#[derive(Clone)]
pub struct Monitor {
    inner: Arc<MonitorInner>,
}

impl Monitor {
    pub fn new(deps: MonitorDeps) -> Self {
        let MonitorDeps {
            store,
            broadcaster,
            notifier,
            preferences,
            config,
        } = deps;

        let inner = Arc::new_cyclic(|weak: &Weak<MonitorInner>| {
            let weak = weak.clone();
            let runner: CheckRunner = Arc::new(move |id| -> BoxFuture {
                let weak = weak.clone();
                Box::pin(async move {
                    if let Some(inner) = weak.upgrade() {
                        Monitor { inner }.run_scheduled_check(id).await;
                    }
                })
            });

            let emitter = Emitter::new(broadcaster, config.channel.clone());
            let registry = JobRegistry::new(runner, emitter.clone(), preferences.clone());
            let engine = TransitionEngine::new(
                store,
                emitter,
                notifier,
                registry.clone(),
                config.store_timeout(),
            );

            MonitorInner {
                engine,
                registry,
                locks: CheckLocks::default(),
                preferences,
                probe_timeout: config.probe_timeout(),
            }
        });

        Self { inner }
    }

    pub fn preferences(&self) -> &Preferences {
        &self.inner.preferences
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.inner.registry
    }

    /// Schedule every active host service on an active host.
    ///
    /// Returns the number of jobs scheduled; zero when monitoring is off.
    pub async fn start(&self) -> MonitorResult<usize> {
        if !self.inner.preferences.monitoring_live() {
            info!("monitoring is off, no jobs scheduled");
            return Ok(0);
        }

        let services = self
            .inner
            .engine
            .with_store(|s| s.get_services_to_monitor())
            .await?;

        let mut scheduled = 0;
        for hs in &services {
            match self.inner.registry.add(hs).await {
                Ok(true) => scheduled += 1,
                Ok(false) => {}
                Err(e) => error!(host_service_id = hs.id, error = %e, "failed to schedule"),
            }
        }
        info!(scheduled, candidates = services.len(), "monitoring started");
        Ok(scheduled)
    }

    /// Timer entry point. All outcomes are side effects.
    pub async fn run_scheduled_check(&self, id: HostServiceId) {
        debug!(host_service_id = id, "running scheduled check");
        match self.check(id).await {
            Ok((_, report)) => {
                for e in &report.errors {
                    debug!(host_service_id = id, error = %e, "pipeline step failed");
                }
            }
            Err(MonitorError::UnsupportedService { service_id, .. }) => {
                warn!(host_service_id = id, service_id, "unsupported service kind, nothing recorded");
            }
            Err(e) => error!(host_service_id = id, error = %e, "scheduled check aborted"),
        }
    }

    /// On-demand check for a request/response caller.
    ///
    /// `previous_status` is echoed back as given.
    pub async fn run_manual_check(
        &self,
        id: HostServiceId,
        previous_status: &str,
    ) -> ManualCheckResult {
        match self.check(id).await {
            Ok((_, report)) if report.persisted => {
                let hs = &report.host_service;
                ManualCheckResult {
                    ok: true,
                    message: hs.last_message.clone(),
                    service_id: hs.service_id,
                    host_service_id: hs.id,
                    host_id: hs.host_id,
                    old_status: previous_status.to_string(),
                    new_status: hs.status.to_string(),
                    last_check: hs.last_check,
                }
            }
            Ok(_) => {
                error!(host_service_id = id, "manual check result was not persisted");
                ManualCheckResult::failed(id, previous_status)
            }
            Err(e) => {
                warn!(host_service_id = id, error = %e, "manual check failed");
                ManualCheckResult::failed(id, previous_status)
            }
        }
    }

    pub async fn on_host_service_activated(&self, hs: &HostService) -> MonitorResult<bool> {
        self.inner.registry.add(hs).await
    }

    pub async fn on_host_service_deactivated(&self, hs: &HostService) -> bool {
        self.inner.registry.remove(hs.id).await
    }

    pub async fn on_host_service_rescheduled(&self, hs: &HostService) -> MonitorResult<bool> {
        self.inner.registry.reschedule(hs).await
    }

    /// Switch a host service on or off, then add or remove its job.
    ///
    /// Holds the host service's check lock, so a check in flight persists
    /// before the flag is written and cannot write back a stale copy after.
    pub async fn set_active(&self, id: HostServiceId, active: bool) -> MonitorResult<HostService> {
        let _guard = self.inner.locks.acquire(id).await;
        let engine = &self.inner.engine;

        let mut hs = engine.with_store(move |s| s.get_host_service_by_id(id)).await?;
        hs.active = active;
        hs.updated_at = epoch_secs();
        let record = hs.clone();
        engine.with_store(move |s| s.update_host_service(&record)).await?;

        if active {
            if let Err(e) = self.on_host_service_activated(&hs).await {
                warn!(host_service_id = id, error = %e, "activated but not scheduled");
            }
        } else {
            self.on_host_service_deactivated(&hs).await;
        }
        info!(host_service_id = id, active, "host service activation changed");
        Ok(hs)
    }

    /// Change the check interval of a host service and reschedule its job.
    ///
    /// Same locking as [`Monitor::set_active`].
    pub async fn set_schedule(
        &self,
        id: HostServiceId,
        schedule_number: u32,
        schedule_unit: ScheduleUnit,
    ) -> MonitorResult<HostService> {
        if schedule_number == 0 {
            return Err(MonitorError::InvalidSchedule(id));
        }
        let _guard = self.inner.locks.acquire(id).await;
        let engine = &self.inner.engine;

        let mut hs = engine.with_store(move |s| s.get_host_service_by_id(id)).await?;
        hs.schedule_number = schedule_number;
        hs.schedule_unit = schedule_unit;
        hs.updated_at = epoch_secs();
        let record = hs.clone();
        engine.with_store(move |s| s.update_host_service(&record)).await?;

        self.on_host_service_rescheduled(&hs).await?;
        info!(host_service_id = id, schedule = %hs.schedule_descriptor(), "host service rescheduled");
        Ok(hs)
    }

    /// Turn scheduled monitoring on or off.
    ///
    /// Turning it off removes every job before the flag is cleared, so the
    /// removals are still broadcast. Turning it on sets the flag and then
    /// schedules from the store.
    pub async fn set_monitoring_live(&self, enabled: bool) -> MonitorResult<usize> {
        if enabled {
            self.inner.preferences.set_enabled(MONITORING_LIVE, true);
            self.start().await
        } else {
            let removed = self.inner.registry.clear().await;
            self.inner.preferences.set_enabled(MONITORING_LIVE, false);
            info!(removed, "monitoring stopped");
            Ok(0)
        }
    }

    pub async fn schedule_entries(&self) -> Vec<ScheduleEntry> {
        self.inner.registry.entries().await
    }

    /// Stop every job. In-flight checks finish on their own.
    pub async fn shutdown(&self) {
        self.inner.registry.stop_all().await;
    }

    /// Read, probe and reconcile one host service under its lock.
    async fn check(&self, id: HostServiceId) -> MonitorResult<(Host, TransitionReport)> {
        let _guard = self.inner.locks.acquire(id).await;
        let engine = &self.inner.engine;

        let hs = engine.with_store(move |s| s.get_host_service_by_id(id)).await?;
        let host_id = hs.host_id;
        let host = engine.with_store(move |s| s.get_host_by_id(host_id)).await?;

        match probe(hs.service_id, &host.url, self.inner.probe_timeout).await {
            ProbeOutcome::Checked(outcome) => {
                let report = engine.reconcile(&host, hs, &outcome).await;
                Ok((host, report))
            }
            ProbeOutcome::Unsupported(service_id) => Err(MonitorError::UnsupportedService {
                host_service_id: id,
                service_id,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_notify::{ChannelHub, LogMailer};
    use vigil_state::{Service, ServiceStatus, StateStore};

    fn monitor(store: &StateStore, live: bool) -> Monitor {
        let preferences = Preferences::default();
        preferences.set_enabled(MONITORING_LIVE, live);
        Monitor::new(MonitorDeps {
            store: Arc::new(store.clone()),
            broadcaster: Arc::new(ChannelHub::default()),
            notifier: Arc::new(Notifier::new(Arc::new(LogMailer), preferences.clone())),
            preferences,
            config: MonitorConfig::default(),
        })
    }

    fn seed(store: &StateStore, host_active: bool, service_id: u64) -> HostService {
        store
            .put_service(&Service {
                id: service_id,
                service_name: "HTTP".to_string(),
                active: true,
                ..Default::default()
            })
            .unwrap();
        store
            .put_host(&Host {
                id: 1,
                host_name: "web".to_string(),
                url: "http://127.0.0.1:1".to_string(),
                active: host_active,
                ..Default::default()
            })
            .unwrap();
        let hs = HostService {
            id: 10,
            host_id: 1,
            service_id,
            active: true,
            schedule_number: 30,
            schedule_unit: ScheduleUnit::Seconds,
            status: ServiceStatus::Pending,
            ..Default::default()
        };
        store.put_host_service(&hs).unwrap();
        hs
    }

    #[tokio::test]
    async fn start_schedules_services_to_monitor() {
        let store = StateStore::open_in_memory().unwrap();
        seed(&store, true, 1);
        let monitor = monitor(&store, true);

        assert_eq!(monitor.start().await.unwrap(), 1);
        assert!(monitor.registry().is_scheduled(10).await);

        monitor.shutdown().await;
        assert!(monitor.schedule_entries().await.is_empty());
    }

    #[tokio::test]
    async fn start_skips_inactive_hosts() {
        let store = StateStore::open_in_memory().unwrap();
        seed(&store, false, 1);
        let monitor = monitor(&store, true);
        assert_eq!(monitor.start().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn start_does_nothing_when_monitoring_off() {
        let store = StateStore::open_in_memory().unwrap();
        seed(&store, true, 1);
        let monitor = monitor(&store, false);
        assert_eq!(monitor.start().await.unwrap(), 0);
        assert!(monitor.schedule_entries().await.is_empty());
    }

    #[tokio::test]
    async fn toggling_monitoring_clears_and_restores_jobs() {
        let store = StateStore::open_in_memory().unwrap();
        seed(&store, true, 1);
        let monitor = monitor(&store, true);
        monitor.start().await.unwrap();

        monitor.set_monitoring_live(false).await.unwrap();
        assert!(!monitor.preferences().monitoring_live());
        assert!(monitor.schedule_entries().await.is_empty());

        assert_eq!(monitor.set_monitoring_live(true).await.unwrap(), 1);
        assert!(monitor.preferences().monitoring_live());
        assert_eq!(monitor.schedule_entries().await.len(), 1);
        monitor.shutdown().await;
    }

    #[tokio::test]
    async fn deactivation_hook_removes_job() {
        let store = StateStore::open_in_memory().unwrap();
        let hs = seed(&store, true, 1);
        let monitor = monitor(&store, true);

        assert!(monitor.on_host_service_activated(&hs).await.unwrap());
        assert!(monitor.on_host_service_deactivated(&hs).await);
        assert!(!monitor.registry().is_scheduled(hs.id).await);
    }

    #[tokio::test]
    async fn set_active_writes_flag_and_updates_job() {
        let store = StateStore::open_in_memory().unwrap();
        let hs = seed(&store, true, 1);
        let monitor = monitor(&store, true);

        let off = monitor.set_active(hs.id, false).await.unwrap();
        assert!(!off.active);
        assert!(!store.get_host_service(hs.id).unwrap().unwrap().active);
        assert!(!monitor.registry().is_scheduled(hs.id).await);

        monitor.set_active(hs.id, true).await.unwrap();
        assert!(store.get_host_service(hs.id).unwrap().unwrap().active);
        assert!(monitor.registry().is_scheduled(hs.id).await);
        monitor.shutdown().await;
    }

    #[tokio::test]
    async fn set_active_of_unknown_id_is_not_found() {
        let store = StateStore::open_in_memory().unwrap();
        let monitor = monitor(&store, true);
        let err = monitor.set_active(404, true).await.unwrap_err();
        assert!(matches!(err, MonitorError::State(ref e) if e.is_not_found()));
    }

    #[tokio::test]
    async fn set_schedule_persists_and_reschedules() {
        let store = StateStore::open_in_memory().unwrap();
        let hs = seed(&store, true, 1);
        let monitor = monitor(&store, true);
        monitor.on_host_service_activated(&hs).await.unwrap();

        let updated = monitor
            .set_schedule(hs.id, 2, ScheduleUnit::Hours)
            .await
            .unwrap();
        assert_eq!(updated.schedule_descriptor(), "@every 2h");
        let stored = store.get_host_service(hs.id).unwrap().unwrap();
        assert_eq!(stored.schedule_descriptor(), "@every 2h");
        assert_eq!(monitor.schedule_entries().await[0].schedule, "@every 2h");

        let err = monitor
            .set_schedule(hs.id, 0, ScheduleUnit::Seconds)
            .await
            .unwrap_err();
        assert!(matches!(err, MonitorError::InvalidSchedule(10)));
        monitor.shutdown().await;
    }

    #[tokio::test]
    async fn manual_check_of_unknown_id_fails_cleanly() {
        let store = StateStore::open_in_memory().unwrap();
        let monitor = monitor(&store, true);

        let result = monitor.run_manual_check(404, "healthy").await;
        assert!(!result.ok);
        assert_eq!(result.message, "Something went wrong");
        assert_eq!(result.old_status, "healthy");
    }

    #[tokio::test]
    async fn unsupported_kind_writes_nothing() {
        let store = StateStore::open_in_memory().unwrap();
        let hs = seed(&store, true, 3);
        let monitor = monitor(&store, true);

        monitor.run_scheduled_check(hs.id).await;
        let stored = store.get_host_service(hs.id).unwrap().unwrap();
        assert_eq!(stored.status, ServiceStatus::Pending);
        assert_eq!(stored.last_check, 0);
        assert!(store.list_events(10).unwrap().is_empty());

        let result = monitor.run_manual_check(hs.id, "pending").await;
        assert!(!result.ok);
    }
}
