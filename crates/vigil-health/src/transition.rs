//! Status transition engine.
//!
//! Compares a fresh [`CheckOutcome`] against the persisted status of one
//! host service and performs the side effects of a change, in order:
//!
//! 1. persist the host service (status, last check, last message)
//! 2. append an event
//! 3. recount and broadcast aggregate counts
//! 4. notify the operator (email/SMS, subject to preferences)
//! 5. broadcast `host-service-status-changed`
//! 6. broadcast `schedule-changed` with the next run time
//!
//! A failing step is logged and recorded in the report; the remaining
//! steps still run. Without a change only the last check time and message
//! are persisted.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};
use vigil_notify::{Notifier, StatusChange};
use vigil_state::{
    Event, EventId, Host, HostService, Repository, ServiceStatus, StateResult,
};

use crate::checker::CheckOutcome;
use crate::emitter::{Emitter, epoch_secs};
use crate::error::{MonitorError, MonitorResult};
use crate::registry::JobRegistry;

/// What a reconcile did.
#[derive(Debug)]
pub struct TransitionReport {
    /// The host service as written back.
    pub host_service: HostService,
    pub old_status: ServiceStatus,
    pub changed: bool,
    /// Whether the host service write succeeded.
    pub persisted: bool,
    pub event_id: Option<EventId>,
    pub email_sent: bool,
    pub sms_sent: bool,
    /// Failures of individual steps, in step order.
    pub errors: Vec<MonitorError>,
}

impl TransitionReport {
    pub fn new_status(&self) -> ServiceStatus {
        self.host_service.status
    }
}

#[derive(Clone)]
pub struct TransitionEngine {
    store: Arc<dyn Repository>,
    emitter: Emitter,
    notifier: Arc<Notifier>,
    registry: JobRegistry,
    store_timeout: Duration,
}

impl TransitionEngine {
    pub fn new(
        store: Arc<dyn Repository>,
        emitter: Emitter,
        notifier: Arc<Notifier>,
        registry: JobRegistry,
        store_timeout: Duration,
    ) -> Self {
        Self {
            store,
            emitter,
            notifier,
            registry,
            store_timeout,
        }
    }

    /// Run a store call on the blocking pool under the store timeout.
    pub async fn with_store<T, F>(&self, op: F) -> MonitorResult<T>
    where
        F: FnOnce(&dyn Repository) -> StateResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.store.clone();
        let task = tokio::task::spawn_blocking(move || op(store.as_ref()));
        match tokio::time::timeout(self.store_timeout, task).await {
            Ok(joined) => Ok(joined??),
            Err(_) => Err(MonitorError::StoreTimeout(self.store_timeout)),
        }
    }

    /// Apply `outcome` to `hs` and fan out the side effects of a change.
    pub async fn reconcile(
        &self,
        host: &Host,
        hs: HostService,
        outcome: &CheckOutcome,
    ) -> TransitionReport {
        let now = epoch_secs();
        let old_status = hs.status;
        let new_status = outcome.status;

        let mut updated = hs;
        updated.status = new_status;
        updated.last_check = now;
        updated.last_message = outcome.message.clone();
        if new_status != old_status {
            updated.updated_at = now;
        }

        let mut report = TransitionReport {
            host_service: updated.clone(),
            old_status,
            changed: new_status != old_status,
            persisted: false,
            event_id: None,
            email_sent: false,
            sms_sent: false,
            errors: Vec::new(),
        };

        // 1. persist
        let record = updated.clone();
        match self
            .with_store(move |s| s.update_host_service(&record))
            .await
        {
            Ok(()) => report.persisted = true,
            Err(e) => {
                error!(host_service_id = updated.id, error = %e, "failed to persist host service");
                report.errors.push(e);
            }
        }

        if !report.changed {
            debug!(host_service_id = updated.id, status = %new_status, "status unchanged");
            return report;
        }

        if new_status == ServiceStatus::Problem {
            warn!(
                host_service_id = updated.id,
                host = %host.host_name,
                service = %updated.service.service_name,
                from = %old_status,
                to = %new_status,
                message = %outcome.message,
                "host service status changed"
            );
        } else {
            info!(
                host_service_id = updated.id,
                host = %host.host_name,
                service = %updated.service.service_name,
                from = %old_status,
                to = %new_status,
                "host service status changed"
            );
        }

        // 2. event
        let event = Event {
            id: 0,
            event_type: new_status,
            host_service_id: updated.id,
            host_id: host.id,
            service_name: updated.service.service_name.clone(),
            host_name: host.host_name.clone(),
            message: outcome.message.clone(),
            created_at: now,
        };
        match self.with_store(move |s| s.insert_event(&event)).await {
            Ok(id) => report.event_id = Some(id),
            Err(e) => {
                error!(host_service_id = updated.id, error = %e, "failed to record event");
                report.errors.push(e);
            }
        }

        // 3. counts
        match self
            .with_store(|s| s.get_all_service_status_counts())
            .await
        {
            Ok(counts) => {
                if let Err(e) = self.emitter.counts_changed(&counts) {
                    report.errors.push(e.into());
                }
            }
            Err(e) => {
                error!(error = %e, "failed to recount service statuses");
                report.errors.push(e);
            }
        }

        // 4. notify
        let change = StatusChange {
            service_name: updated.service.service_name.clone(),
            host_name: host.host_name.clone(),
            message: outcome.message.clone(),
            old_status,
            new_status,
        };
        let notified = self.notifier.notify(&change).await;
        report.email_sent = notified.email_sent;
        report.sms_sent = notified.sms_sent;
        report
            .errors
            .extend(notified.errors.into_iter().map(MonitorError::from));

        // 5. status changed
        if let Err(e) = self.emitter.status_changed(host, &updated, new_status, now) {
            report.errors.push(e.into());
        }

        // 6. next run
        let next_run = self.registry.next_run(updated.id).await;
        if let Err(e) = self
            .emitter
            .schedule_changed(&updated, new_status, next_run, now)
        {
            report.errors.push(e.into());
        }

        report
    }
}
