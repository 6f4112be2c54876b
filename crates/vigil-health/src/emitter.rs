//! Live-dashboard payloads.
//!
//! Every payload is a flat string map. Times are rendered in UTC as
//! `%Y-%m-%d %H:%M:%S`.

use std::sync::Arc;

use tracing::error;
use vigil_notify::broadcast::{
    HOST_SERVICE_COUNT_CHANGED, HOST_SERVICE_STATUS_CHANGED, SCHEDULE_CHANGED,
    SCHEDULE_ITEM_REMOVED,
};
use vigil_notify::{Broadcaster, NotifyResult, Payload};
use vigil_state::{Host, HostService, HostServiceId, ServiceStatus, StatusCounts};

/// Next-run placeholder when no timer entry exists yet.
pub const NEXT_RUN_PENDING: &str = "Pending...";

/// Render unix seconds for the dashboard.
pub fn format_timestamp(timestamp_secs: u64) -> String {
    chrono::DateTime::from_timestamp(timestamp_secs as i64, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

pub(crate) fn epoch_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Publishes engine payloads to one channel. Failures are logged only.
#[derive(Clone)]
pub struct Emitter {
    broadcaster: Arc<dyn Broadcaster>,
    channel: String,
}

impl Emitter {
    pub fn new(broadcaster: Arc<dyn Broadcaster>, channel: impl Into<String>) -> Self {
        Self {
            broadcaster,
            channel: channel.into(),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Publish and log on failure. Returns the error for callers that
    /// collect them.
    pub fn emit(&self, event: &str, payload: &Payload) -> NotifyResult<()> {
        let result = self.broadcaster.publish(&self.channel, event, payload);
        if let Err(e) = &result {
            error!(channel = %self.channel, %event, error = %e, "broadcast failed");
        }
        result
    }

    pub fn counts_changed(&self, counts: &StatusCounts) -> NotifyResult<()> {
        self.emit(HOST_SERVICE_COUNT_CHANGED, &counts_payload(counts))
    }

    pub fn status_changed(
        &self,
        host: &Host,
        hs: &HostService,
        new_status: ServiceStatus,
        now: u64,
    ) -> NotifyResult<()> {
        self.emit(
            HOST_SERVICE_STATUS_CHANGED,
            &status_changed_payload(host, hs, new_status, now),
        )
    }

    pub fn schedule_changed(
        &self,
        hs: &HostService,
        new_status: ServiceStatus,
        next_run: Option<u64>,
        now: u64,
    ) -> NotifyResult<()> {
        self.emit(
            SCHEDULE_CHANGED,
            &schedule_changed_payload(hs, new_status, next_run, now),
        )
    }

    pub fn scheduling(&self, hs: &HostService) -> NotifyResult<()> {
        self.emit(SCHEDULE_CHANGED, &scheduling_payload(hs))
    }

    pub fn schedule_item_removed(&self, id: HostServiceId) -> NotifyResult<()> {
        let payload = Payload::from([("host_service_id".to_string(), id.to_string())]);
        self.emit(SCHEDULE_ITEM_REMOVED, &payload)
    }
}

pub fn counts_payload(counts: &StatusCounts) -> Payload {
    Payload::from([
        ("healthy_count".to_string(), counts.healthy.to_string()),
        ("warning_count".to_string(), counts.warning.to_string()),
        ("problem_count".to_string(), counts.problem.to_string()),
        ("pending_count".to_string(), counts.pending.to_string()),
    ])
}

pub fn status_changed_payload(
    host: &Host,
    hs: &HostService,
    new_status: ServiceStatus,
    now: u64,
) -> Payload {
    let service_name = &hs.service.service_name;
    Payload::from([
        ("host_id".to_string(), hs.host_id.to_string()),
        ("host_service_id".to_string(), hs.id.to_string()),
        ("host_name".to_string(), host.host_name.clone()),
        ("service_name".to_string(), service_name.clone()),
        ("icon".to_string(), hs.service.icon.clone()),
        ("status".to_string(), new_status.to_string()),
        (
            "message".to_string(),
            format!("{service_name} on {} reports {new_status}", host.host_name),
        ),
        ("last_message".to_string(), hs.last_message.clone()),
        ("last_check".to_string(), format_timestamp(now)),
    ])
}

pub fn schedule_changed_payload(
    hs: &HostService,
    new_status: ServiceStatus,
    next_run: Option<u64>,
    now: u64,
) -> Payload {
    Payload::from([
        ("host_id".to_string(), hs.host_id.to_string()),
        ("host_service_id".to_string(), hs.id.to_string()),
        ("service_id".to_string(), hs.service_id.to_string()),
        (
            "next_run".to_string(),
            next_run
                .map(format_timestamp)
                .unwrap_or_else(|| NEXT_RUN_PENDING.to_string()),
        ),
        ("last_run".to_string(), format_timestamp(now)),
        ("host".to_string(), hs.host_name.clone()),
        ("service".to_string(), hs.service.service_name.clone()),
        ("schedule".to_string(), hs.schedule_descriptor()),
        ("status".to_string(), new_status.to_string()),
        ("icon".to_string(), hs.service.icon.clone()),
    ])
}

pub fn scheduling_payload(hs: &HostService) -> Payload {
    Payload::from([
        ("message".to_string(), "scheduling".to_string()),
        ("host_service_id".to_string(), hs.id.to_string()),
        ("next_run".to_string(), NEXT_RUN_PENDING.to_string()),
        ("service".to_string(), hs.service.service_name.clone()),
        ("host".to_string(), hs.host_name.clone()),
        ("last_run".to_string(), format_timestamp(hs.last_check)),
        ("schedule".to_string(), hs.schedule_descriptor()),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_state::{ScheduleUnit, Service};

    fn sample() -> (Host, HostService) {
        let host = Host {
            id: 3,
            host_name: "web".to_string(),
            url: "https://example.com".to_string(),
            active: true,
            ..Default::default()
        };
        let hs = HostService {
            id: 7,
            host_id: 3,
            service_id: 1,
            active: true,
            schedule_number: 3,
            schedule_unit: ScheduleUnit::Minutes,
            status: ServiceStatus::Healthy,
            last_message: "http://example.com - 503 Service Unavailable".to_string(),
            host_name: "web".to_string(),
            service: Service {
                id: 1,
                service_name: "HTTP".to_string(),
                icon: "fas fa-server".to_string(),
                active: true,
                ..Default::default()
            },
            ..Default::default()
        };
        (host, hs)
    }

    #[test]
    fn format_timestamp_is_utc() {
        assert_eq!(format_timestamp(0), "1970-01-01 00:00:00");
        assert_eq!(format_timestamp(86_400 + 61), "1970-01-02 00:01:01");
    }

    #[test]
    fn status_changed_fields() {
        let (host, hs) = sample();
        let payload = status_changed_payload(&host, &hs, ServiceStatus::Problem, 0);
        assert_eq!(payload["host_service_id"], "7");
        assert_eq!(payload["status"], "problem");
        assert_eq!(payload["message"], "HTTP on web reports problem");
        assert_eq!(payload["icon"], "fas fa-server");
        assert_eq!(payload["last_check"], "1970-01-01 00:00:00");
    }

    #[test]
    fn schedule_changed_uses_placeholder_without_entry() {
        let (_, hs) = sample();
        let payload = schedule_changed_payload(&hs, ServiceStatus::Problem, None, 0);
        assert_eq!(payload["next_run"], NEXT_RUN_PENDING);
        assert_eq!(payload["schedule"], "@every 3m");

        let payload = schedule_changed_payload(&hs, ServiceStatus::Problem, Some(60), 0);
        assert_eq!(payload["next_run"], "1970-01-01 00:01:00");
    }

    #[test]
    fn counts_fields() {
        let counts = StatusCounts {
            healthy: 4,
            warning: 0,
            problem: 1,
            pending: 2,
        };
        let payload = counts_payload(&counts);
        assert_eq!(payload["healthy_count"], "4");
        assert_eq!(payload["problem_count"], "1");
        assert_eq!(payload["pending_count"], "2");
        assert_eq!(payload.len(), 4);
    }
}
