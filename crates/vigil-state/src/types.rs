//! Domain types for the Vigil state store.
//!
//! These types represent the persisted state of hosts, service kinds, host
//! services, and status-change events. All types are serializable to/from
//! JSON for storage in redb tables.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub type HostId = u64;
pub type ServiceId = u64;
pub type HostServiceId = u64;
pub type EventId = u64;

// ── Status ────────────────────────────────────────────────────────

/// Health classification of a host service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    /// Never classified yet.
    #[default]
    Pending,
    Healthy,
    Warning,
    Problem,
}

impl ServiceStatus {
    pub const ALL: [ServiceStatus; 4] = [
        ServiceStatus::Pending,
        ServiceStatus::Healthy,
        ServiceStatus::Warning,
        ServiceStatus::Problem,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceStatus::Pending => "pending",
            ServiceStatus::Healthy => "healthy",
            ServiceStatus::Warning => "warning",
            ServiceStatus::Problem => "problem",
        }
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ServiceStatus::Pending),
            "healthy" => Ok(ServiceStatus::Healthy),
            "warning" => Ok(ServiceStatus::Warning),
            "problem" => Ok(ServiceStatus::Problem),
            other => Err(format!("unknown status: {other}")),
        }
    }
}

// ── Schedule ──────────────────────────────────────────────────────

/// Unit of a host service's check interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ScheduleUnit {
    #[serde(rename = "s")]
    Seconds,
    #[default]
    #[serde(rename = "m")]
    Minutes,
    #[serde(rename = "h")]
    Hours,
}

impl ScheduleUnit {
    /// Single-letter unit code used in `@every` descriptors.
    pub fn code(&self) -> &'static str {
        match self {
            ScheduleUnit::Seconds => "s",
            ScheduleUnit::Minutes => "m",
            ScheduleUnit::Hours => "h",
        }
    }

    fn seconds(&self) -> u64 {
        match self {
            ScheduleUnit::Seconds => 1,
            ScheduleUnit::Minutes => 60,
            ScheduleUnit::Hours => 3600,
        }
    }
}

impl FromStr for ScheduleUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "s" => Ok(ScheduleUnit::Seconds),
            "m" => Ok(ScheduleUnit::Minutes),
            "h" => Ok(ScheduleUnit::Hours),
            other => Err(format!("unknown schedule unit: {other}")),
        }
    }
}

// ── Service kind ──────────────────────────────────────────────────

/// A kind of check (HTTP, HTTPS, SSL certificate, ...).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Service {
    pub id: ServiceId,
    pub service_name: String,
    /// Icon class shown on the dashboard.
    pub icon: String,
    pub active: bool,
    pub created_at: u64,
    pub updated_at: u64,
}

// ── Host ──────────────────────────────────────────────────────────

/// A monitored target.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Host {
    pub id: HostId,
    pub host_name: String,
    pub canonical_name: String,
    pub url: String,
    pub ip: String,
    pub ipv6: String,
    pub location: String,
    pub os: String,
    pub active: bool,
    pub created_at: u64,
    pub updated_at: u64,
}

// ── Host service ──────────────────────────────────────────────────

/// One monitored capability bound to one host.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HostService {
    pub id: HostServiceId,
    pub host_id: HostId,
    pub service_id: ServiceId,
    pub active: bool,
    pub schedule_number: u32,
    pub schedule_unit: ScheduleUnit,
    pub status: ServiceStatus,
    pub last_message: String,
    /// Unix timestamp of the last completed check (0 = never).
    pub last_check: u64,
    pub created_at: u64,
    pub updated_at: u64,
    /// Filled in from the owning host on read; not stored with the row.
    #[serde(default)]
    pub host_name: String,
    /// Filled in from the services table on read; not stored with the row.
    #[serde(default)]
    pub service: Service,
}

impl HostService {
    /// Check interval, or `None` for a zero schedule.
    pub fn interval(&self) -> Option<Duration> {
        if self.schedule_number == 0 {
            return None;
        }
        Some(Duration::from_secs(
            u64::from(self.schedule_number) * self.schedule_unit.seconds(),
        ))
    }

    /// Schedule descriptor as shown on the dashboard, e.g. `@every 3m`.
    pub fn schedule_descriptor(&self) -> String {
        format!("@every {}{}", self.schedule_number, self.schedule_unit.code())
    }
}

// ── Event ─────────────────────────────────────────────────────────

/// Write-once record of a status transition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    /// Assigned by the store on insert.
    pub id: EventId,
    /// The new status.
    pub event_type: ServiceStatus,
    pub host_service_id: HostServiceId,
    pub host_id: HostId,
    pub service_name: String,
    pub host_name: String,
    pub message: String,
    pub created_at: u64,
}

// ── Aggregates ────────────────────────────────────────────────────

/// Count of active host services per status.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusCounts {
    pub healthy: u32,
    pub warning: u32,
    pub problem: u32,
    pub pending: u32,
}

impl StatusCounts {
    pub fn record(&mut self, status: ServiceStatus) {
        match status {
            ServiceStatus::Healthy => self.healthy += 1,
            ServiceStatus::Warning => self.warning += 1,
            ServiceStatus::Problem => self.problem += 1,
            ServiceStatus::Pending => self.pending += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.healthy + self.warning + self.problem + self.pending
    }
}
