//! Check engine error types.

use std::time::Duration;

use thiserror::Error;
use vigil_state::{HostServiceId, ServiceId};

/// Errors that can occur while running a check pipeline or managing jobs.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("state store error: {0}")]
    State(#[from] vigil_state::StateError),

    #[error("store call timed out after {0:?}")]
    StoreTimeout(Duration),

    #[error("store task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("unsupported service kind {service_id} for host service {host_service_id}")]
    UnsupportedService {
        host_service_id: HostServiceId,
        service_id: ServiceId,
    },

    #[error("invalid schedule for host service {0}")]
    InvalidSchedule(HostServiceId),

    #[error("notification error: {0}")]
    Notify(#[from] vigil_notify::NotifyError),
}

pub type MonitorResult<T> = Result<T, MonitorError>;
