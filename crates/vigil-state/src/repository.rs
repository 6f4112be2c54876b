//! The storage seam used by the check engine.

use crate::error::StateResult;
use crate::types::*;

/// Store operations the check engine depends on.
///
/// Calls are synchronous; the engine runs them on the blocking pool under a
/// timeout. A missing record is reported as one of the `*NotFound` variants
/// of [`crate::StateError`].
pub trait Repository: Send + Sync + 'static {
    fn get_host_by_id(&self, id: HostId) -> StateResult<Host>;

    /// Host service with its service kind and host name filled in.
    fn get_host_service_by_id(&self, id: HostServiceId) -> StateResult<HostService>;

    fn update_host_service(&self, hs: &HostService) -> StateResult<()>;

    /// Append an event and return its assigned id.
    fn insert_event(&self, event: &Event) -> StateResult<EventId>;

    /// Count of active host services per status.
    fn get_all_service_status_counts(&self) -> StateResult<StatusCounts>;

    /// Active host services on active hosts.
    fn get_services_to_monitor(&self) -> StateResult<Vec<HostService>>;
}
