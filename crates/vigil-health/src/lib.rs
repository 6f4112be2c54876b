//! vigil-health — the check engine.
//!
//! Probes host services on their own schedules, classifies the outcome,
//! and reconciles it against the stored status.
//!
//! # Architecture
//!
//! ```text
//! Monitor
//!   ├── JobRegistry (one timer task per active host service)
//!   │   └── tick → Monitor::run_scheduled_check(id)
//!   ├── per-host-service lock
//!   ├── probe(service kind, url) → CheckOutcome
//!   └── TransitionEngine::reconcile
//!       ├── Repository (update, event, counts)
//!       ├── Notifier (email / SMS)
//!       └── Emitter → Broadcaster
//! ```
//!
//! Nothing here is fatal to the process. A failed store call aborts one
//! pipeline; a failed broadcast or notification is logged and recorded in
//! the [`TransitionReport`].

pub mod checker;
pub mod emitter;
pub mod error;
pub mod monitor;
pub mod registry;
pub mod transition;

pub use checker::{CheckOutcome, ProbeOutcome, http_probe, probe};
pub use emitter::{Emitter, format_timestamp};
pub use error::{MonitorError, MonitorResult};
pub use monitor::{ManualCheckResult, Monitor, MonitorDeps};
pub use registry::{CheckRunner, JobRegistry, ScheduleEntry};
pub use transition::{TransitionEngine, TransitionReport};
