//! vigil-core — configuration and shared runtime settings for Vigil.
//!
//! - [`VigilConfig`] parses `vigil.toml` (server, monitor, and seed
//!   preferences).
//! - [`Preferences`] is the process-wide, read-mostly key/value source the
//!   engine consults on every scheduling and notification decision.
//! - [`parse_duration`] handles the `"5s"` / `"500ms"` / `"2m"` strings used
//!   throughout the config file.

pub mod config;
pub mod duration;
pub mod preferences;

pub use config::{MonitorConfig, ServerConfig, VigilConfig};
pub use duration::parse_duration;
pub use preferences::Preferences;
