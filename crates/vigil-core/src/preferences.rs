//! Preference source — process-wide operator settings.
//!
//! Populated once at startup from `[preferences]` in vigil.toml and updated
//! by administrative actions (e.g. toggling monitoring). Every clone shares
//! the same underlying map.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

/// Master switch for scheduled monitoring.
pub const MONITORING_LIVE: &str = "monitoring_live";
/// Send email on status transitions.
pub const NOTIFY_VIA_EMAIL: &str = "notify_via_email";
/// Send a text message on status transitions.
pub const NOTIFY_VIA_SMS: &str = "notify_via_sms";
/// Display name of the operator receiving notifications.
pub const NOTIFY_NAME: &str = "notify_name";
/// Address of the operator receiving notifications.
pub const NOTIFY_EMAIL: &str = "notify_email";
/// Phone number receiving text notifications.
pub const SMS_NOTIFY_NUMBER: &str = "sms_notify_number";
pub const TWILIO_SID: &str = "twilio_sid";
pub const TWILIO_AUTH_TOKEN: &str = "twilio_auth_token";
pub const TWILIO_PHONE_NUMBER: &str = "twilio_phone_number";

/// Shared string-keyed settings map.
#[derive(Debug, Clone, Default)]
pub struct Preferences {
    inner: Arc<RwLock<HashMap<String, String>>>,
}

impl Preferences {
    pub fn new(values: HashMap<String, String>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(values)),
        }
    }

    /// Value for `key`, if set.
    pub fn get(&self, key: &str) -> Option<String> {
        let map = self.inner.read().unwrap_or_else(|e| e.into_inner());
        map.get(key).cloned()
    }

    /// Value for `key`, or the empty string.
    pub fn get_or_empty(&self, key: &str) -> String {
        self.get(key).unwrap_or_default()
    }

    /// A flag is on when its value is exactly `"1"`.
    pub fn is_enabled(&self, key: &str) -> bool {
        let map = self.inner.read().unwrap_or_else(|e| e.into_inner());
        map.get(key).is_some_and(|v| v == "1")
    }

    pub fn set(&self, key: &str, value: impl Into<String>) {
        let value = value.into();
        debug!(%key, %value, "preference updated");
        let mut map = self.inner.write().unwrap_or_else(|e| e.into_inner());
        map.insert(key.to_string(), value);
    }

    pub fn set_enabled(&self, key: &str, enabled: bool) {
        self.set(key, if enabled { "1" } else { "0" });
    }

    pub fn monitoring_live(&self) -> bool {
        self.is_enabled(MONITORING_LIVE)
    }

    /// Copy of the current map.
    pub fn snapshot(&self) -> HashMap<String, String> {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl From<HashMap<String, String>> for Preferences {
    fn from(values: HashMap<String, String>) -> Self {
        Self::new(values)
    }
}
