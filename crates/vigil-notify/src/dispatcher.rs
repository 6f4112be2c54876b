//! Decides whether and what to send when a host service changes status.
//!
//! Three fixed templates exist (healthy, warning, problem). A transition
//! out of `pending` is a first classification and is never alerted, and
//! `pending` itself never triggers an alert.

use std::sync::Arc;

use tracing::{info, warn};
use vigil_core::Preferences;
use vigil_core::preferences::{
    NOTIFY_EMAIL, NOTIFY_NAME, NOTIFY_VIA_EMAIL, NOTIFY_VIA_SMS, SMS_NOTIFY_NUMBER,
};
use vigil_state::ServiceStatus;

use crate::error::NotifyError;
use crate::mail::{MailMessage, Mailer};
use crate::sms::SmsSender;

/// The facts a notification is rendered from.
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub service_name: String,
    pub host_name: String,
    /// Probe message for the new classification.
    pub message: String,
    pub old_status: ServiceStatus,
    pub new_status: ServiceStatus,
}

/// What the dispatcher did for one transition.
#[derive(Debug, Default)]
pub struct NotifyOutcome {
    pub email_sent: bool,
    pub sms_sent: bool,
    pub errors: Vec<NotifyError>,
}

/// Sends operator alerts according to the preference source.
pub struct Notifier {
    mailer: Arc<dyn Mailer>,
    sms: Option<Arc<dyn SmsSender>>,
    preferences: Preferences,
}

impl Notifier {
    pub fn new(mailer: Arc<dyn Mailer>, preferences: Preferences) -> Self {
        Self {
            mailer,
            sms: None,
            preferences,
        }
    }

    pub fn with_sms(mut self, sms: Arc<dyn SmsSender>) -> Self {
        self.sms = Some(sms);
        self
    }

    /// Whether a transition is alert-worthy at all.
    pub fn should_notify(change: &StatusChange) -> bool {
        change.old_status != ServiceStatus::Pending
            && change.new_status != ServiceStatus::Pending
            && change.old_status != change.new_status
    }

    /// Dispatch email and SMS for a transition. Each channel is attempted
    /// independently and exactly once.
    pub async fn notify(&self, change: &StatusChange) -> NotifyOutcome {
        let mut outcome = NotifyOutcome::default();
        if !Self::should_notify(change) {
            return outcome;
        }

        if self.preferences.is_enabled(NOTIFY_VIA_EMAIL) {
            if let Some(mail) = compose_mail(
                change,
                &self.preferences.get_or_empty(NOTIFY_NAME),
                &self.preferences.get_or_empty(NOTIFY_EMAIL),
            ) {
                match self.mailer.send(&mail).await {
                    Ok(()) => {
                        info!(subject = %mail.subject, "notification email sent");
                        outcome.email_sent = true;
                    }
                    Err(e) => {
                        warn!(error = %e, subject = %mail.subject, "notification email failed");
                        outcome.errors.push(e);
                    }
                }
            }
        }

        if self.preferences.is_enabled(NOTIFY_VIA_SMS) {
            if let (Some(sms), Some(text)) = (&self.sms, compose_text(change)) {
                let to = self.preferences.get_or_empty(SMS_NOTIFY_NUMBER);
                match sms.send_text(&to, &text).await {
                    Ok(()) => outcome.sms_sent = true,
                    Err(e) => {
                        warn!(error = %e, "notification text failed");
                        outcome.errors.push(e);
                    }
                }
            }
        }

        outcome
    }
}

/// Upper-case label used in subjects, or `None` for statuses without a template.
fn subject_label(status: ServiceStatus) -> Option<&'static str> {
    match status {
        ServiceStatus::Healthy => Some("HEALTHY"),
        ServiceStatus::Warning => Some("WARNING"),
        ServiceStatus::Problem => Some("PROBLEM"),
        ServiceStatus::Pending => None,
    }
}

/// Render the email template for the new status.
pub fn compose_mail(change: &StatusChange, to_name: &str, to_address: &str) -> Option<MailMessage> {
    let label = subject_label(change.new_status)?;
    let subject = format!(
        "{label}: service {} on {}",
        change.service_name, change.host_name
    );
    let content = format!(
        "<p>Service {} on {} reported {} status</p>\n<p><strong>Message received:</strong> {}</p>",
        escape_html(&change.service_name),
        escape_html(&change.host_name),
        change.new_status,
        escape_html(&change.message),
    );
    Some(MailMessage {
        to_name: to_name.to_string(),
        to_address: to_address.to_string(),
        subject,
        content,
    })
}

/// One-line text for SMS delivery.
pub fn compose_text(change: &StatusChange) -> Option<String> {
    let label = subject_label(change.new_status)?;
    Some(format!(
        "{label}: service {} on {}",
        change.service_name, change.host_name
    ))
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NotifyResult;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingMailer {
        sent: Mutex<Vec<MailMessage>>,
        fail: bool,
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, mail: &MailMessage) -> NotifyResult<()> {
            if self.fail {
                return Err(NotifyError::Delivery("smtp down".to_string()));
            }
            self.sent.lock().unwrap().push(mail.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingSms {
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl SmsSender for RecordingSms {
        async fn send_text(&self, to: &str, body: &str) -> NotifyResult<()> {
            self.sent
                .lock()
                .unwrap()
                .push((to.to_string(), body.to_string()));
            Ok(())
        }
    }

    fn change(old: ServiceStatus, new: ServiceStatus) -> StatusChange {
        StatusChange {
            service_name: "HTTP".to_string(),
            host_name: "web".to_string(),
            message: "http://web.example.com - 503 Service Unavailable".to_string(),
            old_status: old,
            new_status: new,
        }
    }

    fn prefs(pairs: &[(&str, &str)]) -> Preferences {
        Preferences::new(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
        )
    }

    #[test]
    fn templates_per_status() {
        let mail = compose_mail(
            &change(ServiceStatus::Healthy, ServiceStatus::Problem),
            "Ops",
            "ops@example.com",
        )
        .unwrap();
        assert_eq!(mail.subject, "PROBLEM: service HTTP on web");
        assert!(mail.content.contains("reported problem status"));
        assert!(mail.content.contains("503 Service Unavailable"));
        assert_eq!(mail.to_address, "ops@example.com");

        let mail = compose_mail(
            &change(ServiceStatus::Problem, ServiceStatus::Healthy),
            "",
            "",
        )
        .unwrap();
        assert!(mail.subject.starts_with("HEALTHY:"));

        let mail = compose_mail(
            &change(ServiceStatus::Healthy, ServiceStatus::Warning),
            "",
            "",
        )
        .unwrap();
        assert!(mail.subject.starts_with("WARNING:"));

        assert!(
            compose_mail(&change(ServiceStatus::Healthy, ServiceStatus::Pending), "", "")
                .is_none()
        );
    }

    #[test]
    fn message_is_escaped_in_body() {
        let mut c = change(ServiceStatus::Healthy, ServiceStatus::Problem);
        c.message = "<script>".to_string();
        let mail = compose_mail(&c, "", "").unwrap();
        assert!(mail.content.contains("&lt;script&gt;"));
    }

    #[tokio::test]
    async fn first_classification_is_not_alerted() {
        let mailer = Arc::new(RecordingMailer::default());
        let notifier = Notifier::new(mailer.clone(), prefs(&[(NOTIFY_VIA_EMAIL, "1")]));

        let outcome = notifier
            .notify(&change(ServiceStatus::Pending, ServiceStatus::Problem))
            .await;
        assert!(!outcome.email_sent);
        assert!(mailer.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn email_sent_once_when_enabled() {
        let mailer = Arc::new(RecordingMailer::default());
        let notifier = Notifier::new(
            mailer.clone(),
            prefs(&[
                (NOTIFY_VIA_EMAIL, "1"),
                (NOTIFY_NAME, "Ops"),
                (NOTIFY_EMAIL, "ops@example.com"),
            ]),
        );

        let outcome = notifier
            .notify(&change(ServiceStatus::Healthy, ServiceStatus::Problem))
            .await;
        assert!(outcome.email_sent);
        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to_name, "Ops");
    }

    #[tokio::test]
    async fn email_disabled_sends_nothing() {
        let mailer = Arc::new(RecordingMailer::default());
        let notifier = Notifier::new(mailer.clone(), prefs(&[(NOTIFY_VIA_EMAIL, "0")]));

        notifier
            .notify(&change(ServiceStatus::Healthy, ServiceStatus::Problem))
            .await;
        assert!(mailer.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn mail_failure_does_not_skip_sms() {
        let mailer = Arc::new(RecordingMailer {
            fail: true,
            ..Default::default()
        });
        let sms = Arc::new(RecordingSms::default());
        let notifier = Notifier::new(
            mailer,
            prefs(&[
                (NOTIFY_VIA_EMAIL, "1"),
                (NOTIFY_VIA_SMS, "1"),
                (SMS_NOTIFY_NUMBER, "+15550002222"),
            ]),
        )
        .with_sms(sms.clone());

        let outcome = notifier
            .notify(&change(ServiceStatus::Problem, ServiceStatus::Healthy))
            .await;
        assert!(!outcome.email_sent);
        assert!(outcome.sms_sent);
        assert_eq!(outcome.errors.len(), 1);

        let texts = sms.sent.lock().unwrap();
        assert_eq!(texts[0].0, "+15550002222");
        assert_eq!(texts[0].1, "HEALTHY: service HTTP on web");
    }
}
