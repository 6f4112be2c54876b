//! vigil-notify — outbound side effects of a status transition.
//!
//! - [`Broadcaster`] publishes named, flat string-keyed messages to the
//!   live-dashboard channel. [`ChannelHub`] is the in-process
//!   implementation that SSE clients subscribe to.
//! - [`Mailer`] and [`SmsSender`] deliver operator alerts. [`LogMailer`]
//!   logs the composed message; [`TwilioSms`] posts to the Twilio API.
//! - [`Notifier`] picks the template for the new status and applies the
//!   operator preferences (email/SMS switches, no alert out of `pending`).
//!
//! Every sender is best-effort: failures are returned to the caller for
//! logging and never retried.

pub mod broadcast;
pub mod dispatcher;
pub mod error;
pub mod mail;
pub mod sms;

pub use broadcast::{BroadcastMessage, Broadcaster, ChannelHub, Payload};
pub use dispatcher::{NotifyOutcome, Notifier, StatusChange};
pub use error::{NotifyError, NotifyResult};
pub use mail::{LogMailer, MailMessage, Mailer};
pub use sms::{SmsSender, TwilioSms};
