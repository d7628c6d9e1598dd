//! User-facing notices

use tracing::warn;

/// Shown when a signed-out user tries to chat
pub const LOGIN_REQUIRED_NOTICE: &str = "Please log in to chat.";

pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str);
}

/// Notices go to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, message: &str) {
        warn!("{}", message);
    }
}

impl<F> Notifier for F
where
    F: Fn(&str) + Send + Sync,
{
    fn notify(&self, message: &str) {
        self(message)
    }
}
