/// Outbound notification seam. Delivery is an external collaborator: the
/// engines treat it as fire-and-forget, and a failed send must never undo a
/// committed operation.
pub trait Notifier {
    fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), String>;
}

/// Default transport: record the notification in the log stream. A real
/// deployment swaps this for an SMTP-backed implementation behind the same
/// trait.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), String> {
        tracing::info!(to, subject, body, "notification dispatched");
        Ok(())
    }
}

/// Best-effort dispatch: failures are reported at warn level and swallowed.
pub fn send_best_effort(notifier: &dyn Notifier, to: &str, subject: &str, body: &str) {
    if let Err(e) = notifier.send(to, subject, body) {
        tracing::warn!(to, subject, error = %e, "notification delivery failed");
    }
}
