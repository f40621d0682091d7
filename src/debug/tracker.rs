use crate::dap::types::Message;
use crate::translate::coordinates::source_path;
use crate::Result;
use serde_json::Value;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{debug, info};

/// Read-only observer of the messages crossing a session.
///
/// Both hooks default to doing nothing. Errors and panics raised by an
/// implementation are logged and dropped; they never affect message flow.
pub trait LocationTracker: Send + Sync {
    /// A message arriving from the editor, before translation.
    fn on_will_receive_message(&self, _message: &Message) -> Result<()> {
        Ok(())
    }

    /// A message about to be sent to the editor, after translation.
    fn on_did_send_message(&self, _message: &Message) -> Result<()> {
        Ok(())
    }
}

pub struct NoopTracker;

impl LocationTracker for NoopTracker {}

/// Logs every source location that reaches or leaves the editor.
pub struct LoggingTracker;

impl LoggingTracker {
    fn log_locations(direction: &str, message: &Message) {
        let payload = match message {
            Message::Request(req) => req.arguments.as_ref(),
            Message::Response(resp) => resp.body.as_ref(),
            Message::Event(evt) => evt.body.as_ref(),
        };
        let Some(payload) = payload else {
            return;
        };

        let mut locations = Vec::new();
        collect_locations(payload, &mut locations);
        for (path, line) in locations {
            info!("📍 {} {}: {}:{}", direction, message.label(), path, line.unwrap_or(0));
        }
    }
}

impl LocationTracker for LoggingTracker {
    fn on_will_receive_message(&self, message: &Message) -> Result<()> {
        Self::log_locations("editor ->", message);
        Ok(())
    }

    fn on_did_send_message(&self, message: &Message) -> Result<()> {
        Self::log_locations("-> editor", message);
        Ok(())
    }
}

fn collect_locations(value: &Value, out: &mut Vec<(String, Option<i64>)>) {
    match value {
        Value::Object(object) => {
            if let Some(path) = source_path(object) {
                out.push((path.to_string(), object.get("line").and_then(Value::as_i64)));
            }
            for nested in object.values() {
                collect_locations(nested, out);
            }
        }
        Value::Array(items) => items.iter().for_each(|item| collect_locations(item, out)),
        _ => {}
    }
}

/// Run a tracker hook, swallowing its errors and panics.
pub(crate) fn notify<F>(hook: &str, f: F)
where
    F: FnOnce() -> Result<()>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!("Location tracker {} failed: {}", hook, e),
        Err(_) => debug!("Location tracker {} panicked", hook),
    }
}

/// Tracker that always fails, for exercising isolation.
#[cfg(test)]
pub(crate) struct FailingTracker;

#[cfg(test)]
impl LocationTracker for FailingTracker {
    fn on_will_receive_message(&self, _message: &Message) -> Result<()> {
        Err(crate::Error::Internal("tracker exploded".to_string()))
    }

    fn on_did_send_message(&self, _message: &Message) -> Result<()> {
        panic!("tracker panicked");
    }
}
