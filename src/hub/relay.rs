use serde_json::Value;

use crate::event::ServerEvent;

use super::{registry::{ConnectionRegistry, Delivery}, ConnectionId};

/// Hands `payload` to `target` untouched, stamped with the sender's id.
/// Nothing is stored and nothing is retried: an absent target just means the
/// signal is gone.
pub(crate) fn relay(registry: &ConnectionRegistry, from: ConnectionId, target: ConnectionId, payload: Value) -> Delivery {
    let outcome = registry.deliver(target, ServerEvent::Signal { from, payload });
    if !outcome.is_queued() {
        tracing::debug!(conn = %from, %target, ?outcome, "signal dropped");
    }
    outcome
}
