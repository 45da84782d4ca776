use crate::event::ServerEvent;

use super::{registry::ConnectionRegistry, ChatMessage, ConnectionId, JoinNotice};

/// Per-recipient tally of one fan-out.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Fanout {
    pub delivered: usize,
    pub failed: usize,
}

fn fan_out<'a>(registry: &ConnectionRegistry, recipients: impl IntoIterator<Item = &'a ConnectionId>, event: &ServerEvent) -> Fanout {
    let mut fanout = Fanout::default();
    for &conn in recipients {
        let outcome = registry.deliver(conn, event.clone());
        if outcome.is_queued() {
            fanout.delivered += 1;
        } else {
            // one bad recipient never stops the rest
            fanout.failed += 1;
            tracing::debug!(%conn, ?outcome, "delivery failed");
        }
    }
    fanout
}

/// Tells the room that `joiner` arrived. `members` is the post-join list and
/// travels with the event.
pub(crate) fn notify_joined(registry: &ConnectionRegistry, joiner: ConnectionId, members: &[ConnectionId], notice: JoinNotice) -> Fanout {
    let event = ServerEvent::UserJoined { id: joiner, members: members.to_vec() };
    let recipients = members
        .iter()
        .filter(|&&member| notice == JoinNotice::Everyone || member != joiner);

    fan_out(registry, recipients, &event)
}

pub(crate) fn notify_left(registry: &ConnectionRegistry, departed: ConnectionId, remaining: &[ConnectionId]) -> Fanout {
    fan_out(registry, remaining, &ServerEvent::UserLeft { id: departed })
}

/// Sends the message to every member, the author included.
pub(crate) fn broadcast_chat(registry: &ConnectionRegistry, message: &ChatMessage, members: &[ConnectionId]) -> Fanout {
    fan_out(registry, members, &ServerEvent::from(message))
}
