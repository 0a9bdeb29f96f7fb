use crate::client::ClientId;
use roomworld_shared::protocol::ServerMsg;

/// A message addressed to one client.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub to: ClientId,
    pub msg: ServerMsg,
}

/// Messages produced while a world runs, delivered by the engine afterwards.
///
/// Subsystems never talk to sockets directly; they queue here and the engine
/// drains the queue once the tick (or command) has finished.
#[derive(Debug, Default)]
pub struct Outbox {
    queue: Vec<Envelope>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send(&mut self, to: ClientId, msg: ServerMsg) {
        self.queue.push(Envelope { to, msg });
    }

    /// Drop everything still queued for `id` (it disconnected).
    pub fn discard_for(&mut self, id: ClientId) {
        self.queue.retain(|e| e.to != id);
    }

    pub fn drain(&mut self) -> Vec<Envelope> {
        std::mem::take(&mut self.queue)
    }

    /// Queued messages for one client, in send order.
    pub fn messages_for(&self, id: ClientId) -> impl Iterator<Item = &ServerMsg> {
        self.queue.iter().filter(move |e| e.to == id).map(|e| &e.msg)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(t: &str) -> ServerMsg {
        ServerMsg::DisplayText {
            text: t.to_string(),
        }
    }

    #[test]
    fn drain_empties_queue_in_order() {
        let mut outbox = Outbox::new();
        outbox.send(1, text("a"));
        outbox.send(2, text("b"));
        let drained = outbox.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].to, 1);
        assert_eq!(drained[1].to, 2);
        assert!(outbox.is_empty());
    }

    #[test]
    fn discard_for_only_removes_that_client() {
        let mut outbox = Outbox::new();
        outbox.send(1, text("a"));
        outbox.send(2, text("b"));
        outbox.send(1, text("c"));
        outbox.discard_for(1);
        assert_eq!(outbox.len(), 1);
        assert_eq!(outbox.messages_for(2).count(), 1);
    }
}
