use crate::client::{Client, ClientId};
use crate::outbox::Outbox;
use roomworld_shared::protocol::{ChatMsg, ServerMsg};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    #[error("chat message is empty")]
    Empty,
    #[error("chat message longer than {0} characters")]
    TooLong(usize),
    #[error("client {0} is not in this world")]
    UnknownSender(ClientId),
}

/// Relays chat lines to everyone in the sender's room.
#[derive(Debug, Clone)]
pub struct Chat {
    max_len: usize,
}

impl Chat {
    pub fn new(max_len: usize) -> Self {
        Self { max_len }
    }

    pub fn handle_chat(
        &self,
        sender: ClientId,
        text: &str,
        clients: &HashMap<ClientId, Client>,
        outbox: &mut Outbox,
    ) -> Result<(), ChatError> {
        let from = clients
            .get(&sender)
            .ok_or(ChatError::UnknownSender(sender))?;
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::Empty);
        }
        if text.chars().count() > self.max_len {
            return Err(ChatError::TooLong(self.max_len));
        }

        let msg = ChatMsg {
            sender_id: sender,
            username: from.username.clone(),
            text: text.to_string(),
        };
        for client in clients.values().filter(|c| c.room == from.room) {
            outbox.send(client.id, ServerMsg::Chat(msg.clone()));
        }
        Ok(())
    }
}
