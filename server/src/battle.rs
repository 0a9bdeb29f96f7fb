//! Pairwise battle-challenge negotiation.
//!
//! A request is created `Pending` and ends `Accepted`, `Declined` or
//! `Expired`. Only one pending request may exist per unordered pair of
//! clients. Resolutions are returned from `update` for the world to act on.

use crate::client::ClientId;
use crate::outbox::Outbox;
use roomworld_shared::protocol::{
    BattleRequestReceivedMsg, BattleRequestResultMsg, BattleStatus, ServerMsg,
};
use std::collections::{BTreeMap, HashSet};

pub type RequestId = u32;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BattleError {
    #[error("client {0} is not connected to this world")]
    InvalidParticipant(ClientId),
    #[error("cannot challenge yourself")]
    SelfChallenge,
    #[error("a battle request between these players is already pending (request {0})")]
    AlreadyPending(RequestId),
    #[error("client {0} is already in a minigame")]
    Busy(ClientId),
    #[error("battle request {0} does not exist")]
    UnknownRequest(RequestId),
    #[error("only the receiver may answer battle request {0}")]
    NotReceiver(RequestId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BattleRequest {
    pub id: RequestId,
    pub sender: ClientId,
    pub receiver: ClientId,
    pub gamemode: String,
    pub status: BattleStatus,
    /// Seconds since creation
    pub age: f64,
}

impl BattleRequest {
    fn involves(&self, id: ClientId) -> bool {
        self.sender == id || self.receiver == id
    }

    fn is_between(&self, a: ClientId, b: ClientId) -> bool {
        (self.sender == a && self.receiver == b) || (self.sender == b && self.receiver == a)
    }
}

/// Outcome of a finished request.
#[derive(Debug, Clone, PartialEq)]
pub struct BattleResolution {
    pub request_id: RequestId,
    /// Sender first, receiver second
    pub participants: [ClientId; 2],
    pub gamemode: String,
    pub status: BattleStatus,
}

#[derive(Debug)]
pub struct BattleRequestHandler {
    requests: BTreeMap<RequestId, BattleRequest>,
    /// Accept/decline answers received since the last tick
    answers: Vec<(RequestId, bool)>,
    timeout_secs: f64,
    next_request_id: RequestId,
}

impl BattleRequestHandler {
    pub fn new(timeout_secs: f64) -> Self {
        Self {
            requests: BTreeMap::new(),
            answers: Vec::new(),
            timeout_secs,
            next_request_id: 1,
        }
    }

    /// Open a pending request and notify the receiver.
    pub fn new_battle_request(
        &mut self,
        sender: ClientId,
        sender_name: &str,
        receiver: ClientId,
        gamemode: &str,
        is_connected: impl Fn(ClientId) -> bool,
        outbox: &mut Outbox,
    ) -> Result<RequestId, BattleError> {
        if !is_connected(sender) {
            return Err(BattleError::InvalidParticipant(sender));
        }
        if !is_connected(receiver) {
            return Err(BattleError::InvalidParticipant(receiver));
        }
        if sender == receiver {
            return Err(BattleError::SelfChallenge);
        }
        if let Some(existing) = self.pending_between(sender, receiver) {
            return Err(BattleError::AlreadyPending(existing));
        }

        let id = self.next_request_id;
        self.next_request_id += 1;
        self.requests.insert(
            id,
            BattleRequest {
                id,
                sender,
                receiver,
                gamemode: gamemode.to_string(),
                status: BattleStatus::Pending,
                age: 0.0,
            },
        );

        outbox.send(
            receiver,
            ServerMsg::BattleRequestReceived(BattleRequestReceivedMsg {
                request_id: id,
                sender_id: sender,
                sender_name: sender_name.to_string(),
                gamemode: gamemode.to_string(),
            }),
        );
        tracing::info!(
            "Battle request {} from {} to {} ({})",
            id,
            sender,
            receiver,
            gamemode
        );
        Ok(id)
    }

    /// Record the receiver's answer. It takes effect on the next `update`.
    pub fn respond(
        &mut self,
        request_id: RequestId,
        responder: ClientId,
        accept: bool,
    ) -> Result<(), BattleError> {
        let request = self
            .requests
            .get(&request_id)
            .filter(|r| r.status == BattleStatus::Pending)
            .ok_or(BattleError::UnknownRequest(request_id))?;
        if request.receiver != responder {
            return Err(BattleError::NotReceiver(request_id));
        }
        self.answers.push((request_id, accept));
        Ok(())
    }

    /// Apply answers, expire old requests, notify both parties of every
    /// resolution and drop the finished requests.
    ///
    /// An acceptance only sticks when neither participant is `is_busy` and
    /// neither was claimed by an earlier acceptance in the same call;
    /// otherwise the request resolves `Declined`.
    pub fn update(
        &mut self,
        dt: f64,
        is_busy: impl Fn(ClientId) -> bool,
        outbox: &mut Outbox,
    ) -> Vec<BattleResolution> {
        let mut claimed: HashSet<ClientId> = HashSet::new();
        for (id, accept) in self.answers.drain(..) {
            let Some(request) = self.requests.get_mut(&id) else {
                continue;
            };
            if request.status != BattleStatus::Pending {
                continue;
            }
            let pair = [request.sender, request.receiver];
            let free = pair.iter().all(|c| !is_busy(*c) && !claimed.contains(c));
            request.status = if accept && free {
                claimed.extend(pair);
                BattleStatus::Accepted
            } else {
                if accept {
                    tracing::debug!("Battle request {} accepted by a busy player", id);
                }
                BattleStatus::Declined
            };
        }

        for request in self.requests.values_mut() {
            if request.status != BattleStatus::Pending {
                continue;
            }
            request.age += dt;
            if request.age >= self.timeout_secs {
                request.status = BattleStatus::Expired;
            }
        }

        let finished: Vec<RequestId> = self
            .requests
            .values()
            .filter(|r| r.status.is_terminal())
            .map(|r| r.id)
            .collect();

        let mut resolutions = Vec::with_capacity(finished.len());
        for id in finished {
            let Some(request) = self.requests.remove(&id) else {
                continue;
            };
            notify_result(&request, outbox);
            tracing::info!("Battle request {} {:?}", id, request.status);
            resolutions.push(BattleResolution {
                request_id: id,
                participants: [request.sender, request.receiver],
                gamemode: request.gamemode,
                status: request.status,
            });
        }
        resolutions
    }

    /// Cancel every pending request involving `id`; the other side sees it expire.
    pub fn participant_disconnected(&mut self, id: ClientId, outbox: &mut Outbox) {
        let cancelled: Vec<RequestId> = self
            .requests
            .values()
            .filter(|r| r.involves(id))
            .map(|r| r.id)
            .collect();

        for request_id in cancelled {
            if let Some(mut request) = self.requests.remove(&request_id) {
                request.status = BattleStatus::Expired;
                let other = if request.sender == id {
                    request.receiver
                } else {
                    request.sender
                };
                outbox.send(
                    other,
                    ServerMsg::BattleRequestResult(BattleRequestResultMsg {
                        request_id,
                        status: request.status,
                    }),
                );
            }
        }
    }

    pub fn pending_between(&self, a: ClientId, b: ClientId) -> Option<RequestId> {
        self.requests
            .values()
            .find(|r| r.status == BattleStatus::Pending && r.is_between(a, b))
            .map(|r| r.id)
    }

    pub fn get(&self, id: RequestId) -> Option<&BattleRequest> {
        self.requests.get(&id)
    }

    pub fn pending_count(&self) -> usize {
        self.requests
            .values()
            .filter(|r| r.status == BattleStatus::Pending)
            .count()
    }
}

fn notify_result(request: &BattleRequest, outbox: &mut Outbox) {
    let msg = BattleRequestResultMsg {
        request_id: request.id,
        status: request.status,
    };
    outbox.send(request.sender, ServerMsg::BattleRequestResult(msg.clone()));
    outbox.send(request.receiver, ServerMsg::BattleRequestResult(msg));
}
