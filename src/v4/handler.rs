//! Discover/Offer/Request negotiation state machine.
//!
//! The handler owns a table of sessions keyed by transaction id. It never
//! touches a socket: every event comes in through [`DhcpStateMachine`] and
//! every frame to transmit goes out in an [`Action`].

use super::{
    frame::MacAddress,
    message::FrameBuilder,
    offer::{parse_offer, OfferFields},
    options::MessageType,
};
use crate::{
    client::{Action, DhcpStateMachine, Event, OutboundFrame},
    error::HarbingerError,
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::{collections::HashMap, net::Ipv4Addr};

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum NegotiationState {
    Idle,
    DiscoversSent,
    Done,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum SessionState {
    AwaitingOffer,
    RequestSent,
    TimedOut,
    SendFailed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, SessionState::AwaitingOffer)
    }
}

/// One Discover→Offer→Request attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiationSession {
    pub xid: u32,
    pub client_mac: MacAddress,
    pub state: SessionState,
    /// Discovers transmitted so far, retransmissions included.
    pub attempts: u32,
    pub offered_address: Option<Ipv4Addr>,
    pub server_identifier: Option<Ipv4Addr>,
}

pub struct NegotiationHandler<R = StdRng> {
    state: NegotiationState,
    count: usize,
    max_attempts: u32,
    builder: FrameBuilder,
    rng: R,
    sessions: HashMap<u32, NegotiationSession>,
    // xids in creation order, for reporting.
    order: Vec<u32>,
}

impl NegotiationHandler<StdRng> {
    pub fn new(count: usize, max_attempts: u32, builder: FrameBuilder) -> Self {
        Self::with_rng(count, max_attempts, builder, StdRng::from_os_rng())
    }
}

impl<R: Rng> NegotiationHandler<R> {
    pub fn with_rng(count: usize, max_attempts: u32, builder: FrameBuilder, rng: R) -> Self {
        Self {
            state: NegotiationState::Idle,
            count,
            max_attempts: max_attempts.max(1),
            builder,
            rng,
            sessions: HashMap::new(),
            order: Vec::new(),
        }
    }

    pub fn session(&self, xid: u32) -> Option<&NegotiationSession> {
        self.sessions.get(&xid)
    }

    fn handle_start(&mut self) -> Result<Action, HarbingerError> {
        let mut frames = Vec::with_capacity(self.count);
        for _ in 0..self.count {
            let mut xid: u32 = self.rng.random();
            while self.sessions.contains_key(&xid) {
                xid = self.rng.random();
            }
            let client_mac = MacAddress::random(&mut self.rng);

            tracing::debug!("Opening session xid={:#010x} mac={}", xid, client_mac);
            self.sessions.insert(
                xid,
                NegotiationSession {
                    xid,
                    client_mac,
                    state: SessionState::AwaitingOffer,
                    attempts: 1,
                    offered_address: None,
                    server_identifier: None,
                },
            );
            self.order.push(xid);
            frames.push(OutboundFrame {
                xid,
                kind: MessageType::Discover,
                frame: self.builder.discover(xid, client_mac),
            });
        }

        self.state = NegotiationState::DiscoversSent;
        tracing::info!("Transitioning to DiscoversSent with {} session(s)", self.count);
        self.update_done();
        Ok(Action::Send(frames))
    }

    fn handle_frame(&mut self, data: &[u8]) -> Result<Action, HarbingerError> {
        let Some(offer) = parse_offer(data) else {
            return Ok(Action::Wait);
        };

        let Some(session) = self.sessions.get_mut(&offer.xid) else {
            tracing::debug!("Offer xid={:#010x} matches no session, ignoring", offer.xid);
            return Ok(Action::Wait);
        };

        if session.state != SessionState::AwaitingOffer {
            tracing::debug!(
                "Session xid={:#010x} already {:?}, ignoring further Offer",
                offer.xid,
                session.state
            );
            return Ok(Action::Wait);
        }

        log_offer(&offer);
        session.offered_address = Some(offer.offered_address);
        session.server_identifier = Some(offer.server_identifier);
        session.state = SessionState::RequestSent;

        let frame = self.builder.request(
            session.xid,
            session.client_mac,
            offer.offered_address,
            offer.server_identifier,
        );
        let outbound = OutboundFrame {
            xid: session.xid,
            kind: MessageType::Request,
            frame,
        };
        tracing::info!("Session xid={:#010x} transitioning to RequestSent", offer.xid);

        self.update_done();
        Ok(Action::Send(vec![outbound]))
    }

    fn handle_timeout(&mut self) -> Result<Action, HarbingerError> {
        let mut frames = Vec::new();
        for xid in &self.order {
            let Some(session) = self.sessions.get_mut(xid) else {
                continue;
            };
            if session.state != SessionState::AwaitingOffer {
                continue;
            }
            if session.attempts >= self.max_attempts {
                tracing::warn!(
                    "Session xid={:#010x} got no Offer after {} Discover(s), giving up",
                    session.xid,
                    session.attempts
                );
                session.state = SessionState::TimedOut;
                continue;
            }

            session.attempts += 1;
            tracing::warn!(
                "Timeout waiting for Offer, retransmitting Discover xid={:#010x} (attempt {}/{})",
                session.xid,
                session.attempts,
                self.max_attempts
            );
            frames.push(OutboundFrame {
                xid: session.xid,
                kind: MessageType::Discover,
                frame: self.builder.discover(session.xid, session.client_mac),
            });
        }

        self.update_done();
        if frames.is_empty() {
            Ok(Action::Exit)
        } else {
            Ok(Action::Send(frames))
        }
    }

    fn handle_send_failed(
        &mut self,
        xid: u32,
        kind: MessageType,
    ) -> Result<Action, HarbingerError> {
        let Some(session) = self.sessions.get_mut(&xid) else {
            return Err(HarbingerError::Critical(format!(
                "send failure reported for unknown session {xid:#010x}"
            )));
        };
        // A lost Discover is covered by retransmission; a lost Request ends the session.
        if kind == MessageType::Request {
            session.state = SessionState::SendFailed;
        }
        self.update_done();
        Ok(Action::Wait)
    }

    fn update_done(&mut self) {
        if self.sessions.values().all(|s| s.state.is_terminal()) {
            if self.state != NegotiationState::Done {
                tracing::info!("All sessions finished, transitioning to Done");
            }
            self.state = NegotiationState::Done;
        }
    }
}

fn log_offer(offer: &OfferFields) {
    tracing::info!(
        "Received DHCP OFFER xid={:#010x}: {} from server {}",
        offer.xid,
        offer.offered_address,
        offer.server_identifier
    );
    tracing::debug!(
        "Offer parameters: mask={:?} routers={:?} dns={:?} lease={:?}",
        offer.subnet_mask,
        offer.routers,
        offer.dns_servers,
        offer.lease_duration
    );
}

impl<R: Rng> DhcpStateMachine for NegotiationHandler<R> {
    fn state_name(&self) -> &'static str {
        match self.state {
            NegotiationState::Idle => "Idle",
            NegotiationState::DiscoversSent => "DiscoversSent",
            NegotiationState::Done => "Done",
        }
    }

    fn is_finished(&self) -> bool {
        self.state == NegotiationState::Done
    }

    fn sessions(&self) -> Vec<NegotiationSession> {
        self.order
            .iter()
            .filter_map(|xid| self.sessions.get(xid))
            .cloned()
            .collect()
    }

    fn handle_event(&mut self, event: Event) -> Result<Action, HarbingerError> {
        tracing::trace!("Handling event {:?} in state {:?}", event, self.state);
        match (self.state, event) {
            (NegotiationState::Idle, Event::Start) => self.handle_start(),
            (NegotiationState::Idle, _) => Err(HarbingerError::Critical(
                "negotiation has not been started".to_string(),
            )),
            (_, Event::Start) => Err(HarbingerError::Critical(
                "negotiation already started".to_string(),
            )),
            (_, Event::SendFailed { xid, kind }) => self.handle_send_failed(xid, kind),
            (NegotiationState::Done, _) => Ok(Action::Exit),
            (NegotiationState::DiscoversSent, Event::FrameReceived(data)) => self.handle_frame(data),
            (NegotiationState::DiscoversSent, Event::Timeout) => self.handle_timeout(),
        }
    }
}
