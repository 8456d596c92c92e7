//! Negotiation driver
//!
//! This module contains the glue between the state machine and the wire:
//! - The transport seam (`FrameTransport`)
//! - Events fed into the state machine and the actions it returns
//! - The receive loop with its retransmission deadline

use crate::{
    config::ClientConfig,
    error::{HarbingerError, TransportError},
    network::RawSocket,
    v4::{handler::NegotiationSession, options::MessageType, NegotiationHandler},
};
use bytes::Bytes;
use std::time::Duration;
use tokio::time::{self, Instant};

/// Largest frame the receive loop reads.
pub const MAX_FRAME_LEN: usize = 1514;

/// A frame the state machine wants transmitted.
#[derive(Debug, Clone)]
pub struct OutboundFrame {
    pub xid: u32,
    pub kind: MessageType,
    pub frame: Bytes,
}

/// Actions returned by the state machine, executed by the driver
#[derive(Debug)]
pub enum Action {
    Send(Vec<OutboundFrame>),
    /// Keep listening until the current retransmission deadline.
    Wait,
    Exit,
}

/// External events the state machine responds to
#[derive(Debug)]
pub enum Event<'a> {
    Start,
    FrameReceived(&'a [u8]),
    Timeout,
    SendFailed { xid: u32, kind: MessageType },
}

/// Common trait for the negotiation state machine
pub trait DhcpStateMachine {
    /// Handle one event and return the next action to execute
    fn handle_event(&mut self, event: Event) -> Result<Action, HarbingerError>;
    /// Current state name, for logging
    fn state_name(&self) -> &'static str;
    /// True once no session can make further progress
    fn is_finished(&self) -> bool;
    /// Snapshot of every session, in creation order
    fn sessions(&self) -> Vec<NegotiationSession>;
}

/// Send/receive primitives supplied by the host.
///
/// `receive` blocks until a whole frame is available and returns its length.
#[allow(async_fn_in_trait)]
pub trait FrameTransport {
    async fn send(&mut self, frame: &[u8]) -> Result<(), TransportError>;
    async fn receive(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;
}

pub struct Negotiator<T, S = NegotiationHandler> {
    transport: T,
    state_machine: S,
    offer_timeout: Duration,
}

impl Negotiator<RawSocket> {
    /// Opens the raw socket on the configured interface. Failing here is
    /// fatal: nothing has been sent yet.
    pub fn new(config: &ClientConfig) -> Result<Self, HarbingerError> {
        let transport = RawSocket::bind(&config.interface)?;
        let state_machine =
            NegotiationHandler::new(config.count, config.max_attempts, config.frame_builder());
        Ok(Self::with_parts(transport, state_machine, config.offer_timeout))
    }
}

impl<T: FrameTransport, S: DhcpStateMachine> Negotiator<T, S> {
    pub fn with_parts(transport: T, state_machine: S, offer_timeout: Duration) -> Self {
        Self {
            transport,
            state_machine,
            offer_timeout,
        }
    }

    pub fn state_machine(&self) -> &S {
        &self.state_machine
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Sends every frame, reporting failures back to the state machine.
    async fn send_all(&mut self, frames: Vec<OutboundFrame>) -> Result<(), HarbingerError> {
        for out in frames {
            match self.transport.send(&out.frame).await {
                Ok(()) => {
                    tracing::debug!(
                        "Sent {:?} xid={:#010x} ({} bytes)",
                        out.kind,
                        out.xid,
                        out.frame.len()
                    );
                }
                Err(e) => {
                    tracing::error!("Failed to send {:?} xid={:#010x}: {}", out.kind, out.xid, e);
                    self.state_machine.handle_event(Event::SendFailed {
                        xid: out.xid,
                        kind: out.kind,
                    })?;
                }
            }
        }
        Ok(())
    }

    /// Waits for a frame until `deadline`, then hands the result to the state machine.
    async fn wait_for_frame(&mut self, deadline: Instant) -> Result<Action, HarbingerError> {
        let mut buf = [0u8; MAX_FRAME_LEN];
        match time::timeout_at(deadline, self.transport.receive(&mut buf)).await {
            Ok(Ok(len)) => {
                tracing::trace!("Received {} byte frame", len);
                self.state_machine
                    .handle_event(Event::FrameReceived(&buf[..len]))
            }
            Ok(Err(e)) => {
                tracing::error!("Transport receive error: {}", e);
                Err(HarbingerError::Transport(e))
            }
            Err(_) => {
                tracing::debug!("Retransmission deadline reached");
                self.state_machine.handle_event(Event::Timeout)
            }
        }
    }

    /// Runs the exchange until every session has sent its Request, timed
    /// out, or failed, and returns the final session table.
    pub async fn run(&mut self) -> Result<Vec<NegotiationSession>, HarbingerError> {
        let mut next_action = self.state_machine.handle_event(Event::Start)?;
        let mut deadline = Instant::now() + self.offer_timeout;

        loop {
            tracing::debug!(
                "State: {}, Action: {:?}",
                self.state_machine.state_name(),
                next_action
            );

            match next_action {
                Action::Send(frames) => {
                    // Only a (re)transmitted Discover restarts the Offer timer.
                    let rearm = frames.iter().any(|f| f.kind == MessageType::Discover);
                    self.send_all(frames).await?;
                    if rearm {
                        deadline = Instant::now() + self.offer_timeout;
                    }
                    next_action = if self.state_machine.is_finished() {
                        Action::Exit
                    } else {
                        Action::Wait
                    };
                }
                Action::Wait => {
                    next_action = self.wait_for_frame(deadline).await?;
                }
                Action::Exit => {
                    return Ok(self.state_machine.sessions());
                }
            }
        }
    }
}

/// Binds the configured interface and negotiates `config.count` sessions.
pub async fn run_negotiation(
    config: &ClientConfig,
) -> Result<Vec<NegotiationSession>, HarbingerError> {
    let mut negotiator = Negotiator::new(config)?;
    negotiator.run().await
}
