//! Connection state machine: consumes decoded envelopes, advances the
//! lifecycle, emits reply frames, fires observer hooks. No I/O here;
//! the session layer publishes whatever this returns.

use crate::identity::{PeerId, BROADCAST_ID};
use crate::wire::{self, MsgType, WireError};

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Detecting,
    Handshaking,
    Connected,
    /// Reserved terminal state; no transition currently enters it.
    Error,
}

/// Lifecycle observer, one per link, injected at construction. Hooks
/// run synchronously from within message handling.
pub trait LinkEvents {
    fn on_connected(&mut self, _peer: PeerId) {}
    fn on_data(&mut self, _payload: &[u8]) {}
    fn on_disconnected(&mut self) {}
}

/// Observer that ignores everything.
pub struct NullEvents;

impl LinkEvents for NullEvents {}

/// Protocol-state violation or codec failure.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("not connected")]
    NotConnected,
    #[error(transparent)]
    Wire(#[from] WireError),
}

/// Outcome of feeding one received frame through the link.
#[derive(Default)]
pub struct Step {
    /// Frame to publish in response, if any.
    pub reply: Option<Vec<u8>>,
    /// DATA payload to hand to the caller, if any.
    pub delivered: Option<Vec<u8>>,
}

/// The state machine for one point-to-point connection.
pub struct Link {
    local_id: PeerId,
    peer_id: Option<PeerId>,
    seq_tx: u32,
    /// Last sequence number seen from the wire. Tracked for future
    /// reorder/dedup logic; nothing consumes it yet.
    seq_rx: u32,
    state: LinkState,
    events: Box<dyn LinkEvents>,
}

impl Link {
    pub fn new(local_id: PeerId, events: Box<dyn LinkEvents>) -> Self {
        Self {
            local_id,
            peer_id: None,
            seq_tx: 0,
            seq_rx: 0,
            state: LinkState::Disconnected,
            events,
        }
    }

    pub fn local_id(&self) -> PeerId {
        self.local_id
    }

    pub fn peer_id(&self) -> Option<PeerId> {
        self.peer_id
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn last_seq_seen(&self) -> u32 {
        self.seq_rx
    }

    /// Enter discovery: clear any stale peer, return the DISCOVERY
    /// broadcast frame to publish.
    pub fn listen(&mut self) -> Result<Vec<u8>, WireError> {
        self.peer_id = None;
        self.state = LinkState::Detecting;
        self.discovery_frame()
    }

    /// Target a specific peer: return the HANDSHAKE frame to publish.
    /// Also invoked internally when a DISCOVERY_ACK arrives.
    pub fn connect(&mut self, peer: PeerId) -> Result<Vec<u8>, WireError> {
        self.peer_id = Some(peer);
        self.state = LinkState::Handshaking;
        let payload = format!(
            "HANDSHAKE:{:08x}->{:08x}",
            self.local_id.as_u32(),
            peer.as_u32()
        );
        self.frame(MsgType::Handshake, payload.as_bytes())
    }

    /// Build a DATA frame. Fails while not connected; no side effects.
    pub fn data(&mut self, payload: &[u8]) -> Result<Vec<u8>, LinkError> {
        if self.state != LinkState::Connected {
            return Err(LinkError::NotConnected);
        }
        Ok(self.frame(MsgType::Data, payload)?)
    }

    /// Frame to re-broadcast while rendezvous is in progress: DISCOVERY
    /// while detecting, HANDSHAKE while handshaking, nothing otherwise.
    /// The single-slot channel loses overwritten frames, so the session
    /// re-publishes these on a cadence.
    pub fn announce(&mut self) -> Result<Option<Vec<u8>>, WireError> {
        match self.state {
            LinkState::Detecting => Ok(Some(self.discovery_frame()?)),
            LinkState::Handshaking => match self.peer_id {
                Some(peer) => Ok(Some(self.connect(peer)?)),
                None => Ok(None),
            },
            _ => Ok(None),
        }
    }

    /// Locally initiated teardown. Returns the DISCONNECT frame to
    /// publish, or `None` when already disconnected. The local observer
    /// is not fired; hooks report remote events only.
    pub fn disconnect(&mut self) -> Result<Option<Vec<u8>>, WireError> {
        if self.state == LinkState::Disconnected {
            return Ok(None);
        }
        let frame = self.frame(MsgType::Disconnect, &[])?;
        self.peer_id = None;
        self.state = LinkState::Disconnected;
        Ok(Some(frame))
    }

    /// Feed one raw frame from the channel through the state machine.
    /// Codec failures are returned to the caller, which treats them as
    /// "nothing received"; they never change state.
    pub fn handle_frame(&mut self, bytes: &[u8]) -> Result<Step, WireError> {
        let (header, payload) = wire::decode_frame(bytes)?;
        let mut step = Step::default();
        let Some(sender) = PeerId::from_raw(header.src_id) else {
            return Ok(step);
        };
        if sender == self.local_id {
            // Our own broadcast reflected back.
            return Ok(step);
        }
        self.seq_rx = header.seq;

        match header.msg_type {
            MsgType::Discovery => {
                if self.state == LinkState::Detecting {
                    // Record the sender as candidate peer and answer.
                    self.peer_id = Some(sender);
                    let ack = format!("ACK:{:08x}", self.local_id.as_u32());
                    step.reply = Some(self.frame(MsgType::DiscoveryAck, ack.as_bytes())?);
                }
            }
            MsgType::DiscoveryAck => {
                if self.state == LinkState::Detecting {
                    step.reply = Some(self.connect(sender)?);
                }
            }
            MsgType::Handshake => {
                if matches!(self.state, LinkState::Detecting | LinkState::Handshaking) {
                    self.peer_id = Some(sender);
                    let ack = format!("HSHAKE_ACK:{:08x}", self.local_id.as_u32());
                    step.reply = Some(self.frame(MsgType::HandshakeAck, ack.as_bytes())?);
                    self.state = LinkState::Connected;
                    self.events.on_connected(sender);
                }
            }
            MsgType::HandshakeAck => {
                if self.state == LinkState::Handshaking {
                    self.state = LinkState::Connected;
                    if let Some(peer) = self.peer_id {
                        self.events.on_connected(peer);
                    }
                }
            }
            MsgType::Data => {
                // Post-connection traffic is point-to-point: only frames
                // addressed to us (or broadcast) from the connected peer.
                if self.state == LinkState::Connected
                    && self.accepts_destination(header.dst_id)
                    && self.peer_id == Some(sender)
                    && !payload.is_empty()
                {
                    self.events.on_data(payload);
                    step.delivered = Some(payload.to_vec());
                }
            }
            MsgType::DataAck | MsgType::Keepalive => {
                // Defined on the wire; nothing reacts to them yet.
            }
            MsgType::Disconnect => {
                if self.state != LinkState::Disconnected && self.accepts_destination(header.dst_id)
                {
                    self.peer_id = None;
                    self.state = LinkState::Disconnected;
                    self.events.on_disconnected();
                }
            }
        }
        Ok(step)
    }

    fn accepts_destination(&self, dst_id: u32) -> bool {
        dst_id == BROADCAST_ID || dst_id == self.local_id.as_u32()
    }

    fn discovery_frame(&mut self) -> Result<Vec<u8>, WireError> {
        let payload = format!("DISCOVER:{:08x}", self.local_id.as_u32());
        self.frame(MsgType::Discovery, payload.as_bytes())
    }

    /// Build a frame from context: src is our id, dst is the current
    /// peer (broadcast when none), seq post-increments.
    fn frame(&mut self, msg_type: MsgType, payload: &[u8]) -> Result<Vec<u8>, WireError> {
        let dst = self.peer_id.map(PeerId::as_u32).unwrap_or(BROADCAST_ID);
        let out = wire::encode_frame(
            msg_type,
            self.local_id.as_u32(),
            dst,
            self.seq_tx,
            payload,
        )?;
        self.seq_tx = self.seq_tx.wrapping_add(1);
        Ok(out)
    }
}
