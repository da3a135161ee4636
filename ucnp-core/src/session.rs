//! Session: one connection context driving a link against a channel.
//! Single logical thread of control; each poll iteration is a complete
//! unit, so stopping the loop at any point is safe.

use std::time::{Duration, Instant};

use crate::channel::{Channel, ChannelError};
use crate::identity::PeerId;
use crate::link::{Link, LinkError, LinkEvents, LinkState};
use crate::wire::WireError;

/// Poll loop tunables. The re-announce cadence must exceed the
/// channel's staleness window or handshakes race; it is a tunable, not
/// a protocol constant.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Sleep between poll iterations.
    pub poll_interval: Duration,
    /// How often DISCOVERY/HANDSHAKE is re-published while rendezvous
    /// is in progress.
    pub reannounce_interval: Duration,
    /// Receive buffer size used inside `poll`.
    pub recv_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            reannounce_interval: Duration::from_millis(2000),
            recv_capacity: 1024,
        }
    }
}

/// Errors surfaced by session operations. Codec failures on receive are
/// not among them: malformed input counts as nothing received.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("not connected")]
    NotConnected,
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error(transparent)]
    Wire(#[from] WireError),
}

impl From<LinkError> for SessionError {
    fn from(err: LinkError) -> Self {
        match err {
            LinkError::NotConnected => SessionError::NotConnected,
            LinkError::Wire(e) => SessionError::Wire(e),
        }
    }
}

/// Connection context: identity, state machine, channel capability.
pub struct Session<C: Channel> {
    link: Link,
    channel: C,
    config: SessionConfig,
    /// When DISCOVERY/HANDSHAKE was last published. Lives on the
    /// session so the re-announce cadence accumulates across `poll`
    /// calls shorter than the interval.
    last_announce: Instant,
}

impl<C: Channel> Session<C> {
    /// Fresh session with a generated identity and default tunables.
    pub fn new(channel: C, events: Box<dyn LinkEvents>) -> Self {
        Self::with_config(channel, events, SessionConfig::default())
    }

    pub fn with_config(channel: C, events: Box<dyn LinkEvents>, config: SessionConfig) -> Self {
        Self::with_identity(PeerId::generate(), channel, events, config)
    }

    /// Fixed identity, for tools and tests that need a stable id.
    pub fn with_identity(
        id: PeerId,
        channel: C,
        events: Box<dyn LinkEvents>,
        config: SessionConfig,
    ) -> Self {
        Self {
            link: Link::new(id, events),
            channel,
            config,
            last_announce: Instant::now(),
        }
    }

    pub fn local_id(&self) -> PeerId {
        self.link.local_id()
    }

    /// The connected (or candidate) peer, once learned.
    pub fn peer_id(&self) -> Option<PeerId> {
        self.link.peer_id()
    }

    pub fn state(&self) -> LinkState {
        self.link.state()
    }

    /// Enter discovery: publish the initial DISCOVERY broadcast.
    pub fn listen(&mut self) -> Result<(), SessionError> {
        let frame = self.link.listen()?;
        self.channel.publish(self.link.local_id(), &frame)?;
        self.last_announce = Instant::now();
        Ok(())
    }

    /// Target a specific peer: publish a HANDSHAKE.
    pub fn connect(&mut self, peer: PeerId) -> Result<(), SessionError> {
        let frame = self.link.connect(peer)?;
        self.channel.publish(self.link.local_id(), &frame)?;
        self.last_announce = Instant::now();
        Ok(())
    }

    /// Publish one DATA payload to the connected peer. Returns the
    /// frame byte count; `NotConnected` (with no side effects) while
    /// the link is in any other state.
    pub fn send(&mut self, payload: &[u8]) -> Result<usize, SessionError> {
        let frame = self.link.data(payload)?;
        Ok(self.channel.publish(self.link.local_id(), &frame)?)
    }

    /// One non-blocking receive step: fetch, decode, advance the state
    /// machine, publish any reply. Returns the number of payload bytes
    /// copied into `buf` when a DATA payload arrived (truncated to the
    /// buffer, never an error), 0 otherwise. Malformed frames count as
    /// nothing received.
    pub fn recv(&mut self, buf: &mut [u8]) -> Result<usize, SessionError> {
        let Some((_, frame)) = self.channel.fetch(self.link.local_id())? else {
            return Ok(0);
        };
        let step = match self.link.handle_frame(&frame) {
            Ok(step) => step,
            Err(_) => return Ok(0),
        };
        if let Some(reply) = step.reply {
            self.channel.publish(self.link.local_id(), &reply)?;
        }
        if let Some(payload) = step.delivered {
            let n = payload.len().min(buf.len());
            buf[..n].copy_from_slice(&payload[..n]);
            return Ok(n);
        }
        Ok(0)
    }

    /// Poll for events, at most for `timeout`. Returns the payload byte
    /// count the first time DATA arrives; 0 as soon as the link is
    /// Connected even with no data; 0 once `timeout` elapses with no
    /// event. Re-publishes DISCOVERY/HANDSHAKE on the re-announce
    /// cadence while rendezvous is in progress; the cadence is measured
    /// across poll calls, so slicing a long wait into short polls still
    /// re-broadcasts. The interval sleep is the only suspension point
    /// in the system.
    pub fn poll(&mut self, timeout: Duration) -> Result<usize, SessionError> {
        let start = Instant::now();
        let mut buf = vec![0u8; self.config.recv_capacity];
        loop {
            let n = self.recv(&mut buf)?;
            if n > 0 {
                return Ok(n);
            }
            if self.link.state() == LinkState::Connected {
                return Ok(0);
            }
            let elapsed = start.elapsed();
            if elapsed >= timeout {
                return Ok(0);
            }
            std::thread::sleep(self.config.poll_interval.min(timeout - elapsed));
            if self.last_announce.elapsed() >= self.config.reannounce_interval {
                if let Some(frame) = self.link.announce()? {
                    self.channel.publish(self.link.local_id(), &frame)?;
                }
                self.last_announce = Instant::now();
            }
        }
    }

    /// Tear the session down: publish DISCONNECT when a rendezvous or
    /// connection is active, reset to Disconnected. Safe to call again.
    pub fn close(&mut self) -> Result<(), SessionError> {
        if let Some(frame) = self.link.disconnect()? {
            self.channel.publish(self.link.local_id(), &frame)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::channel::MemoryMailbox;
    use crate::link::NullEvents;

    const A: u32 = 0xAAAA_AAAA;
    const B: u32 = 0xBBBB_BBBB;

    #[derive(Debug, PartialEq, Eq)]
    enum Event {
        Connected(u32),
        Data(Vec<u8>),
        Disconnected,
    }

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<Event>>>);

    impl Recorder {
        fn events(&self) -> Vec<Event> {
            std::mem::take(&mut *self.0.lock().unwrap())
        }
    }

    impl LinkEvents for Recorder {
        fn on_connected(&mut self, peer: PeerId) {
            self.0.lock().unwrap().push(Event::Connected(peer.as_u32()));
        }
        fn on_data(&mut self, payload: &[u8]) {
            self.0.lock().unwrap().push(Event::Data(payload.to_vec()));
        }
        fn on_disconnected(&mut self) {
            self.0.lock().unwrap().push(Event::Disconnected);
        }
    }

    fn fast_config() -> SessionConfig {
        SessionConfig {
            poll_interval: Duration::from_millis(1),
            reannounce_interval: Duration::from_millis(5),
            recv_capacity: 1024,
        }
    }

    fn session(raw: u32, mailbox: &MemoryMailbox, events: Box<dyn LinkEvents>) -> Session<MemoryMailbox> {
        Session::with_identity(
            PeerId::from_raw(raw).unwrap(),
            mailbox.clone(),
            events,
            fast_config(),
        )
    }

    /// Alternate zero-timeout polls until both sides leave rendezvous.
    fn drive_to_connected(a: &mut Session<MemoryMailbox>, b: &mut Session<MemoryMailbox>) {
        for _ in 0..16 {
            a.poll(Duration::ZERO).unwrap();
            b.poll(Duration::ZERO).unwrap();
            if a.state() == LinkState::Connected && b.state() == LinkState::Connected {
                return;
            }
        }
        panic!(
            "no rendezvous within bounded polls (a={:?}, b={:?})",
            a.state(),
            b.state()
        );
    }

    #[test]
    fn send_while_disconnected_rejected() {
        let mailbox = MemoryMailbox::new();
        let mut a = session(A, &mailbox, Box::new(NullEvents));
        assert!(matches!(
            a.send(b"hello"),
            Err(SessionError::NotConnected)
        ));
        // No side effects: nothing was published.
        let mut b = session(B, &mailbox, Box::new(NullEvents));
        let mut buf = [0u8; 16];
        assert_eq!(b.recv(&mut buf).unwrap(), 0);
    }

    #[test]
    fn mutual_listen_reaches_connected() {
        let mailbox = MemoryMailbox::new();
        let mut a = session(A, &mailbox, Box::new(NullEvents));
        let mut b = session(B, &mailbox, Box::new(NullEvents));
        a.listen().unwrap();
        b.listen().unwrap();
        drive_to_connected(&mut a, &mut b);
        assert_eq!(a.peer_id().map(PeerId::as_u32), Some(B));
        assert_eq!(b.peer_id().map(PeerId::as_u32), Some(A));
    }

    #[test]
    fn poll_returns_zero_on_timeout() {
        let mailbox = MemoryMailbox::new();
        let mut a = session(A, &mailbox, Box::new(NullEvents));
        a.listen().unwrap();
        let n = a.poll(Duration::from_millis(10)).unwrap();
        assert_eq!(n, 0);
        assert_eq!(a.state(), LinkState::Detecting);
    }

    #[test]
    fn poll_reannounces_while_detecting() {
        let mailbox = MemoryMailbox::new();
        let mut a = session(A, &mailbox, Box::new(NullEvents));
        a.listen().unwrap();
        // Consume the initial discovery so only a re-announce can refill
        // the slot.
        let mut drain = session(B, &mailbox, Box::new(NullEvents));
        let mut buf = [0u8; 64];
        assert_eq!(drain.recv(&mut buf).unwrap(), 0);
        a.poll(Duration::from_millis(30)).unwrap();
        let fetched = mailbox
            .clone()
            .fetch(PeerId::from_raw(B).unwrap())
            .unwrap();
        assert!(fetched.is_some(), "discovery should have been re-published");
    }

    #[test]
    fn reannounce_spans_sliced_polls() {
        let mailbox = MemoryMailbox::new();
        let mut a = session(A, &mailbox, Box::new(NullEvents));
        a.listen().unwrap();
        // Consume the initial discovery so only a re-announce can
        // refill the slot.
        let mut drain = session(B, &mailbox, Box::new(NullEvents));
        let mut buf = [0u8; 64];
        assert_eq!(drain.recv(&mut buf).unwrap(), 0);
        // Each call is shorter than the re-announce interval (5ms in
        // fast_config); the cadence must accumulate across calls.
        for _ in 0..20 {
            a.poll(Duration::from_millis(2)).unwrap();
        }
        let fetched = mailbox
            .clone()
            .fetch(PeerId::from_raw(B).unwrap())
            .unwrap();
        assert!(
            fetched.is_some(),
            "discovery should be re-published across sliced polls"
        );
    }

    #[test]
    fn end_to_end_hello() {
        let mailbox = MemoryMailbox::new();
        let rec_b = Recorder::default();
        let mut a = session(A, &mailbox, Box::new(NullEvents));
        let mut b = session(B, &mailbox, Box::new(rec_b.clone()));
        a.listen().unwrap();
        b.listen().unwrap();
        drive_to_connected(&mut a, &mut b);
        assert_eq!(rec_b.events(), vec![Event::Connected(A)]);

        a.send(b"hello").unwrap();
        let n = b.poll(Duration::from_millis(100)).unwrap();
        assert_eq!(n, 5);
        assert_eq!(rec_b.events(), vec![Event::Data(b"hello".to_vec())]);
    }

    #[test]
    fn recv_truncates_to_buffer() {
        let mailbox = MemoryMailbox::new();
        let mut a = session(A, &mailbox, Box::new(NullEvents));
        let mut b = session(B, &mailbox, Box::new(NullEvents));
        a.listen().unwrap();
        b.listen().unwrap();
        drive_to_connected(&mut a, &mut b);

        a.send(b"a longer payload").unwrap();
        let mut small = [0u8; 4];
        let n = b.recv(&mut small).unwrap();
        assert_eq!(n, 4);
        assert_eq!(&small, b"a lo");
    }

    #[test]
    fn seq_visible_on_wire_increments_per_send() {
        let mailbox = MemoryMailbox::new();
        let mut a = session(A, &mailbox, Box::new(NullEvents));
        let mut b = session(B, &mailbox, Box::new(NullEvents));
        a.listen().unwrap();
        b.listen().unwrap();
        drive_to_connected(&mut a, &mut b);

        let local_b = PeerId::from_raw(B).unwrap();
        a.send(b"one").unwrap();
        let (_, f1) = mailbox.clone().fetch(local_b).unwrap().unwrap();
        a.send(b"two").unwrap();
        let (_, f2) = mailbox.clone().fetch(local_b).unwrap().unwrap();
        let (h1, _) = crate::wire::decode_frame(&f1).unwrap();
        let (h2, _) = crate::wire::decode_frame(&f2).unwrap();
        assert_eq!(h2.seq, h1.seq + 1);
    }

    #[test]
    fn close_publishes_disconnect_and_peer_observes() {
        let mailbox = MemoryMailbox::new();
        let rec_b = Recorder::default();
        let mut a = session(A, &mailbox, Box::new(NullEvents));
        let mut b = session(B, &mailbox, Box::new(rec_b.clone()));
        a.listen().unwrap();
        b.listen().unwrap();
        drive_to_connected(&mut a, &mut b);
        rec_b.events();

        a.close().unwrap();
        assert_eq!(a.state(), LinkState::Disconnected);
        let mut buf = [0u8; 16];
        b.recv(&mut buf).unwrap();
        assert_eq!(b.state(), LinkState::Disconnected);
        assert!(b.peer_id().is_none());
        assert_eq!(rec_b.events(), vec![Event::Disconnected]);

        // Closing again is a no-op.
        a.close().unwrap();
        assert_eq!(a.state(), LinkState::Disconnected);
    }

    #[test]
    fn corrupt_frame_treated_as_nothing_received() {
        let mailbox = MemoryMailbox::new();
        let mut a = session(A, &mailbox, Box::new(NullEvents));
        a.listen().unwrap();
        mailbox
            .clone()
            .publish(PeerId::from_raw(B).unwrap(), b"garbage")
            .unwrap();
        let mut buf = [0u8; 16];
        assert_eq!(a.recv(&mut buf).unwrap(), 0);
        assert_eq!(a.state(), LinkState::Detecting);
    }

    #[test]
    fn no_reconnect_after_disconnect_without_listen() {
        let mailbox = MemoryMailbox::new();
        let mut a = session(A, &mailbox, Box::new(NullEvents));
        let mut b = session(B, &mailbox, Box::new(NullEvents));
        a.listen().unwrap();
        b.listen().unwrap();
        drive_to_connected(&mut a, &mut b);

        a.close().unwrap();
        let mut buf = [0u8; 16];
        b.recv(&mut buf).unwrap();
        // B publishes nothing on its own after disconnect; A stays down
        // until the caller re-invokes listen or connect.
        assert_eq!(a.poll(Duration::from_millis(10)).unwrap(), 0);
        assert_eq!(a.state(), LinkState::Disconnected);
    }
}
