//! Channel capability: the publish/fetch rendezvous a session is handed.
//! The protocol layer never learns what sits behind it (hardware
//! signaling channel or software rendezvous).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::identity::PeerId;

/// Transport failure while publishing or fetching. Propagated to the
/// caller of `send`/`poll`; never changes connection state.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("channel i/o: {0}")]
    Io(#[from] std::io::Error),
}

/// Single-slot-per-sender, last-write-wins rendezvous.
///
/// `publish` stores the frame as the sender's one outstanding message,
/// overwriting any prior unconsumed one. `fetch` scans all entries,
/// excludes the caller's own, and consumes the most recently published
/// one. A frame overwritten before being fetched is silently lost;
/// delivery is at most once per publish. No ordering is guaranteed
/// across senders.
pub trait Channel {
    fn publish(&mut self, from: PeerId, frame: &[u8]) -> Result<usize, ChannelError>;
    fn fetch(&mut self, local: PeerId) -> Result<Option<(PeerId, Vec<u8>)>, ChannelError>;
}

#[derive(Default)]
struct Slots {
    next_ticket: u64,
    entries: HashMap<u32, (u64, Vec<u8>)>,
}

/// In-process reference mailbox: a shared map of sender id to frame,
/// publish order tracked by a monotonic ticket. Clone the handle to
/// share one rendezvous between sessions.
#[derive(Clone, Default)]
pub struct MemoryMailbox {
    slots: Arc<Mutex<Slots>>,
}

impl MemoryMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Channel for MemoryMailbox {
    fn publish(&mut self, from: PeerId, frame: &[u8]) -> Result<usize, ChannelError> {
        let mut slots = self.lock();
        let ticket = slots.next_ticket;
        slots.next_ticket += 1;
        slots.entries.insert(from.as_u32(), (ticket, frame.to_vec()));
        Ok(frame.len())
    }

    fn fetch(&mut self, local: PeerId) -> Result<Option<(PeerId, Vec<u8>)>, ChannelError> {
        let mut slots = self.lock();
        let newest = slots
            .entries
            .iter()
            .filter(|(&id, _)| id != local.as_u32())
            .max_by_key(|(_, &(ticket, _))| ticket)
            .map(|(&id, _)| id);
        if let Some(id) = newest {
            if let Some((_, frame)) = slots.entries.remove(&id) {
                if let Some(sender) = PeerId::from_raw(id) {
                    return Ok(Some((sender, frame)));
                }
            }
        }
        Ok(None)
    }
}
