//! Peer identity: process-lifetime random 32-bit identifier.

use std::fmt;

use rand::rngs::OsRng;
use rand::RngCore;

/// Reserved "no identity" value; also the broadcast destination on the wire.
pub const BROADCAST_ID: u32 = 0;

/// Peer identifier: non-zero 32-bit value. Generated identities have the
/// high bit forced set so they can never collide with [`BROADCAST_ID`].
/// Generated once per endpoint lifetime; immutable thereafter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerId(u32);

impl PeerId {
    /// Generate a fresh identity from OS randomness. If the OS source
    /// is unavailable, falls back to wall-clock time XOR process id.
    /// The fallback gives a weaker uniqueness guarantee (degraded mode,
    /// last resort only).
    pub fn generate() -> Self {
        let mut buf = [0u8; 4];
        let raw = match OsRng.try_fill_bytes(&mut buf) {
            Ok(()) => u32::from_le_bytes(buf),
            Err(_) => {
                let secs = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .map(|d| d.as_secs() as u32)
                    .unwrap_or(0);
                secs ^ std::process::id()
            }
        };
        PeerId(raw | 0x8000_0000)
    }

    /// Wrap a raw wire value. Returns `None` for the reserved 0.
    pub fn from_raw(raw: u32) -> Option<Self> {
        if raw == BROADCAST_ID {
            None
        } else {
            Some(PeerId(raw))
        }
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}
