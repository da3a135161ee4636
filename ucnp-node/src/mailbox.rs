//! Filesystem mailbox: the cross-process software rendezvous. One file
//! per sender (`ucnp.<8-hex-digit-id>`) in a shared directory; publish
//! truncate-writes the sender's file, fetch consumes the newest file
//! not the caller's own. A production transport would replace this with
//! a dedicated out-of-band signaling channel of the host hardware.

use std::fs;
use std::path::PathBuf;
use std::time::SystemTime;

use ucnp_core::{Channel, ChannelError, PeerId};

const FILE_PREFIX: &str = "ucnp.";

pub struct FileMailbox {
    dir: PathBuf,
}

impl FileMailbox {
    /// Open a mailbox directory, creating it if needed.
    pub fn open(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn slot_path(&self, id: PeerId) -> PathBuf {
        self.dir.join(format!("{FILE_PREFIX}{:08x}", id.as_u32()))
    }
}

impl Channel for FileMailbox {
    fn publish(&mut self, from: PeerId, frame: &[u8]) -> Result<usize, ChannelError> {
        fs::write(self.slot_path(from), frame)?;
        tracing::debug!(from = %from, bytes = frame.len(), "published frame");
        Ok(frame.len())
    }

    fn fetch(&mut self, local: PeerId) -> Result<Option<(PeerId, Vec<u8>)>, ChannelError> {
        let mut newest: Option<(SystemTime, PeerId, PathBuf)> = None;
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(hex) = name.strip_prefix(FILE_PREFIX) else {
                continue;
            };
            let Ok(raw) = u32::from_str_radix(hex, 16) else {
                continue;
            };
            let Some(sender) = PeerId::from_raw(raw) else {
                continue;
            };
            if sender == local {
                continue;
            }
            let Ok(modified) = entry.metadata().and_then(|m| m.modified()) else {
                continue;
            };
            if newest.as_ref().map_or(true, |(t, _, _)| modified > *t) {
                newest = Some((modified, sender, entry.path()));
            }
        }
        let Some((_, sender, path)) = newest else {
            return Ok(None);
        };
        let frame = fs::read(&path)?;
        // Consume the slot. A publish racing between read and unlink is
        // lost; the single-slot contract makes no stronger promise.
        let _ = fs::remove_file(&path);
        tracing::debug!(from = %sender, bytes = frame.len(), "fetched frame");
        Ok(Some((sender, frame)))
    }
}
