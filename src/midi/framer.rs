//! Reassembles SysEx messages that the transport delivers in pieces.
//!
//! Some backends hand long SysEx dumps (channel names, scene data) to the
//! callback in several chunks. Everything else arrives as whole messages and
//! passes straight through.

use log::warn;

const SYSEX_START: u8 = 0xF0;
const SYSEX_END: u8 = 0xF7;

#[derive(Debug)]
pub struct MessageFramer {
    pending: Vec<u8>,
    max_sysex_len: usize,
    discarded: u64,
    // Dropping the tail of an oversized SysEx, possibly across chunks.
    skipping: bool,
}

impl MessageFramer {
    pub fn new(max_sysex_len: usize) -> Self {
        Self {
            pending: Vec::new(),
            max_sysex_len,
            discarded: 0,
            skipping: false,
        }
    }

    /// Incomplete SysEx messages dropped so far.
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    pub fn in_sysex(&self) -> bool {
        !self.pending.is_empty() || self.skipping
    }

    /// Feed one transport chunk, calling `emit` for every complete message.
    pub fn feed(&mut self, chunk: &[u8], mut emit: impl FnMut(Vec<u8>)) {
        let mut rest = chunk;
        while !rest.is_empty() {
            if self.skipping {
                let byte = rest[0];
                match byte {
                    SYSEX_END => self.skipping = false,
                    0xF8..=0xFF => emit(vec![byte]),
                    // A new status ends the oversized message; re-scan it.
                    0x80..=0xF6 => {
                        self.skipping = false;
                        continue;
                    }
                    _ => {}
                }
                rest = &rest[1..];
                continue;
            }

            if self.pending.is_empty() {
                if rest[0] != SYSEX_START {
                    emit(rest.to_vec());
                    return;
                }
                self.pending.push(SYSEX_START);
                rest = &rest[1..];
                continue;
            }

            let byte = rest[0];
            rest = &rest[1..];
            match byte {
                SYSEX_END => {
                    self.pending.push(SYSEX_END);
                    emit(std::mem::take(&mut self.pending));
                }
                // Real-time messages may interleave with SysEx data.
                0xF8..=0xFF => emit(vec![byte]),
                0x80..=0xF6 => {
                    warn!(target: "midi", "SysEx aborted by status {:#04X} after {} bytes", byte, self.pending.len());
                    self.discard();
                    // Re-scan from the interrupting status byte.
                    let start = chunk.len() - rest.len() - 1;
                    rest = &chunk[start..];
                }
                _ => {
                    self.pending.push(byte);
                    if self.pending.len() > self.max_sysex_len {
                        warn!(target: "midi", "SysEx longer than {} bytes, discarding", self.max_sysex_len);
                        self.discard();
                        self.skipping = true;
                    }
                }
            }
        }
    }

    fn discard(&mut self) {
        self.pending.clear();
        self.discarded += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(framer: &mut MessageFramer, chunks: &[&[u8]]) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        for chunk in chunks {
            framer.feed(chunk, |m| out.push(m));
        }
        out
    }

    #[test]
    fn test_short_messages_pass_through() {
        let mut f = MessageFramer::new(64);
        let out = feed_all(&mut f, &[&[0xB0, 99, 1], &[0x90, 60, 100]]);
        assert_eq!(out, vec![vec![0xB0, 99, 1], vec![0x90, 60, 100]]);
    }

    #[test]
    fn test_complete_sysex_in_one_chunk() {
        let mut f = MessageFramer::new(64);
        let out = feed_all(&mut f, &[&[0xF0, 0x7F, 0x7F, 0x06, 0x01, 0xF7]]);
        assert_eq!(out, vec![vec![0xF0, 0x7F, 0x7F, 0x06, 0x01, 0xF7]]);
        assert!(!f.in_sysex());
    }

    #[test]
    fn test_split_sysex_is_joined() {
        let mut f = MessageFramer::new(64);
        let out = feed_all(&mut f, &[&[0xF0, 0x00, 0x00], &[0x1A, 0x50], &[0x11, 0xF7]]);
        assert_eq!(out, vec![vec![0xF0, 0x00, 0x00, 0x1A, 0x50, 0x11, 0xF7]]);
    }

    #[test]
    fn test_realtime_byte_inside_sysex() {
        let mut f = MessageFramer::new(64);
        let out = feed_all(&mut f, &[&[0xF0, 0x01, 0xF8, 0x02, 0xF7]]);
        assert_eq!(out, vec![vec![0xF8], vec![0xF0, 0x01, 0x02, 0xF7]]);
    }

    #[test]
    fn test_status_byte_aborts_sysex() {
        let mut f = MessageFramer::new(64);
        let out = feed_all(&mut f, &[&[0xF0, 0x01, 0x02], &[0xB0, 7, 100]]);
        assert_eq!(out, vec![vec![0xB0, 7, 100]]);
        assert_eq!(f.discarded(), 1);
        assert!(!f.in_sysex());
    }

    #[test]
    fn test_oversized_sysex_is_dropped() {
        let mut f = MessageFramer::new(4);
        let out = feed_all(&mut f, &[&[0xF0, 1, 2, 3, 4, 5, 6, 0xF7], &[0xF0, 1, 0xF7]]);
        assert_eq!(out, vec![vec![0xF0, 1, 0xF7]]);
        assert_eq!(f.discarded(), 1);
    }

    #[test]
    fn test_oversized_sysex_tail_in_next_chunk_is_skipped() {
        let mut f = MessageFramer::new(4);
        let out = feed_all(&mut f, &[&[0xF0, 1, 2, 3, 4, 5], &[6, 7, 0xF7]]);
        assert!(out.is_empty());
        assert!(!f.in_sysex());

        let out = feed_all(&mut f, &[&[0xB0, 7, 100]]);
        assert_eq!(out, vec![vec![0xB0, 7, 100]]);
        assert_eq!(f.discarded(), 1);
    }

    #[test]
    fn test_status_byte_ends_oversized_tail() {
        let mut f = MessageFramer::new(4);
        let out = feed_all(&mut f, &[&[0xF0, 1, 2, 3, 4, 5], &[6, 0xF8, 7], &[0x90, 60, 100]]);
        assert_eq!(out, vec![vec![0xF8], vec![0x90, 60, 100]]);
        assert_eq!(f.discarded(), 1);
        assert!(!f.in_sysex());
    }
}
