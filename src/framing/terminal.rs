//! Byte-stuffed packet framing for the terminal protocol.
//!
//! Grounded on `examples/original_source/terminal_protocol.cpp`
//! (`terminal_bytestaff`, `TerminalPacketHeader`, `TerminalUnbytestaffer`).
//! Distinct from the reader protocol: ASCII sentinels instead of high-bit
//! tokens, a single `/` escape marker instead of per-sentinel substitutes,
//! an additive checksum instead of CRC-16, and first-AND-last-byte
//! exemption in the stuffer (unlike the reader protocol's first-byte-only
//! exemption, §9 Open Question).

use bytes::{BufMut, BytesMut};

pub const FSSTR: u8 = b'>';
pub const FMSTR: u8 = b'<';
pub const FEND: u8 = b';';
pub const FMID: u8 = b'/';

/// Packet `type` field values (§4).
pub const FMAS: u8 = b'?';
pub const FSLV: u8 = b'!';
pub const FNAK: u8 = b'-';
pub const FACK: u8 = b'+';

pub const BRDCAST: u8 = 0xFF;

/// `start + type + addr + code`.
pub const HEADER_LEN: usize = 4;
/// `checksum_hi + checksum_lo + FEND`.
pub const TRAILER_LEN: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalHeader {
    pub kind: u8,
    pub addr: u8,
    pub code: u8,
}

impl TerminalHeader {
    /// Parse the fixed header from the front of `buf`. Caller is
    /// responsible for having already synchronised on `FSSTR`.
    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_LEN {
            return None;
        }
        Some(Self { kind: buf[1], addr: buf[2], code: buf[3] })
    }

    pub fn data_len(&self, bytes_available: usize) -> usize {
        bytes_available.saturating_sub(HEADER_LEN + TRAILER_LEN)
    }

    pub fn get_data<'a>(&self, frame: &'a [u8]) -> &'a [u8] {
        let available = self.data_len(frame.len());
        &frame[HEADER_LEN..HEADER_LEN + available]
    }

    /// Sum of every byte between `start` and the trailer, wrapping at 16 bits.
    pub fn checksum_calc(&self, frame: &[u8]) -> u16 {
        frame[1..frame.len() - TRAILER_LEN]
            .iter()
            .fold(0u16, |acc, &b| acc.wrapping_add(b as u16))
    }

    pub fn checksum_ok(&self, frame: &[u8]) -> bool {
        if frame.len() < HEADER_LEN + TRAILER_LEN {
            return false;
        }
        let stored = ((frame[frame.len() - 3] as u16) << 8) | frame[frame.len() - 2] as u16;
        stored == self.checksum_calc(frame)
    }

    /// Interpret the payload as a little-endian NACK diagnostic code, used
    /// when `kind == FNAK`.
    pub fn nack_data(&self, frame: &[u8]) -> u32 {
        let data = self.get_data(frame);
        let mut buf = [0u8; 4];
        let n = data.len().min(4);
        buf[..n].copy_from_slice(&data[..n]);
        u32::from_le_bytes(buf)
    }
}

/// Stuff `src` for the wire. The first and last bytes are copied verbatim;
/// every `FSSTR`/`FMSTR`/`FEND`/`FMID` byte in between is escaped behind a
/// single `FMID` marker.
pub fn terminal_bytestaff(src: &[u8]) -> Vec<u8> {
    if src.len() < 2 {
        return src.to_vec();
    }
    let mut out = Vec::with_capacity(src.len() + 4);
    out.push(src[0]);
    for &c in &src[1..src.len() - 1] {
        match c {
            FSSTR | FMSTR | FEND | FMID => {
                out.push(FMID);
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out.push(src[src.len() - 1]);
    out
}

/// Build a complete, stuffed terminal-protocol frame. `kind` is the packet
/// type byte (`FMAS`/`FSLV`/`FNAK`/`FACK`). The frame always starts with
/// `FMSTR`: this side only ever transmits as the terminal master.
pub fn encode(kind: u8, addr: u8, code: u8, data: &[u8]) -> Vec<u8> {
    let mut raw = Vec::with_capacity(HEADER_LEN + data.len() + TRAILER_LEN);
    raw.push(FMSTR);
    raw.push(kind);
    raw.push(addr);
    raw.push(code);
    raw.extend_from_slice(data);
    let checksum = raw[1..].iter().fold(0u16, |acc, &b| acc.wrapping_add(b as u16));
    raw.push((checksum >> 8) as u8);
    raw.push((checksum & 0xFF) as u8);
    raw.push(FEND);
    terminal_bytestaff(&raw)
}

/// Resumable unstuffer. Mirrors `TerminalUnbytestaffer::feed`: bytes are
/// discarded until `FSSTR` is seen (the reply sentinel — this side only
/// ever receives replies from a slave), then accumulated until `FEND`
/// completes the frame.
#[derive(Debug, Default)]
pub struct TerminalFrameDecoder {
    sink: BytesMut,
    wait_for_start: bool,
    completed: bool,
    escape: bool,
}

impl TerminalFrameDecoder {
    pub fn new() -> Self {
        Self { sink: BytesMut::new(), wait_for_start: true, completed: false, escape: false }
    }

    pub fn reset(&mut self) {
        self.sink.clear();
        self.wait_for_start = true;
        self.completed = false;
        self.escape = false;
    }

    /// Feed newly-arrived transport bytes. Returns `true` once a complete
    /// frame is available.
    pub fn feed(&mut self, data: &[u8]) -> bool {
        for &c in data {
            if self.completed {
                break;
            }
            if self.escape {
                self.escape = false;
                if !self.wait_for_start {
                    self.sink.put_u8(c);
                }
            } else if !self.wait_for_start && c == FEND {
                self.sink.put_u8(c);
                self.completed = true;
                break;
            } else if c == FMID {
                self.escape = true;
            } else if !self.wait_for_start {
                self.sink.put_u8(c);
            } else if c == FSSTR {
                self.wait_for_start = false;
                self.sink.put_u8(c);
            }
        }
        self.completed
    }

    pub fn completed_frame(&self) -> Option<&[u8]> {
        self.completed.then(|| &self.sink[..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_bytestaff_leaves_first_and_last_bytes_alone() {
        let src = [FMSTR, FSSTR, b'X', FEND];
        let stuffed = terminal_bytestaff(&src);
        assert_eq!(stuffed[0], FMSTR);
        assert_eq!(*stuffed.last().unwrap(), FEND);
        assert_eq!(stuffed, vec![FMSTR, FMID, FSSTR, b'X', FEND]);
    }

    #[test]
    fn encode_round_trips_through_a_frame_decoder() {
        let frame_on_wire = encode(FMAS, 0x01, 0x10, &[1, 2, 3]);
        // The decoder expects to see the slave's FSSTR leading its replies;
        // swap the FMSTR this side writes for FSSTR to emulate a reply.
        let mut reply = frame_on_wire.clone();
        reply[0] = FSSTR;

        let mut decoder = TerminalFrameDecoder::new();
        assert!(decoder.feed(&reply));
        let parsed = decoder.completed_frame().unwrap();
        let header = TerminalHeader::parse(parsed).unwrap();
        assert_eq!(header.addr, 0x01);
        assert_eq!(header.code, 0x10);
        assert!(header.checksum_ok(parsed));
        assert_eq!(header.get_data(parsed), &[1, 2, 3]);
    }

    #[test]
    fn checksum_rejects_corrupted_payload() {
        let mut frame = encode(FMAS, 0x01, 0x10, &[1, 2, 3]);
        frame[0] = FSSTR;
        let header = TerminalHeader::parse(&frame).unwrap();
        assert!(header.checksum_ok(&frame));
        let mut corrupted = frame.clone();
        corrupted[HEADER_LEN] ^= 0xFF;
        assert!(!header.checksum_ok(&corrupted));
    }

    #[test]
    fn frame_decoder_discards_bytes_before_fsstr() {
        let mut frame = encode(FMAS, 0x01, 0x10, &[]);
        frame[0] = FSSTR;
        let mut noisy = vec![0x00u8, 0x11];
        noisy.extend_from_slice(&frame);
        let mut decoder = TerminalFrameDecoder::new();
        assert!(decoder.feed(&noisy));
        let parsed = decoder.completed_frame().unwrap();
        assert_eq!(parsed[0], FSSTR);
    }
}
