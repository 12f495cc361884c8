//! Byte-stuffed packet framing for the reader protocol.
//!
//! Grounded on `examples/original_source/protocol.cpp` (`bytestaff`/`unbytestaff`,
//! `PacketHeader`, `prepare_packet`) and `examples/original_source/subway_protocol.cpp`
//! (`Unbytestaffer`'s resumable `wait_for_fbgn`/`escape` state machine).

use bytes::{BufMut, BytesMut};

use super::crc16;

pub const FBGN: u8 = 0xFF;
pub const FESC: u8 = 0xF1;
pub const TFBGN: u8 = 0xF2;
pub const TFESC: u8 = 0xF3;

/// Packet `code` value meaning "this is a negative acknowledgement, not an
/// answer" (§3, §6). The payload holds a little-endian error number.
pub const NACK_CODE: u8 = 0x01;

/// `head + addr + code + len`, always present ahead of the payload.
pub const HEADER_LEN: usize = 4;
pub const CRC_LEN: usize = 2;

/// Parsed view of a reader-protocol packet header. `head` is always `FBGN`
/// once a frame has synchronised, so it isn't stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub addr: u8,
    pub code: u8,
    pub len: u8,
}

impl PacketHeader {
    /// Parse the fixed header from the front of `buf`. Returns `None` if
    /// `buf` is too short or doesn't start with the frame sentinel.
    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_LEN || buf[0] != FBGN {
            return None;
        }
        Some(Self { addr: buf[1], code: buf[2], len: buf[3] })
    }

    /// Total frame size implied by this header, including the trailing CRC.
    pub fn full_size(&self) -> usize {
        HEADER_LEN + self.len as usize + CRC_LEN
    }

    /// Validate the trailing `[low, high]` CRC against the frame body.
    /// `frame` must be at least `self.full_size()` bytes.
    pub fn crc_ok(&self, frame: &[u8]) -> bool {
        let full = self.full_size();
        if frame.len() < full {
            return false;
        }
        let body_len = full - CRC_LEN;
        crc16::check(&frame[..body_len], frame[body_len], frame[body_len + 1])
    }

    /// Copy at most `self.len` payload bytes out of `frame`, truncated to
    /// whatever `frame` actually holds past the header.
    pub fn get_data<'a>(&self, frame: &'a [u8]) -> &'a [u8] {
        let start = HEADER_LEN.min(frame.len());
        let end = (HEADER_LEN + self.len as usize).min(frame.len());
        &frame[start..end]
    }

    /// Interpret the payload as a little-endian NACK diagnostic code, as the
    /// reader does when `code == NACK_BYTE` (§6). Unused trailing bytes (if
    /// the payload is shorter than 4 bytes) are treated as zero.
    pub fn nack_data(&self, frame: &[u8]) -> u32 {
        let data = self.get_data(frame);
        let mut buf = [0u8; 4];
        let n = data.len().min(4);
        buf[..n].copy_from_slice(&data[..n]);
        u32::from_le_bytes(buf)
    }
}

/// Stuff `src` for the wire: the first byte (the `FBGN` sentinel) is copied
/// verbatim, and every subsequent `FBGN`/`FESC` byte is escaped. Unlike the
/// terminal protocol's stuffer, the final byte receives no special
/// treatment (§9, Open Question — resolved against `protocol.cpp`'s actual
/// `bytestaff`, not the prose description).
pub fn bytestaff(src: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(src.len() + 4);
    let mut iter = src.iter();
    if let Some(&first) = iter.next() {
        out.push(first);
    }
    for &c in iter {
        match c {
            FBGN => {
                out.push(FESC);
                out.push(TFBGN);
            }
            FESC => {
                out.push(FESC);
                out.push(TFESC);
            }
            _ => out.push(c),
        }
    }
    out
}

/// Inverse of [`bytestaff`] over a whole in-memory buffer. An unrecognised
/// escape sequence is recovered permissively: the escape byte and the
/// literal that followed it are both emitted, matching the original
/// firmware's tolerance for a single corrupted escape.
pub fn unbytestaff(src: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(src.len());
    let mut escape = false;
    for &c in src {
        if escape {
            match c {
                TFBGN => out.push(FBGN),
                TFESC => out.push(FESC),
                other => {
                    out.push(FESC);
                    out.push(other);
                }
            }
            escape = false;
        } else if c == FESC {
            escape = true;
        } else {
            out.push(c);
        }
    }
    out
}

/// Build a complete, stuffed frame: header, payload, and a CRC-16 computed
/// over the header and payload together (§3).
pub fn encode(addr: u8, code: u8, data: &[u8]) -> Vec<u8> {
    let mut raw = Vec::with_capacity(HEADER_LEN + data.len() + CRC_LEN);
    raw.push(FBGN);
    raw.push(addr);
    raw.push(code);
    raw.push(data.len() as u8);
    raw.extend_from_slice(data);
    let (low, high) = crc16::calc(&raw);
    raw.push(low);
    raw.push(high);
    bytestaff(&raw)
}

/// Resumable, stateful unstuffer. Mirrors `Unbytestaffer::feed`: bytes are
/// discarded until the first `FBGN` is observed, then every subsequent
/// fed chunk is unstuffed into a growing sink until a complete frame
/// (as declared by its own header's `len`) is available.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    sink: BytesMut,
    wait_for_fbgn: bool,
    escape: bool,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self { sink: BytesMut::new(), wait_for_fbgn: true, escape: false }
    }

    /// Drop any accumulated state and resynchronise on the next `FBGN`.
    pub fn reset(&mut self) {
        self.sink.clear();
        self.wait_for_fbgn = true;
        self.escape = false;
    }

    /// Feed newly-arrived transport bytes. Returns `true` once the sink
    /// holds a complete frame (check [`FrameDecoder::completed_frame`]).
    pub fn feed(&mut self, data: &[u8]) -> bool {
        let mut i = 0;
        if self.wait_for_fbgn {
            while i < data.len() && data[i] != FBGN {
                i += 1;
            }
            if i < data.len() {
                self.wait_for_fbgn = false;
            }
        }
        while i < data.len() {
            let c = data[i];
            i += 1;
            if self.escape {
                match c {
                    TFBGN => self.sink.put_u8(FBGN),
                    TFESC => self.sink.put_u8(FESC),
                    other => {
                        self.sink.put_u8(FESC);
                        self.sink.put_u8(other);
                    }
                }
                self.escape = false;
            } else if c == FESC {
                self.escape = true;
            } else {
                self.sink.put_u8(c);
            }
        }

        match PacketHeader::parse(&self.sink) {
            Some(header) => self.sink.len() >= header.full_size(),
            None => false,
        }
    }

    /// The complete frame, if one is ready, sized to its own header's
    /// `full_size()` (any bytes accumulated past it belong to the next
    /// frame and are left behind when the caller resets or drops this
    /// decoder — one-shot protocol use discards them).
    pub fn completed_frame(&self) -> Option<&[u8]> {
        let header = PacketHeader::parse(&self.sink)?;
        let full = header.full_size();
        (self.sink.len() >= full).then(|| &self.sink[..full])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytestaff_matches_the_documented_scenario() {
        let src = [0xFFu8, 0x01, 0xFF, 0xF1, 0x02];
        let expected = [0xFFu8, 0x01, 0xF1, 0xF2, 0xF1, 0xF3, 0x02];
        assert_eq!(bytestaff(&src), expected);
    }

    #[test]
    fn unbytestaff_inverts_bytestaff() {
        let src = [0xFFu8, 0x01, 0xFF, 0xF1, 0x02];
        let stuffed = bytestaff(&src);
        assert_eq!(unbytestaff(&stuffed), src);
    }

    #[test]
    fn unbytestaff_recovers_from_unrecognised_escape() {
        let malformed = [0xFFu8, FESC, 0x7A];
        assert_eq!(unbytestaff(&malformed), vec![0xFFu8, FESC, 0x7A]);
    }

    #[test]
    fn encode_round_trips_through_a_frame_decoder() {
        let frame = encode(0x00, 0x10, &[1, 2, 3]);
        let mut decoder = FrameDecoder::new();
        assert!(decoder.feed(&frame));
        let parsed = decoder.completed_frame().unwrap();
        let header = PacketHeader::parse(parsed).unwrap();
        assert_eq!(header.code, 0x10);
        assert_eq!(header.len, 3);
        assert!(header.crc_ok(parsed));
        assert_eq!(header.get_data(parsed), &[1, 2, 3]);
    }

    #[test]
    fn frame_decoder_accepts_bytes_split_across_many_feeds() {
        let frame = encode(0x00, 0x04, &[9, 8, 7, 6]);
        let mut decoder = FrameDecoder::new();
        let mut done = false;
        for byte in &frame {
            done = decoder.feed(std::slice::from_ref(byte));
        }
        assert!(done);
        assert!(decoder.completed_frame().is_some());
    }

    #[test]
    fn frame_decoder_discards_noise_before_the_first_fbgn() {
        let frame = encode(0x00, 0x10, &[]);
        let mut noisy = vec![0x00u8, 0x11, 0x22];
        noisy.extend_from_slice(&frame);
        let mut decoder = FrameDecoder::new();
        assert!(decoder.feed(&noisy));
        let parsed = decoder.completed_frame().unwrap();
        assert_eq!(parsed[0], FBGN);
    }

    #[test]
    fn nack_data_reads_little_endian_payload() {
        let frame = encode(0x00, 0x00, &[0xAD, 0xDE, 0x00, 0x00]);
        let header = PacketHeader::parse(&frame).unwrap();
        assert_eq!(header.nack_data(&frame), 0xDEAD);
    }

    proptest::proptest! {
        #[test]
        fn bytestaff_round_trips_for_arbitrary_payloads(data in proptest::collection::vec(proptest::prelude::any::<u8>(), 1..64)) {
            let mut src = vec![FBGN];
            src.extend_from_slice(&data);
            let stuffed = bytestaff(&src);
            proptest::prop_assert_eq!(unbytestaff(&stuffed), src);
        }
    }
}
