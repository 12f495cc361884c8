//! One-shot request/response protocol engines (§4.C).
//!
//! A protocol instance is created fresh for every command and bound to a
//! transport for the lifetime of that single request, so there is never a
//! prior request's tail bytes haunting the next one (§4.C "Design
//! rationale"). Grounded on `examples/original_source/protocol.h`
//! (`PacketHeader`/`Reader::send_command`) for the reader variant and
//! `examples/original_source/terminal_protocol.cpp` (`TerminalProtocol::feed`)
//! for the terminal variant's addr/code filtering.

use std::time::Duration;

use tracing::trace;

use crate::{
    Error,
    config,
    framing::{reader as rf, terminal as tf},
};

/// A resolved reader-protocol answer: the frame's address/code plus payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderAnswer {
    pub addr: u8,
    pub code: u8,
    pub data: Vec<u8>,
}

/// A resolved terminal-protocol answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalAnswer {
    pub addr: u8,
    pub code: u8,
    pub data: Vec<u8>,
}

/// Outcome of feeding one chunk into a one-shot protocol (§4.C `feed`
/// contract): either nothing resolved yet, or a terminal result — exactly
/// one of `{frame, crc error, nack}` per chunk that completes a frame.
#[derive(Debug)]
pub enum Resolution<A> {
    Pending,
    Done(crate::BaseResult<A>),
}

/// Reader-protocol (FBGN/FESC framing, CRC-16) one-shot state machine.
///
/// States (§4.C): `Idle -> AwaitingWrite` happens in the caller (building
/// the frame via [`ReaderProtocol::encode`]); `AwaitingWrite ->
/// AwaitingFrame` is the caller writing the frame to the transport;
/// `AwaitingFrame -> Resolved` happens inside [`ReaderProtocol::feed`].
#[derive(Debug)]
pub struct ReaderProtocol {
    decoder: rf::FrameDecoder,
    timeout: Duration,
}

impl ReaderProtocol {
    /// A protocol instance using the reader family's default timeout.
    pub fn new() -> Self {
        Self { decoder: rf::FrameDecoder::new(), timeout: config::READER_TIMEOUT }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self { decoder: rf::FrameDecoder::new(), timeout }
    }

    /// The answer timeout armed by [`crate::transport::Connection`] after
    /// the write completes. Zero means send-only: no answer is expected
    /// and the request resolves immediately (§4.C).
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Build the stuffed, CRC-protected frame for `addr`/`code`/`payload`.
    pub fn encode(&self, addr: u8, code: u8, payload: &[u8]) -> Vec<u8> {
        rf::encode(addr, code, payload)
    }

    /// Feed a freshly-arrived chunk of transport bytes (§4.C `feed`
    /// contract). Unsolicited noise ahead of the frame's `FBGN` sentinel is
    /// discarded by the decoder itself.
    pub fn feed(&mut self, chunk: &[u8]) -> Resolution<ReaderAnswer> {
        trace!(chunk_len = chunk.len(), "reader protocol: feeding chunk");
        if !self.decoder.feed(chunk) {
            return Resolution::Pending;
        }
        let frame = match self.decoder.completed_frame() {
            Some(frame) => frame,
            None => return Resolution::Pending,
        };
        let header = match rf::PacketHeader::parse(frame) {
            Some(header) => header,
            None => return Resolution::Done(Err(Error::WrongAnswer)),
        };
        if !header.crc_ok(frame) {
            return Resolution::Done(Err(Error::Crc));
        }
        if header.code == rf::NACK_CODE {
            let diagnostic = header.nack_data(frame);
            return Resolution::Done(Err(Error::Nack(diagnostic as u8)));
        }
        let data = header.get_data(frame).to_vec();
        Resolution::Done(Ok(ReaderAnswer { addr: header.addr, code: header.code, data }))
    }
}

impl Default for ReaderProtocol {
    fn default() -> Self {
        Self::new()
    }
}

/// Terminal-protocol (FSSTR/FMSTR/FEND framing, additive checksum) one-shot
/// state machine. Unlike the reader protocol, a terminal reply must match
/// the `addr`/`code` of the outstanding request — a mismatch absorbs a
/// broadcast or another request's reply and resets the decoder to keep
/// waiting (§4.C).
#[derive(Debug)]
pub struct TerminalProtocol {
    decoder: tf::TerminalFrameDecoder,
    addr: u8,
    code: u8,
    timeout: Duration,
}

impl TerminalProtocol {
    pub fn new(addr: u8, code: u8) -> Self {
        Self {
            decoder: tf::TerminalFrameDecoder::new(),
            addr,
            code,
            timeout: config::TERMINAL_TIMEOUT,
        }
    }

    pub fn with_timeout(addr: u8, code: u8, timeout: Duration) -> Self {
        Self { decoder: tf::TerminalFrameDecoder::new(), addr, code, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Build the stuffed, checksummed frame. This side only ever transmits
    /// as the terminal master (`FMSTR`, type `FMAS`).
    pub fn encode(&self, payload: &[u8]) -> Vec<u8> {
        tf::encode(tf::FMAS, self.addr, self.code, payload)
    }

    pub fn feed(&mut self, chunk: &[u8]) -> Resolution<TerminalAnswer> {
        if !self.decoder.feed(chunk) {
            return Resolution::Pending;
        }
        let frame = match self.decoder.completed_frame() {
            Some(frame) => frame,
            None => return Resolution::Pending,
        };
        let header = match tf::TerminalHeader::parse(frame) {
            Some(header) => header,
            None => return Resolution::Done(Err(Error::WrongAnswer)),
        };

        // A reply to some other outstanding request (or a broadcast):
        // absorb it and keep waiting for ours.
        if header.addr != self.addr || header.code != self.code {
            self.decoder.reset();
            return Resolution::Pending;
        }

        if frame.len() < tf::HEADER_LEN + tf::TRAILER_LEN {
            return Resolution::Done(Err(Error::WrongAnswer));
        }
        if !header.checksum_ok(frame) {
            return Resolution::Done(Err(Error::Crc));
        }
        if header.kind == tf::FNAK {
            let diagnostic = header.nack_data(frame);
            return Resolution::Done(Err(Error::Nack(diagnostic as u8)));
        }
        let data = header.get_data(frame).to_vec();
        Resolution::Done(Ok(TerminalAnswer { addr: header.addr, code: header.code, data }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reader_protocol_resolves_a_clean_answer() {
        let mut protocol = ReaderProtocol::new();
        let frame = rf::encode(0x00, 0x10, &[1, 2, 3]);
        match protocol.feed(&frame) {
            Resolution::Done(Ok(answer)) => {
                assert_eq!(answer.code, 0x10);
                assert_eq!(answer.data, vec![1, 2, 3]);
            }
            _ => panic!("expected a resolved answer"),
        }
    }

    #[test]
    fn reader_protocol_surfaces_nack_as_the_low_byte() {
        let mut protocol = ReaderProtocol::new();
        let frame = rf::encode(0x00, rf::NACK_CODE, &[11, 0, 0, 0]);
        match protocol.feed(&frame) {
            Resolution::Done(Err(Error::Nack(code))) => assert_eq!(code, 11),
            _ => panic!("expected Nack(11)"),
        }
    }

    #[test]
    fn reader_protocol_rejects_corrupted_crc() {
        let mut protocol = ReaderProtocol::new();
        let mut frame = rf::encode(0x00, 0x10, &[1, 2, 3]);
        let last = frame.len() - 1;
        frame[last] ^= 0xFF;
        match protocol.feed(&frame) {
            Resolution::Done(Err(Error::Crc)) => {}
            other => panic!("expected a CRC error, got a different resolution: {other:?}"),
        }
    }

    #[test]
    fn terminal_protocol_absorbs_mismatched_replies_and_waits() {
        let mut protocol = TerminalProtocol::new(0x01, 0x10);
        let mut other = tf::encode(tf::FMAS, 0x02, 0x10, &[9]);
        other[0] = tf::FSSTR;
        assert!(matches!(protocol.feed(&other), Resolution::Pending));

        let mut ours = tf::encode(tf::FMAS, 0x01, 0x10, &[1, 2, 3]);
        ours[0] = tf::FSSTR;
        match protocol.feed(&ours) {
            Resolution::Done(Ok(answer)) => assert_eq!(answer.data, vec![1, 2, 3]),
            other => panic!("expected a resolved answer, got {other:?}"),
        }
    }

    #[test]
    fn terminal_protocol_surfaces_nack() {
        let mut protocol = TerminalProtocol::new(0x01, 0x10);
        let mut frame = tf::encode(tf::FNAK, 0x01, 0x10, &[5, 0, 0, 0]);
        frame[0] = tf::FSSTR;
        match protocol.feed(&frame) {
            Resolution::Done(Err(Error::Nack(code))) => assert_eq!(code, 5),
            other => panic!("expected Nack(5), got {other:?}"),
        }
    }
}
