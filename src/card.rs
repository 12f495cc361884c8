//! Card identity and scan/select commands (§3, §4.E).
//!
//! Grounded on `examples/original_source/card.cpp` (`SerialNumber::fix`,
//! `Card::scan/reset/request_std/anticollision/select`) and
//! `examples/original_source/api_common.h` for field layout.

use crate::{BaseResult, Error, reader::Reader};

/// A contactless card's serial number, as returned by `ANTICOLLISION` (§3).
///
/// `sn` is an 11-byte buffer: 10 bytes of serial number data right-aligned
/// according to `len`, plus a trailing XOR check byte written by [`fix`].
/// Reader firmware can answer with the SN bytes left-aligned at offset 0
/// instead (the simulator does this deliberately, §8 scenario 4); [`fix`]
/// corrects that in place.
///
/// [`fix`]: SerialNumber::fix
#[derive(Debug, Clone, Copy)]
pub struct SerialNumber {
    pub sak: u8,
    pub len: u8,
    pub sn: [u8; 11],
}

impl Default for SerialNumber {
    fn default() -> Self {
        Self { sak: 0, len: 0, sn: [0u8; 11] }
    }
}

impl PartialEq for SerialNumber {
    /// Equality compares the full 11-byte buffer bytewise (§3) — `sak` and
    /// `len` are metadata about how the SN was reported, not part of its
    /// identity.
    fn eq(&self, other: &Self) -> bool {
        self.sn == other.sn
    }
}
impl Eq for SerialNumber {}

impl SerialNumber {
    /// Parse the wire shape a reader answers `ANTICOLLISION` with:
    /// `{ sak, len, sn_data[len] }`, with `sn_data` copied verbatim into
    /// `sn[0..len]` (left-aligned — [`fix`](Self::fix) performs the
    /// right-alignment).
    pub fn from_wire(buf: &[u8]) -> Self {
        let mut out = Self::default();
        if buf.is_empty() {
            return out;
        }
        out.sak = buf[0];
        if buf.len() < 2 {
            return out;
        }
        out.len = buf[1];
        let data = &buf[2..];
        let n = data.len().min(out.sn.len());
        out.sn[..n].copy_from_slice(&data[..n]);
        out
    }

    /// Moves the SN bytes rightward so they occupy `sn[shift..shift+len]`
    /// (where `shift = sn.len() - (len + 1)`) and appends a check byte at
    /// `sn[10]` equal to the XOR of the first four bytes as originally
    /// reported (§3, §8 "SerialNumber.fix idempotence"). A no-op if `len`
    /// names a buffer at least as large as `sn` (nothing to shift) or if
    /// the buffer is already in fixed position, so repeated calls are
    /// idempotent (§9 Open Question d).
    pub fn fix(&mut self) {
        let len = self.len as usize;
        if len >= self.sn.len() {
            return;
        }
        let shift = self.sn.len() - (len + 1);
        let already_fixed = self.sn[..shift].iter().all(|&b| b == 0)
            && len >= 4
            && self.sn[10]
                == self.sn[shift] ^ self.sn[shift + 1] ^ self.sn[shift + 2] ^ self.sn[shift + 3];
        if already_fixed {
            return;
        }

        let mut buf = [0u8; 11];
        buf[..len].copy_from_slice(&self.sn[..len]);
        self.sn = [0u8; 11];
        self.sn[shift..shift + len].copy_from_slice(&buf[..len]);
        if len >= 4 {
            self.sn[10] = buf[0] ^ buf[1] ^ buf[2] ^ buf[3];
        }
    }

    /// The right-aligned 5-byte prefix (`sn[6..11]`, including the check
    /// byte) used by commands that take an `SN5` (§3, §6).
    pub fn sn5(&self) -> [u8; 5] {
        let mut out = [0u8; 5];
        out.copy_from_slice(&self.sn[6..11]);
        out
    }

    /// The right-aligned 7-byte prefix (`sn[3..10]`, excluding the check
    /// byte).
    pub fn sn7(&self) -> [u8; 7] {
        let mut out = [0u8; 7];
        out.copy_from_slice(&self.sn[3..10]);
        out
    }
}

/// A contactless smart card identified by type + serial number (§3).
///
/// Lifecycle: constructed empty, populated by [`Card::scan`]
/// ([`Card::request_std`] sets `kind`, [`Card::anticollision`] sets `sn`),
/// and re-validated by [`Card::reset`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Card {
    pub sn: SerialNumber,
    pub kind: u16,
}

const DEFAULT_ADDR: u8 = 0;

impl Card {
    pub fn new() -> Self {
        Self::default()
    }

    /// `request_std` then `anticollision`. Any NACK from either step is
    /// reported as [`Error::NoCard`] — a card-domain failure, not a raw
    /// protocol error (§4.E, grounded on `Card::scan`'s `ret < ERROR_BASE`
    /// remap).
    pub fn scan(&mut self, reader: &mut Reader) -> BaseResult<()> {
        match self.request_std(reader) {
            Err(Error::Nack(_)) => return Err(Error::NoCard),
            other => other?,
        }
        match self.anticollision(reader) {
            Err(Error::Nack(_)) => Err(Error::NoCard),
            other => other,
        }
    }

    /// Re-runs `request_std`/`anticollision` into fresh locals and confirms
    /// both match what this `Card` already remembers; a mismatch means a
    /// different card is now in the field (§4.E).
    pub fn reset(&mut self, reader: &mut Reader) -> BaseResult<()> {
        let observed_kind = reader.request_std(DEFAULT_ADDR)?;
        if self.kind != observed_kind {
            return Err(Error::WrongCard);
        }
        let observed_sn = reader.anticollision(DEFAULT_ADDR)?;
        if self.sn != observed_sn {
            return Err(Error::WrongCard);
        }
        Ok(())
    }

    /// `REQUEST_STD`: sets `self.kind` to the answered card type.
    pub fn request_std(&mut self, reader: &mut Reader) -> BaseResult<()> {
        self.kind = reader.request_std(DEFAULT_ADDR)?;
        Ok(())
    }

    /// `ANTICOLLISION`. If the reader answers with a shorter SN than this
    /// crate's buffer expects, the underlying `PACKET_DATA_LEN_ERROR` is
    /// absorbed here: the partially-filled [`SerialNumber`] is corrected
    /// with [`SerialNumber::fix`] and treated as success (§4.E, §7, §8
    /// scenario 4) — the reader returns a variable-length SN that we
    /// right-align client-side.
    pub fn anticollision(&mut self, reader: &mut Reader) -> BaseResult<()> {
        match reader.anticollision(DEFAULT_ADDR) {
            Ok(sn) => {
                self.sn = sn;
                Ok(())
            }
            Err(Error::DataLenMismatch { .. }) => {
                let mut sn = reader.last_anticollision_partial();
                sn.fix();
                self.sn = sn;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// `SELECT`, sending this card's `sn5()`.
    pub fn select(&self, reader: &mut Reader) -> BaseResult<()> {
        reader.select(DEFAULT_ADDR, &self.sn.sn5())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fix_right_aligns_a_seven_byte_sn_and_appends_a_check_byte() {
        let mut sn = SerialNumber { sak: 0, len: 7, sn: [0u8; 11] };
        sn.sn[..7].copy_from_slice(&[0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77]);
        sn.fix();
        assert_eq!(&sn.sn[0..3], &[0, 0, 0]);
        assert_eq!(&sn.sn[3..10], &[0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77]);
        assert_eq!(sn.sn[10], 0x11 ^ 0x22 ^ 0x33 ^ 0x44);
    }

    #[test]
    fn fix_is_idempotent() {
        let mut sn = SerialNumber { sak: 0, len: 7, sn: [0u8; 11] };
        sn.sn[..7].copy_from_slice(&[1, 2, 3, 4, 5, 6, 7]);
        sn.fix();
        let once = sn;
        sn.fix();
        assert_eq!(once, sn);
        assert_eq!(once.sn, sn.sn);
    }

    #[test]
    fn sn5_and_sn7_slice_the_right_aligned_buffer() {
        let mut sn = SerialNumber { sak: 0, len: 7, sn: [0u8; 11] };
        sn.sn[..7].copy_from_slice(&[1, 2, 3, 4, 5, 6, 7]);
        sn.fix();
        assert_eq!(sn.sn7(), [1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(sn.sn5(), [4, 5, 6, 7, sn.sn[10]]);
    }
}
