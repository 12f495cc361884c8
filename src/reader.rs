//! Command façade binding a chosen transport to the reader/card command set
//! (§4.D).
//!
//! Grounded on `examples/original_source/protocol.h` (`Reader::send_command`'s
//! five-step dispatch) and `examples/original_source/reader.cpp`/`file_impl.cpp`
//! for the minimum command set's request/answer shapes.

use tracing::{instrument, warn};

use crate::{
    BaseResult, Error,
    card::{Card, SerialNumber},
    commands::codes as cmd,
    config,
    sector::{AuthMode, Sector},
    transport::Transact,
};

#[cfg(feature = "async")]
use crate::transport::async_conn::{AsyncBufClear, ConnectionAsync};

/// Wire size of a `SerialNumber` answer: `sak(1) + len(1) + sn(11)` (§3, §6).
const ANTICOLLISION_ANSWER_LEN: u8 = 13;

/// The driver's entry point: one reader bound to one transport (§4.D).
/// Constructed by [`crate::ReaderBuilder`].
#[derive(Debug)]
pub struct Reader {
    transport: Box<dyn Transact>,
    last_anticollision_partial: SerialNumber,
}

impl Reader {
    pub fn new(transport: Box<dyn Transact>) -> Self {
        Self { transport, last_anticollision_partial: SerialNumber::default() }
    }

    /// Steps 2-5 of the façade's dispatch algorithm (§4.D): transact one
    /// reader-protocol command and, if `expected_len` is given, require the
    /// answer to be exactly that long. Any length mismatch is still reported
    /// through [`Error::DataLenMismatch`] even though the answer itself
    /// already arrived without a transport error — callers that want the
    /// partial answer anyway (`Card::anticollision`) read it back out of a
    /// side channel rather than through this `Result`.
    #[instrument(level = "debug", skip(self, payload), fields(payload_len = payload.len()))]
    pub(crate) fn command(
        &mut self,
        addr: u8,
        code: u8,
        payload: &[u8],
        expected_len: Option<u8>,
    ) -> BaseResult<Vec<u8>> {
        let answer = self.transport.transact_reader(addr, code, payload).inspect_err(
            |error| warn!(addr, code, %error, "command failed"),
        )?;
        if answer.code != code {
            warn!(addr, code, answer.code, "reader answered with a different code than requested");
            return Err(Error::WrongAnswer);
        }
        if let Some(expected) = expected_len {
            let received = answer.data.len() as u8;
            if received != expected {
                warn!(addr, code, received, expected, "answer length mismatch");
                return Err(Error::DataLenMismatch { received, expected });
            }
        }
        Ok(answer.data)
    }

    /// `GET_SN`: an 8-byte little-endian serial number (§6).
    pub fn get_sn(&mut self) -> BaseResult<u64> {
        let data = self.command(0, cmd::GET_SN, &[], Some(8))?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&data);
        Ok(u64::from_le_bytes(buf))
    }

    /// `GET_VERSION`: an ASCII version string, NUL-padded on the wire (§6).
    pub fn get_version(&mut self) -> BaseResult<String> {
        let data = self.command(0, cmd::GET_VERSION, &[], None)?;
        let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
        Ok(String::from_utf8_lossy(&data[..end]).into_owned())
    }

    pub fn field_on(&mut self) -> BaseResult<()> {
        self.command(0, cmd::FIELD_ON, &[], Some(0)).map(drop)
    }

    pub fn field_off(&mut self) -> BaseResult<()> {
        self.command(0, cmd::FIELD_OFF, &[], Some(0)).map(drop)
    }

    pub fn update_start(&mut self) -> BaseResult<()> {
        self.command(0, cmd::UPDATE_START, &[], Some(0)).map(drop)
    }

    /// `SYNC_WITH_DEVICE`: acknowledge a transfer boundary with no payload
    /// (§4.E).
    pub fn sync_with_device(&mut self, shift: u16, last: bool) -> BaseResult<()> {
        let header = pack_shift_last(shift, last);
        self.command(0, cmd::SYNC_WITH_DEVICE, &header, Some(0)).map(drop)
    }

    /// One `MULTIBYTE_PACKAGE` chunk of an ongoing transfer (§4.E).
    pub fn multibyte_package(&mut self, shift: u16, last: bool, data: &[u8]) -> BaseResult<()> {
        let mut payload = Vec::with_capacity(2 + data.len());
        payload.extend_from_slice(&pack_shift_last(shift, last));
        payload.extend_from_slice(data);
        self.command(0, cmd::MULTIBYTE_PACKAGE, &payload, Some(0)).map(drop)
    }

    /// Splits `data` into `MULTIBYTE_PACKAGE` frames of at most `chunk_size`
    /// bytes and finishes with a `SYNC_WITH_DEVICE` at the final shift,
    /// mirroring the original device-update path (§4.E).
    pub fn send_package(&mut self, data: &[u8], chunk_size: usize) -> BaseResult<()> {
        assert!(chunk_size > 0, "chunk_size must be nonzero");
        let mut shift = 0usize;
        let mut chunks = data.chunks(chunk_size).peekable();
        if chunks.peek().is_none() {
            return self.sync_with_device(0, true);
        }
        while let Some(chunk) = chunks.next() {
            let last = chunks.peek().is_none();
            self.multibyte_package(shift as u16, last, chunk)?;
            shift += chunk.len();
        }
        self.sync_with_device(shift as u16, true)
    }

    /// `REQUEST_STD`: the card type reported for whatever's in the field.
    pub fn request_std(&mut self, addr: u8) -> BaseResult<u16> {
        let data = self.command(addr, cmd::REQUEST_STD, &[], Some(2))?;
        Ok(u16::from_le_bytes([data[0], data[1]]))
    }

    /// `ANTICOLLISION`. The answer is parsed into a [`SerialNumber`] and
    /// cached (via [`Reader::last_anticollision_partial`]) before the length
    /// check runs, so a reader that reports a shorter SN than this crate's
    /// 11-byte buffer expects still leaves the caller something to recover
    /// with (§4.D step 4, §4.E).
    #[instrument(level = "debug", skip(self))]
    pub fn anticollision(&mut self, addr: u8) -> BaseResult<SerialNumber> {
        let answer = self.transport.transact_reader(addr, cmd::ANTICOLLISION, &[])?;
        if answer.code != cmd::ANTICOLLISION {
            return Err(Error::WrongAnswer);
        }
        let sn = SerialNumber::from_wire(&answer.data);
        self.last_anticollision_partial = sn;
        let received = answer.data.len() as u8;
        if received != ANTICOLLISION_ANSWER_LEN {
            return Err(Error::DataLenMismatch { received, expected: ANTICOLLISION_ANSWER_LEN });
        }
        Ok(sn)
    }

    /// The partially-decoded [`SerialNumber`] from the most recent
    /// [`Reader::anticollision`] call, valid even when that call returned
    /// [`Error::DataLenMismatch`] (§4.D step 4/5).
    pub fn last_anticollision_partial(&self) -> SerialNumber {
        self.last_anticollision_partial
    }

    /// `SELECT`, given a card's right-aligned 5-byte SN.
    pub fn select(&mut self, addr: u8, sn5: &[u8; 5]) -> BaseResult<()> {
        self.command(addr, cmd::SELECT, sn5, Some(0)).map(drop)
    }

    /// Delegates to the transport's [`crate::transport::Persistence`] if it
    /// has one; otherwise falls back to a best-effort card read over the
    /// fixed sector access table and reports [`Error::NoImplSupport`]
    /// regardless of how much of the traversal succeeded (§4.D "escape
    /// hatch" — the fallback exists to leave some trace of the attempt, not
    /// to produce a usable persisted file).
    pub fn save(&mut self, path: &str) -> BaseResult<()> {
        if let Some(persistence) = self.transport.as_persistence() {
            return persistence.save(path);
        }
        self.best_effort_traversal();
        Err(Error::NoImplSupport)
    }

    pub fn load(&mut self, path: &str) -> BaseResult<()> {
        match self.transport.as_persistence() {
            Some(persistence) => persistence.load(path),
            None => Err(Error::NoImplSupport),
        }
    }

    /// Authenticates and reads every sector in [`config::SECTOR_ACCESS_TABLE`],
    /// retrying once with key index 0 ("tenacious" auth) and skipping a
    /// sector that still can't be authenticated rather than aborting the
    /// whole traversal (§4.D).
    fn best_effort_traversal(&mut self) {
        let mut card = Card::new();
        if card.scan(self).is_err() {
            return;
        }
        for entry in config::SECTOR_ACCESS_TABLE {
            let mode = if entry.dynamic { AuthMode::Dynamic } else { AuthMode::Static };
            let mut sector = Sector::new(entry.sector, entry.key_index, mode);
            if auth_tenacious(self, &mut sector, &card).is_err() {
                continue;
            }
            match entry.sector_enc {
                Some(enc) => {
                    let _ = sector.read(self, enc);
                }
                None => {
                    for (block, &enc) in entry.block_enc.iter().enumerate() {
                        let _ = sector.read_block(self, block as u8, enc);
                    }
                }
            }
        }
    }
}

/// Async counterpart of [`Reader`], gated behind the `async` feature.
///
/// Generic over the backend rather than built on a boxed `Reader`-style
/// trait object, for the same reason [`ConnectionAsync`] is generic (see
/// its doc comment): async trait methods aren't object-safe without an
/// adapter this crate's dependency stack doesn't carry. Callers pick a
/// concrete connection type (e.g. `transport::tcp::AsyncTcpConnection`)
/// at the call site instead of through a runtime tag, which is also why
/// this façade only exposes the device-level command set used to get a
/// connection talking (`GET_SN`, `GET_VERSION`, field control, the card
/// presence/selection primitives) rather than the full [`Card`]/[`Sector`]
/// convenience layer built on top of the blocking [`Reader`] — that layer
/// takes `&mut Reader` by design and would need its own async mirror to
/// generalise, which is future work rather than something this module
/// carries today.
#[cfg(feature = "async")]
#[derive(Debug)]
pub struct AsyncReader<B: AsyncBufClear> {
    conn: ConnectionAsync<B>,
    last_anticollision_partial: SerialNumber,
}

#[cfg(feature = "async")]
impl<B: AsyncBufClear> AsyncReader<B> {
    pub fn new(conn: ConnectionAsync<B>) -> Self {
        Self { conn, last_anticollision_partial: SerialNumber::default() }
    }

    pub fn into_inner(self) -> ConnectionAsync<B> {
        self.conn
    }

    async fn command(
        &mut self,
        addr: u8,
        code: u8,
        payload: &[u8],
        expected_len: Option<u8>,
    ) -> BaseResult<Vec<u8>> {
        let answer = self.conn.transact_reader(addr, code, payload).await?;
        if answer.code != code {
            return Err(Error::WrongAnswer);
        }
        if let Some(expected) = expected_len {
            let received = answer.data.len() as u8;
            if received != expected {
                return Err(Error::DataLenMismatch { received, expected });
            }
        }
        Ok(answer.data)
    }

    pub async fn get_sn(&mut self) -> BaseResult<u64> {
        let data = self.command(0, cmd::GET_SN, &[], Some(8)).await?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&data);
        Ok(u64::from_le_bytes(buf))
    }

    pub async fn get_version(&mut self) -> BaseResult<String> {
        let data = self.command(0, cmd::GET_VERSION, &[], None).await?;
        let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
        Ok(String::from_utf8_lossy(&data[..end]).into_owned())
    }

    pub async fn field_on(&mut self) -> BaseResult<()> {
        self.command(0, cmd::FIELD_ON, &[], Some(0)).await.map(drop)
    }

    pub async fn field_off(&mut self) -> BaseResult<()> {
        self.command(0, cmd::FIELD_OFF, &[], Some(0)).await.map(drop)
    }

    pub async fn request_std(&mut self, addr: u8) -> BaseResult<u16> {
        let data = self.command(addr, cmd::REQUEST_STD, &[], Some(2)).await?;
        Ok(u16::from_le_bytes([data[0], data[1]]))
    }

    /// Mirrors [`Reader::anticollision`]'s cache-before-length-check order.
    pub async fn anticollision(&mut self, addr: u8) -> BaseResult<SerialNumber> {
        let answer = self.conn.transact_reader(addr, cmd::ANTICOLLISION, &[]).await?;
        if answer.code != cmd::ANTICOLLISION {
            return Err(Error::WrongAnswer);
        }
        let sn = SerialNumber::from_wire(&answer.data);
        self.last_anticollision_partial = sn;
        let received = answer.data.len() as u8;
        if received != ANTICOLLISION_ANSWER_LEN {
            return Err(Error::DataLenMismatch { received, expected: ANTICOLLISION_ANSWER_LEN });
        }
        Ok(sn)
    }

    pub fn last_anticollision_partial(&self) -> SerialNumber {
        self.last_anticollision_partial
    }

    pub async fn select(&mut self, addr: u8, sn5: &[u8; 5]) -> BaseResult<()> {
        self.command(addr, cmd::SELECT, sn5, Some(0)).await.map(drop)
    }
}

/// `{ shift: 15 bits, last: 1 bit }` packed little-endian into 2 bytes, per
/// `MULTIBYTE_PACKAGE`/`SYNC_WITH_DEVICE`'s shared header shape (§4.E, §9
/// Open Question c).
fn pack_shift_last(shift: u16, last: bool) -> [u8; 2] {
    let word = (shift << 1) | (last as u16);
    word.to_le_bytes()
}

/// Authenticate `sector` against `card`, retrying once with key index 0 if
/// the declared key doesn't unlock it — and verifying the auth actually took
/// by reading block 0 — mirroring `card_sector_auth_tenacious` (§4.D).
fn auth_tenacious(reader: &mut Reader, sector: &mut Sector, card: &Card) -> BaseResult<()> {
    if sector.authenticate(reader, card).is_ok() && sector.read_block(reader, 0, 0xFF).is_ok() {
        return Ok(());
    }
    if sector.key_index != 0 {
        sector.key_index = 0;
        return auth_tenacious(reader, sector, card);
    }
    Err(Error::Nack(config::codes::ERROR_READ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_shift_last_sets_the_low_bit_for_the_final_chunk() {
        assert_eq!(pack_shift_last(0, false), 0u16.to_le_bytes());
        assert_eq!(pack_shift_last(0, true), 1u16.to_le_bytes());
        assert_eq!(pack_shift_last(4, true), 9u16.to_le_bytes());
    }
}
