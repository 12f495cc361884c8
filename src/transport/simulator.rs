//! In-process card/reader simulator (§4.F).
//!
//! Grounded on `examples/original_source/file_impl.cpp` (`FileImpl`'s command
//! handler table and per-command semantics) and
//! `examples/original_source/card_storage.cpp`/`card_storage.h` (sector
//! storage layout, load/save). Unlike a real transport this one never
//! touches a socket: [`SimulatorTransport::transact_reader`] dispatches the
//! request in-process and routes the outcome back through the real
//! [`rf::encode`]/[`ReaderProtocol`] codec so CRC and NACK handling are
//! exercised exactly as they would be against real wire bytes (§4.F).

use tracing::{debug, trace};

use crate::{
    BaseResult, Error,
    commands::{
        AuthRequest, ReadBlockRequest, ReadSectorRequest, SetTrailerDynamicRequest,
        SetTrailerRequest, WriteBlockRequest, WriteSectorRequest, codes as cmd,
    },
    config::{SECTOR_ACCESS_TABLE, codes as diag},
    framing::reader as rf,
    protocol::{ReaderAnswer, ReaderProtocol, Resolution, TerminalAnswer},
};

use super::{Persistence, Transact};

const NUM_SECTORS: usize = 16;
const BLOCKS_PER_SECTOR: usize = 3;

/// The simulator's hardcoded `GET_SN` answer (§8 scenario 2) — distinct from
/// [`CardStorage::sn`], which backs `ANTICOLLISION` instead, matching
/// `FileImpl::get_sn` and `FileImpl::anticollision` being two unrelated
/// hardcoded/stored values in the original.
const GET_SN_ANSWER: [u8; 8] = [1, 2, 3, 4, 5, 6, 7, 8];
const VERSION_ANSWER: &[u8] = b"F01\0\0\0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AuthStatus {
    NoAuth,
    Authenticated,
}

#[derive(Debug, Clone, Copy)]
struct SectorStorage {
    key: u8,
    /// `0` static, `1` dynamic, mirroring `Sector::auth_mode`.
    mode: u8,
    enc: [u8; BLOCKS_PER_SECTOR],
    status: AuthStatus,
    blocks: [[u8; 16]; BLOCKS_PER_SECTOR],
}

impl Default for SectorStorage {
    fn default() -> Self {
        Self { key: 0, mode: 0, enc: [0xFF; BLOCKS_PER_SECTOR], status: AuthStatus::NoAuth, blocks: [[0u8; 16]; BLOCKS_PER_SECTOR] }
    }
}

/// Persisted simulator state: the card's serial number and every sector's
/// storage (§4.F, grounded on `CardStorage`).
#[derive(Debug, Clone)]
struct CardStorage {
    sn: u64,
    sectors: [SectorStorage; NUM_SECTORS],
}

impl Default for CardStorage {
    /// Seeds each sector's key/mode from [`SECTOR_ACCESS_TABLE`] rather than
    /// leaving every sector at key 0 (§8 scenario 3): the table is the
    /// known key/mode combination that unlocks each sector, and
    /// `best_effort_traversal`'s `auth_tenacious` walk — and the `AUTH`
    /// handler below, which only authenticates on a matching key — both
    /// need the simulated card to actually agree with it.
    fn default() -> Self {
        let mut sectors = [SectorStorage::default(); NUM_SECTORS];
        for entry in SECTOR_ACCESS_TABLE {
            sectors[entry.sector as usize].key = entry.key_index;
            sectors[entry.sector as usize].mode = entry.dynamic as u8;
        }
        Self { sn: 0x0102_0304_0506_0708, sectors }
    }
}

const PERSIST_SECTOR_LEN: usize = 1 + 1 + 3 + 1 + BLOCKS_PER_SECTOR * 16;
const PERSIST_LEN: usize = 8 + NUM_SECTORS * PERSIST_SECTOR_LEN;

impl CardStorage {
    /// A flat byte dump: `sn` (8 bytes LE) followed by each sector's
    /// `{key, mode, enc[3], status, blocks[3][16]}`. Not intended to be
    /// compatible with the original binary format — that format is opaque
    /// and out of scope (§1) — only stable across this crate's own
    /// save/load round trip.
    fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(PERSIST_LEN);
        out.extend_from_slice(&self.sn.to_le_bytes());
        for sector in &self.sectors {
            out.push(sector.key);
            out.push(sector.mode);
            out.extend_from_slice(&sector.enc);
            out.push(matches!(sector.status, AuthStatus::Authenticated) as u8);
            for block in &sector.blocks {
                out.extend_from_slice(block);
            }
        }
        out
    }

    fn from_bytes(buf: &[u8]) -> BaseResult<Self> {
        if buf.len() != PERSIST_LEN {
            return Err(Error::InvalidResponse(format!(
                "simulator storage file is {} bytes, expected {PERSIST_LEN}",
                buf.len()
            )));
        }
        let mut sn_bytes = [0u8; 8];
        sn_bytes.copy_from_slice(&buf[..8]);
        let mut out = Self { sn: u64::from_le_bytes(sn_bytes), sectors: [SectorStorage::default(); NUM_SECTORS] };
        let mut pos = 8;
        for sector in out.sectors.iter_mut() {
            sector.key = buf[pos];
            sector.mode = buf[pos + 1];
            sector.enc.copy_from_slice(&buf[pos + 2..pos + 5]);
            sector.status = if buf[pos + 5] != 0 { AuthStatus::Authenticated } else { AuthStatus::NoAuth };
            let mut block_pos = pos + 6;
            for block in sector.blocks.iter_mut() {
                block.copy_from_slice(&buf[block_pos..block_pos + 16]);
                block_pos += 16;
            }
            pos += PERSIST_SECTOR_LEN;
        }
        Ok(out)
    }

    fn clear_auth(&mut self) {
        for sector in self.sectors.iter_mut() {
            sector.status = AuthStatus::NoAuth;
        }
    }
}

/// An in-process stand-in for a reader, driven entirely by
/// [`SimulatorTransport::transact_reader`] (§4.F). Answers every command in
/// the minimum catalog (§6); the terminal protocol has no simulated device
/// ([`Error::NoImplSupport`]).
#[derive(Debug)]
pub struct SimulatorTransport {
    storage: CardStorage,
}

impl SimulatorTransport {
    pub fn new() -> Self {
        Self { storage: CardStorage::default() }
    }

    /// Run the command table against `payload`, returning either the
    /// answer bytes or a one-byte NACK diagnostic, mirroring
    /// `FileImpl::send`'s `handler(...) -> ret` dispatch.
    fn dispatch(&mut self, code: u8, payload: &[u8]) -> Result<Vec<u8>, u8> {
        match code {
            cmd::GET_SN => Ok(GET_SN_ANSWER.to_vec()),
            cmd::GET_VERSION => Ok(VERSION_ANSWER.to_vec()),
            cmd::FIELD_ON | cmd::FIELD_OFF | cmd::UPDATE_START => Ok(Vec::new()),
            cmd::MULTIBYTE_PACKAGE | cmd::SYNC_WITH_DEVICE => Ok(Vec::new()),
            cmd::REQUEST_STD => Ok((CARD_TYPE_STANDARD as u16).to_le_bytes().to_vec()),
            cmd::ANTICOLLISION => {
                const SN_LEN: usize = 7;
                let mut answer = vec![0u8; 2 + SN_LEN];
                answer[1] = SN_LEN as u8;
                answer[2..].copy_from_slice(&self.storage.sn.to_le_bytes()[..SN_LEN]);
                Ok(answer)
            }
            cmd::SELECT => Ok(Vec::new()),
            cmd::AUTH | cmd::AUTH_DYN => {
                let request = AuthRequest::from_bytes(payload).ok_or(diag::CRC_ERROR)?;
                self.auth(request, code == cmd::AUTH_DYN)
            }
            cmd::BLOCK_READ => {
                let request = ReadBlockRequest::from_bytes(payload).ok_or(diag::CRC_ERROR)?;
                self.block_read(request)
            }
            cmd::BLOCK_WRITE => {
                let request = WriteBlockRequest::from_bytes(payload).ok_or(diag::CRC_ERROR)?;
                self.block_write(request)
            }
            cmd::SECTOR_READ => {
                let request = ReadSectorRequest::from_bytes(payload).ok_or(diag::CRC_ERROR)?;
                self.sector_read(request)
            }
            cmd::SECTOR_WRITE => {
                let request = WriteSectorRequest::from_bytes(payload).ok_or(diag::CRC_ERROR)?;
                self.sector_write(request)
            }
            cmd::SET_TRAILER => {
                let request = SetTrailerRequest::from_bytes(payload).ok_or(diag::CRC_ERROR)?;
                self.set_trailer(request, 0)
            }
            cmd::SET_TRAILER_DYN => {
                let request = SetTrailerDynamicRequest::from_bytes(payload).ok_or(diag::CRC_ERROR)?;
                self.set_trailer(SetTrailerRequest { sector: request.sector, key_index: request.key_index }, 1)
            }
            _ => Err(diag::NO_COMMAND),
        }
    }

    fn sector_mut(&mut self, sector: u8) -> Result<&mut SectorStorage, u8> {
        self.storage.sectors.get_mut(sector as usize).ok_or(diag::ERROR_VALUE)
    }

    fn auth(&mut self, request: AuthRequest, dynamic: bool) -> Result<Vec<u8>, u8> {
        if request.sector as usize >= NUM_SECTORS {
            return Err(diag::ERROR_VALUE);
        }
        self.storage.clear_auth();
        let sector = self.sector_mut(request.sector)?;
        let wants_mode = dynamic as u8;
        if sector.mode == wants_mode && sector.key == request.key_index {
            sector.status = AuthStatus::Authenticated;
        }
        Ok(Vec::new())
    }

    fn block_read(&mut self, request: ReadBlockRequest) -> Result<Vec<u8>, u8> {
        if request.block as usize >= BLOCKS_PER_SECTOR {
            return Err(diag::ERROR_VALUE);
        }
        let sector = self.sector_mut(request.sector)?;
        if sector.status == AuthStatus::NoAuth {
            return Err(diag::ERROR_READ);
        }
        if sector.enc[request.block as usize] != request.enc {
            return Err(diag::ERROR_READ);
        }
        Ok(sector.blocks[request.block as usize].to_vec())
    }

    fn block_write(&mut self, request: WriteBlockRequest) -> Result<Vec<u8>, u8> {
        if request.block as usize >= BLOCKS_PER_SECTOR {
            return Err(diag::ERROR_VALUE);
        }
        let sector = self.sector_mut(request.sector)?;
        if sector.status == AuthStatus::NoAuth {
            return Err(diag::ERROR_WRITE);
        }
        sector.enc[request.block as usize] = request.enc;
        sector.blocks[request.block as usize] = request.data;
        Ok(Vec::new())
    }

    fn sector_read(&mut self, request: ReadSectorRequest) -> Result<Vec<u8>, u8> {
        if request.sector as usize >= NUM_SECTORS {
            return Err(diag::ERROR_VALUE);
        }
        let sector = self.sector_mut(request.sector)?;
        if sector.status == AuthStatus::NoAuth {
            return Err(diag::ERROR_READ);
        }
        if sector.enc[0] != request.enc {
            return Err(diag::ERROR_READ);
        }
        let mut out = Vec::with_capacity(48);
        for block in &sector.blocks {
            out.extend_from_slice(block);
        }
        Ok(out)
    }

    fn sector_write(&mut self, request: WriteSectorRequest) -> Result<Vec<u8>, u8> {
        if request.sector as usize >= NUM_SECTORS {
            return Err(diag::ERROR_VALUE);
        }
        let sector = self.sector_mut(request.sector)?;
        if sector.status == AuthStatus::NoAuth {
            return Err(diag::ERROR_WRITE);
        }
        sector.enc[0] = request.enc;
        for (block, chunk) in sector.blocks.iter_mut().zip(request.data.chunks_exact(16)) {
            block.copy_from_slice(chunk);
        }
        Ok(Vec::new())
    }

    fn set_trailer(&mut self, request: SetTrailerRequest, mode: u8) -> Result<Vec<u8>, u8> {
        if request.sector as usize >= NUM_SECTORS {
            return Err(diag::ERROR_VALUE);
        }
        let sector = self.sector_mut(request.sector)?;
        if sector.status == AuthStatus::NoAuth {
            return Err(diag::ERROR_WRITE);
        }
        sector.mode = mode;
        sector.key = request.key_index;
        Ok(Vec::new())
    }
}

const CARD_TYPE_STANDARD: u8 = 0x4;

impl Default for SimulatorTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transact for SimulatorTransport {
    /// Encodes the dispatch outcome through the real reader-protocol codec
    /// (success frame or `NACK` with a 4-byte little-endian diagnostic) and
    /// re-parses it with a fresh [`ReaderProtocol`], so CRC/NACK handling
    /// exercises the same code path a real transport's bytes would (§4.F).
    fn transact_reader(&mut self, addr: u8, code: u8, payload: &[u8]) -> BaseResult<ReaderAnswer> {
        trace!(addr, code, payload_len = payload.len(), "simulator: dispatching reader command");
        let frame = match self.dispatch(code, payload) {
            Ok(data) => rf::encode(addr, code, &data),
            Err(diagnostic) => {
                debug!(addr, code, diagnostic, "simulator: answering with NACK");
                rf::encode(addr, rf::NACK_CODE, &(diagnostic as u32).to_le_bytes())
            }
        };
        let mut protocol = ReaderProtocol::new();
        match protocol.feed(&frame) {
            Resolution::Done(result) => result,
            Resolution::Pending => Err(Error::WrongAnswer),
        }
    }

    fn transact_terminal(&mut self, _addr: u8, _code: u8, _payload: &[u8]) -> BaseResult<TerminalAnswer> {
        Err(Error::NoImplSupport)
    }

    fn as_persistence(&mut self) -> Option<&mut dyn Persistence> {
        Some(self)
    }
}

impl Persistence for SimulatorTransport {
    fn load(&mut self, path: &str) -> BaseResult<()> {
        let bytes = std::fs::read(path)?;
        self.storage = CardStorage::from_bytes(&bytes)?;
        debug!(path, "simulator: loaded storage");
        Ok(())
    }

    fn save(&mut self, path: &str) -> BaseResult<()> {
        std::fs::write(path, self.storage.to_bytes())?;
        debug!(path, "simulator: saved storage");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_sn_matches_the_documented_scenario() {
        let mut sim = SimulatorTransport::new();
        let answer = sim.transact_reader(0, cmd::GET_SN, &[]).unwrap();
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&answer.data);
        assert_eq!(u64::from_le_bytes(buf), 0x0807_0605_0403_0201);
    }

    #[test]
    fn auth_then_block_read_round_trips_a_previously_written_block() {
        let mut sim = SimulatorTransport::new();
        let auth = AuthRequest { key_index: 8, sector: 11, sn5: [0; 5] };
        sim.transact_reader(0, cmd::AUTH, &auth.to_bytes()).unwrap();

        let write = WriteBlockRequest { data: [9u8; 16], block: 0, sector: 11, enc: 0xFF };
        sim.transact_reader(0, cmd::BLOCK_WRITE, &write.to_bytes()).unwrap();

        let read = ReadBlockRequest { block: 0, sector: 11, enc: 0xFF };
        let answer = sim.transact_reader(0, cmd::BLOCK_READ, &read.to_bytes()).unwrap();
        assert_eq!(answer.data, vec![9u8; 16]);
    }

    #[test]
    fn block_read_with_wrong_enc_nacks_with_error_read() {
        let mut sim = SimulatorTransport::new();
        let auth = AuthRequest { key_index: 8, sector: 11, sn5: [0; 5] };
        sim.transact_reader(0, cmd::AUTH, &auth.to_bytes()).unwrap();

        let read = ReadBlockRequest { block: 0, sector: 11, enc: 0x01 };
        match sim.transact_reader(0, cmd::BLOCK_READ, &read.to_bytes()) {
            Err(Error::Nack(code)) => assert_eq!(code, diag::ERROR_READ),
            other => panic!("expected Nack(ERROR_READ), got {other:?}"),
        }
    }

    #[test]
    fn anticollision_reports_a_seven_byte_sn() {
        let mut sim = SimulatorTransport::new();
        let answer = sim.transact_reader(0, cmd::ANTICOLLISION, &[]).unwrap();
        assert_eq!(answer.data[1], 7);
        assert_eq!(answer.data.len(), 9);
    }

    #[test]
    fn save_then_load_round_trips_sector_contents() {
        // Sector 0 has no entry in SECTOR_ACCESS_TABLE, so it keeps its
        // default key 0 and this test doesn't need to track that table.
        let mut sim = SimulatorTransport::new();
        let auth = AuthRequest { key_index: 0, sector: 0, sn5: [0; 5] };
        sim.transact_reader(0, cmd::AUTH, &auth.to_bytes()).unwrap();
        let write = WriteBlockRequest { data: [5u8; 16], block: 1, sector: 0, enc: 0xFF };
        sim.transact_reader(0, cmd::BLOCK_WRITE, &write.to_bytes()).unwrap();

        let dir = std::env::temp_dir();
        let path = dir.join(format!("farecard-sim-test-{:?}", std::thread::current().id()));
        let path = path.to_str().unwrap();
        Persistence::save(&mut sim, path).unwrap();

        let mut reloaded = SimulatorTransport::new();
        Persistence::load(&mut reloaded, path).unwrap();
        let _ = std::fs::remove_file(path);

        let auth = AuthRequest { key_index: 0, sector: 0, sn5: [0; 5] };
        reloaded.transact_reader(0, cmd::AUTH, &auth.to_bytes()).unwrap();
        let read = ReadBlockRequest { block: 1, sector: 0, enc: 0xFF };
        let answer = reloaded.transact_reader(0, cmd::BLOCK_READ, &read.to_bytes()).unwrap();
        assert_eq!(answer.data, vec![5u8; 16]);
    }
}
