//! Mifare sector model and block/sector-level card commands (§4.E).
//!
//! Grounded on `examples/original_source/api_common.h` (`Sector`, `block_t`,
//! `sector_t`) and `examples/original_source/card.cpp` (the command methods).

use crate::{
    BaseResult, Error,
    card::Card,
    commands::{
        AuthRequest, ReadBlockRequest, ReadSectorRequest, SetTrailerDynamicRequest,
        SetTrailerRequest, WriteBlockRequest, WriteSectorRequest, codes,
    },
    reader::Reader,
};

const DEFAULT_ADDR: u8 = 0;

/// Whether a sector's trailer key is checked statically (`AUTH`) or against
/// the card's serial number (`AUTH_DYN`) (§4.E, §9 Open Question b).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    Static,
    Dynamic,
}

/// A Mifare Standard sector: 3 data blocks, an authentication key index, and
/// the mode that key is checked under (§4.E). `blocks` mirrors the reader's
/// view of the sector's contents as of the last successful read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sector {
    pub num: u8,
    pub key_index: u8,
    pub mode: AuthMode,
    pub blocks: [[u8; 16]; 3],
}

impl Sector {
    pub fn new(num: u8, key_index: u8, mode: AuthMode) -> Self {
        Self { num, key_index, mode, blocks: [[0u8; 16]; 3] }
    }

    /// `AUTH` (static mode) or `AUTH_DYN` (dynamic mode), sending
    /// `{key_index, num, card.sn5}`.
    pub fn authenticate(&self, reader: &mut Reader, card: &Card) -> BaseResult<()> {
        let code = match self.mode {
            AuthMode::Static => codes::AUTH,
            AuthMode::Dynamic => codes::AUTH_DYN,
        };
        let request = AuthRequest { key_index: self.key_index, sector: self.num, sn5: card.sn.sn5() };
        reader.command(DEFAULT_ADDR, code, &request.to_bytes(), Some(0))?;
        Ok(())
    }

    /// `BLOCK_READ`. Bounds-checks `block ∈ [0,3)` before touching the
    /// transport at all (§4.E); a card-absent or wrong-key failure still
    /// comes back as a reader NACK.
    pub fn read_block(&mut self, reader: &mut Reader, block: u8, enc: u8) -> BaseResult<[u8; 16]> {
        if block as usize >= self.blocks.len() {
            return Err(Error::InvalidParams(format!("block {block} out of range 0..3")));
        }
        let request = ReadBlockRequest { block, sector: self.num, enc };
        let data = reader.command(DEFAULT_ADDR, codes::BLOCK_READ, &request.to_bytes(), Some(16))?;
        self.blocks[block as usize].copy_from_slice(&data);
        Ok(self.blocks[block as usize])
    }

    /// `BLOCK_WRITE`, sending whatever this sector currently holds for
    /// `block` (§4.E).
    pub fn write_block(&mut self, reader: &mut Reader, block: u8, enc: u8) -> BaseResult<()> {
        if block as usize >= self.blocks.len() {
            return Err(Error::InvalidParams(format!("block {block} out of range 0..3")));
        }
        let request = WriteBlockRequest { data: self.blocks[block as usize], block, sector: self.num, enc };
        reader.command(DEFAULT_ADDR, codes::BLOCK_WRITE, &request.to_bytes(), Some(0))?;
        Ok(())
    }

    /// `SECTOR_READ`: all 3 blocks at once, gated on `enc` matching the
    /// sector's block-0 encryption index (§4.E).
    pub fn read(&mut self, reader: &mut Reader, enc: u8) -> BaseResult<[[u8; 16]; 3]> {
        let request = ReadSectorRequest { sector: self.num, enc };
        let data = reader.command(DEFAULT_ADDR, codes::SECTOR_READ, &request.to_bytes(), Some(48))?;
        for (block, chunk) in self.blocks.iter_mut().zip(data.chunks_exact(16)) {
            block.copy_from_slice(chunk);
        }
        Ok(self.blocks)
    }

    /// `SECTOR_WRITE`: all 3 blocks at once.
    pub fn write(&mut self, reader: &mut Reader, enc: u8) -> BaseResult<()> {
        let mut data = [0u8; 48];
        for (chunk, block) in data.chunks_exact_mut(16).zip(self.blocks.iter()) {
            chunk.copy_from_slice(block);
        }
        let request = WriteSectorRequest { data, sector: self.num, enc };
        reader.command(DEFAULT_ADDR, codes::SECTOR_WRITE, &request.to_bytes(), Some(0))?;
        Ok(())
    }

    /// `SET_TRAILER`: pushes this sector's current `key_index` to the
    /// reader as the new static key (§4.E). Callers set `key_index`/`mode`
    /// before calling — this only transmits what's already there.
    pub fn set_trailer(&self, reader: &mut Reader) -> BaseResult<()> {
        let request = SetTrailerRequest { sector: self.num, key_index: self.key_index };
        reader.command(DEFAULT_ADDR, codes::SET_TRAILER, &request.to_bytes(), Some(0))?;
        Ok(())
    }

    /// `SET_TRAILER_DYN`: same as [`Sector::set_trailer`] but additionally
    /// carries the card's `sn5`, binding the new key to this specific card
    /// (§4.E, §9 Open Question b).
    pub fn set_trailer_dynamic(&self, reader: &mut Reader, card: &Card) -> BaseResult<()> {
        let request = SetTrailerDynamicRequest {
            sector: self.num,
            key_index: self.key_index,
            sn5: card.sn.sn5(),
        };
        reader.command(DEFAULT_ADDR, codes::SET_TRAILER_DYN, &request.to_bytes(), Some(0))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ReaderBuilder, card::Card};

    fn simulator_reader() -> Reader {
        ReaderBuilder::new().with_simulator().build().unwrap()
    }

    #[test]
    fn read_block_rejects_out_of_range_block_before_touching_the_transport() {
        let mut reader = simulator_reader();
        let mut sector = Sector::new(1, 2, AuthMode::Static);
        match sector.read_block(&mut reader, 3, 0xFF) {
            Err(Error::InvalidParams(_)) => {}
            other => panic!("expected InvalidParams, got {other:?}"),
        }
    }

    #[test]
    fn write_block_rejects_out_of_range_block() {
        let mut reader = simulator_reader();
        let mut sector = Sector::new(1, 2, AuthMode::Static);
        assert!(matches!(sector.write_block(&mut reader, 5, 0xFF), Err(Error::InvalidParams(_))));
    }

    #[test]
    fn authenticate_read_write_round_trip_through_the_simulator() {
        let mut reader = simulator_reader();
        let mut card = Card::new();
        card.scan(&mut reader).unwrap();

        // Sector 1 is in the fixed access table under key 2; the default-
        // seeded simulator card won't authenticate sector 1 against key 0.
        let mut sector = Sector::new(1, 2, AuthMode::Static);
        sector.authenticate(&mut reader, &card).unwrap();

        sector.blocks[0] = [7u8; 16];
        sector.write_block(&mut reader, 0, 0xFF).unwrap();
        let read_back = sector.read_block(&mut reader, 0, 0xFF).unwrap();
        assert_eq!(read_back, [7u8; 16]);
    }
}
