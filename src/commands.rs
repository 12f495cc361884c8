//! Reader command catalog and packed wire request structs (§6).
//!
//! Grounded on `examples/original_source/commands.h` (opcodes) and
//! `examples/original_source/api_common.h` (`Sector::auth_request` and
//! friends). Every struct is hand-serialised field by field rather than
//! relying on host layout, per §9's packed-struct design note.

/// Reader-protocol opcodes (§6). `NACK` (`0x01`) is not a command a caller
/// issues; it's the code a reader answer carries when it's reporting an
/// error instead of a normal result.
pub mod codes {
    pub const NACK: u8 = 0x01;
    pub const GET_VERSION: u8 = 0x02;
    pub const MULTIBYTE_PACKAGE: u8 = 0x04;
    pub const SYNC_WITH_DEVICE: u8 = 0x05;
    pub const UPDATE_START: u8 = 0x06;
    pub const GET_SN: u8 = 0x10;
    pub const ANTICOLLISION: u8 = 0x22;
    pub const REQUEST_STD: u8 = 0x40;
    pub const SELECT: u8 = 0x43;
    pub const AUTH: u8 = 0x44;
    pub const FIELD_ON: u8 = 0x4E;
    pub const FIELD_OFF: u8 = 0x4F;
    pub const AUTH_DYN: u8 = 0xBB;
    pub const BLOCK_READ: u8 = 0xBC;
    pub const BLOCK_WRITE: u8 = 0xBD;
    pub const SECTOR_READ: u8 = 0xBE;
    pub const SECTOR_WRITE: u8 = 0xBF;
    pub const SET_TRAILER: u8 = 0xC0;
    pub const SET_TRAILER_DYN: u8 = 0xC1;
}

/// `{ key_index, sector, sn5 }`, used by `AUTH`/`AUTH_DYN` (§4.E).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthRequest {
    pub key_index: u8,
    pub sector: u8,
    pub sn5: [u8; 5],
}

impl AuthRequest {
    pub const LEN: usize = 7;

    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        let mut out = [0u8; Self::LEN];
        out[0] = self.key_index;
        out[1] = self.sector;
        out[2..7].copy_from_slice(&self.sn5);
        out
    }

    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        if buf.len() < Self::LEN {
            return None;
        }
        let mut sn5 = [0u8; 5];
        sn5.copy_from_slice(&buf[2..7]);
        Some(Self { key_index: buf[0], sector: buf[1], sn5 })
    }
}

/// `{ block, sector, enc }`, used by `BLOCK_READ` (§4.E).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadBlockRequest {
    pub block: u8,
    pub sector: u8,
    pub enc: u8,
}

impl ReadBlockRequest {
    pub const LEN: usize = 3;

    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        [self.block, self.sector, self.enc]
    }

    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        if buf.len() < Self::LEN {
            return None;
        }
        Some(Self { block: buf[0], sector: buf[1], enc: buf[2] })
    }
}

/// `{ data[16], block, sector, enc }`, used by `BLOCK_WRITE` (§4.E).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteBlockRequest {
    pub data: [u8; 16],
    pub block: u8,
    pub sector: u8,
    pub enc: u8,
}

impl WriteBlockRequest {
    pub const LEN: usize = 19;

    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        let mut out = [0u8; Self::LEN];
        out[..16].copy_from_slice(&self.data);
        out[16] = self.block;
        out[17] = self.sector;
        out[18] = self.enc;
        out
    }

    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        if buf.len() < Self::LEN {
            return None;
        }
        let mut data = [0u8; 16];
        data.copy_from_slice(&buf[..16]);
        Some(Self { data, block: buf[16], sector: buf[17], enc: buf[18] })
    }
}

/// `{ sector, enc }`, used by `SECTOR_READ` (§4.E).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadSectorRequest {
    pub sector: u8,
    pub enc: u8,
}

impl ReadSectorRequest {
    pub const LEN: usize = 2;

    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        [self.sector, self.enc]
    }

    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        if buf.len() < Self::LEN {
            return None;
        }
        Some(Self { sector: buf[0], enc: buf[1] })
    }
}

/// `{ data[48], sector, enc }`, used by `SECTOR_WRITE` (§4.E).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteSectorRequest {
    pub data: [u8; 48],
    pub sector: u8,
    pub enc: u8,
}

impl WriteSectorRequest {
    pub const LEN: usize = 50;

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::LEN);
        out.extend_from_slice(&self.data);
        out.push(self.sector);
        out.push(self.enc);
        out
    }

    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        if buf.len() < Self::LEN {
            return None;
        }
        let mut data = [0u8; 48];
        data.copy_from_slice(&buf[..48]);
        Some(Self { data, sector: buf[48], enc: buf[49] })
    }
}

/// `{ sector, key_index }`, used by `SET_TRAILER` (§4.E).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetTrailerRequest {
    pub sector: u8,
    pub key_index: u8,
}

impl SetTrailerRequest {
    pub const LEN: usize = 2;

    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        [self.sector, self.key_index]
    }

    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        if buf.len() < Self::LEN {
            return None;
        }
        Some(Self { sector: buf[0], key_index: buf[1] })
    }
}

/// `{ sector, key_index, sn5 }`, used by `SET_TRAILER_DYN` (§4.E, §9 Open
/// Question b).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetTrailerDynamicRequest {
    pub sector: u8,
    pub key_index: u8,
    pub sn5: [u8; 5],
}

impl SetTrailerDynamicRequest {
    pub const LEN: usize = 7;

    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        let mut out = [0u8; Self::LEN];
        out[0] = self.sector;
        out[1] = self.key_index;
        out[2..7].copy_from_slice(&self.sn5);
        out
    }

    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        if buf.len() < Self::LEN {
            return None;
        }
        let mut sn5 = [0u8; 5];
        sn5.copy_from_slice(&buf[2..7]);
        Some(Self { sector: buf[0], key_index: buf[1], sn5 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_request_round_trips() {
        let req = AuthRequest { key_index: 8, sector: 11, sn5: [1, 2, 3, 4, 5] };
        let bytes = req.to_bytes();
        assert_eq!(bytes.len(), AuthRequest::LEN);
        assert_eq!(AuthRequest::from_bytes(&bytes), Some(req));
    }

    #[test]
    fn write_sector_request_round_trips() {
        let req = WriteSectorRequest { data: [7u8; 48], sector: 3, enc: 0xFF };
        let bytes = req.to_bytes();
        assert_eq!(bytes.len(), WriteSectorRequest::LEN);
        assert_eq!(WriteSectorRequest::from_bytes(&bytes), Some(req));
    }
}
