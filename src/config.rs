//! Bounds, constants and addressing tags for transports and protocols.
//!
//! Mirrors the teacher crate's convention of keeping magic numbers and
//! bounds-checked enums in one place rather than scattered through the
//! implementation.
use std::{str::FromStr, time::Duration};

use crate::Error;

/// Default serial baud rate used when a caller does not specify one.
pub const DEFAULT_BAUD: u32 = 115_200;
/// Default TCP port for the `"tcp"` transport tag.
pub const DEFAULT_TCP_PORT: u16 = 2000;
/// Bounded deadline used while trying successive resolved addresses.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
/// Read-timeout granularity used by the background I/O thread to notice
/// timer expiry and shutdown requests between reads.
pub const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Default answer timeout for the reader protocol (§4.C).
pub const READER_TIMEOUT: Duration = Duration::from_millis(1500);
/// Default answer timeout for the terminal protocol (§4.C).
pub const TERMINAL_TIMEOUT: Duration = Duration::from_millis(150);

/// Maximum payload length encodable in a reader-protocol packet (§3).
pub const MAX_PAYLOAD_LEN: usize = 250;

/// Raw u32 wire/diagnostic error codes (§6).
pub mod codes {
    pub const SUCCESS: u32 = 0x0000_0000;
    pub const NO_CARD: u32 = 0x0A00_0000;
    pub const WRONG_CARD: u32 = 0x0C00_0000;
    pub const IO_ERROR: u32 = 0x0E00_0001;
    pub const NO_ANSWER: u32 = 0x0E00_00A0;
    pub const ANSWER_TOO_LONG: u32 = 0x0E00_00AF;
    pub const PACKET_CRC_ERROR: u32 = 0x0E00_00CC;
    pub const PACKET_DATA_LEN_ERROR: u32 = 0x0E00_00DE;
    pub const WRONG_ANSWER: u32 = 0x0E00_00DF;
    pub const NO_IMPL: u32 = 0x0E00_00F0;
    pub const NO_IMPL_SUPPORT: u32 = 0x0E00_00F1;
    pub const ERR_MASK: u32 = 0xFF00_00FF;

    /// Card/application-level NACK payload values (§6).
    pub const ERROR_READ: u8 = 8;
    pub const ERROR_WRITE: u8 = 9;
    pub const ERROR_VALUE: u8 = 11;
    pub const NO_COMMAND: u8 = 254;
    pub const CRC_ERROR: u8 = 255;
}

/// Transport addressing tags accepted at the library edge (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum TransportTag {
    /// Reactor-based serial, single background thread.
    #[display("asio")]
    Asio,
    /// Reactor-based serial, background thread pool variant.
    #[display("asio-mt")]
    AsioMt,
    /// Native blocking serial.
    #[display("blockwise")]
    Blockwise,
    /// Direct USB CDC-ACM, enumerates as a serial port on the host.
    #[display("cp210x")]
    Cp210x,
    /// `host:port` TCP.
    #[display("tcp")]
    Tcp,
    /// Local UNIX-domain stream socket, path-addressed.
    #[display("unix")]
    Unix,
    /// In-process card/reader simulator.
    #[display("file")]
    File,
}

impl FromStr for TransportTag {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asio" => Ok(Self::Asio),
            "asio-mt" => Ok(Self::AsioMt),
            "blockwise" => Ok(Self::Blockwise),
            "cp210x" => Ok(Self::Cp210x),
            "tcp" => Ok(Self::Tcp),
            "unix" => Ok(Self::Unix),
            "file" => Ok(Self::File),
            _ => Err(Error::InvalidParams(format!(
                "unknown transport tag: {s}"
            ))),
        }
    }
}

/// One entry of the fixed sector access table used by the `save`/`load`
/// escape hatch (§4.D) when a transport does not implement `Persistence`.
/// Mirrors `examples/original_source/card_storage.cpp`'s `sector_access[]`.
#[derive(Debug, Clone, Copy)]
pub struct SectorAccessEntry {
    pub sector: u8,
    pub key_index: u8,
    pub dynamic: bool,
    /// `Some(enc)` reads the whole sector at once with this encryption
    /// index; `None` falls back to reading block-by-block via `block_enc`.
    pub sector_enc: Option<u8>,
    pub block_enc: [u8; 3],
}

/// Sectors worth touching when falling back to a best-effort card read,
/// with the key/mode/encryption-index combination known to unlock them.
pub const SECTOR_ACCESS_TABLE: &[SectorAccessEntry] = &[
    SectorAccessEntry { sector: 1, key_index: 2, dynamic: false, sector_enc: Some(0xFF), block_enc: [0, 0, 0] },
    SectorAccessEntry { sector: 2, key_index: 3, dynamic: false, sector_enc: Some(0xFF), block_enc: [0, 0, 0] },
    SectorAccessEntry { sector: 3, key_index: 7, dynamic: false, sector_enc: Some(0xFF), block_enc: [0, 0, 0] },
    SectorAccessEntry { sector: 4, key_index: 7, dynamic: false, sector_enc: Some(0xFF), block_enc: [0, 0, 0] },
    SectorAccessEntry { sector: 5, key_index: 6, dynamic: false, sector_enc: Some(0xFF), block_enc: [0, 0, 0] },
    SectorAccessEntry { sector: 9, key_index: 4, dynamic: false, sector_enc: Some(0xFF), block_enc: [0, 0, 0] },
    SectorAccessEntry { sector: 10, key_index: 5, dynamic: false, sector_enc: Some(0xFF), block_enc: [0, 0, 0] },
    SectorAccessEntry { sector: 11, key_index: 8, dynamic: false, sector_enc: None, block_enc: [0xFF, 0x0A, 0x0A] },
    SectorAccessEntry { sector: 13, key_index: 27, dynamic: true, sector_enc: Some(3), block_enc: [0, 0, 0] },
    SectorAccessEntry { sector: 14, key_index: 27, dynamic: true, sector_enc: None, block_enc: [0x3, 0x3, 0] },
];
