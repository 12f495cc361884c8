//! Host-side driver for serial-attached contactless smart-card readers.
//!
//! The crate is built around a byte-stuffed, length-prefixed, CRC-protected
//! packet protocol carried over a pluggable byte-stream [`transport::Transact`],
//! a one-shot [`protocol`] state machine that correlates an outgoing command
//! with its inbound frame, and a [`reader::Reader`] façade that binds the two
//! together for the [`card`]/[`sector`] command set.
//!
//! # Example
//! This example opens a connection against the in-process simulator and
//! scans a card.
//!
//! ```no_run
//! use farecard::{ReaderBuilder, card::Card};
//!
//! # fn example() -> farecard::BaseResult<()> {
//! let mut reader = ReaderBuilder::new().with_simulator().build()?;
//! let mut card = Card::default();
//! card.scan(&mut reader)?;
//! # Ok(())
//! # }
//! ```
use std::{
    net::AddrParseError,
    num::{ParseFloatError, ParseIntError},
    str::Utf8Error,
};

use thiserror::Error;

pub mod builder;
pub mod card;
pub mod commands;
pub mod config;
pub mod framing;
pub mod protocol;
pub mod reader;
pub mod sector;
pub mod transport;

pub use builder::ReaderBuilder;
pub use reader::Reader;

/// Errors for the reader/transport/protocol stack.
///
/// Variants line up with the wire error taxonomy (see `config::codes`); use
/// [`Error::code`] to recover the original `u32` for callers that need the
/// wire-compatible diagnostic value rather than a matched Rust type.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("no card responded to the request")]
    NoCard,
    #[error("card serial number or type changed since last reset")]
    WrongCard,
    #[error("transport i/o error")]
    IoTransport,
    #[error("no answer received within the protocol timeout")]
    NoAnswer,
    #[error("answer payload ({0} bytes) exceeds the caller's buffer")]
    AnswerTooLong(usize),
    #[error("frame failed CRC/checksum validation")]
    Crc,
    #[error("answer length {received} does not match expected length {expected}")]
    DataLenMismatch { received: u8, expected: u8 },
    #[error("unexpected answer shape")]
    WrongAnswer,
    #[error("reader-reported error {0}")]
    Nack(u8),
    #[error("no transport implementation selected")]
    NoImpl,
    #[error("persistence capability not implemented by this transport")]
    NoImplSupport,
    #[error("device not found")]
    DeviceNotFound,
    #[error("{0}")]
    InvalidParams(String),
    #[error("{0}")]
    InvalidResponse(String),
    #[error("{0}")]
    Other(String),
    #[error(transparent)]
    Utf8(#[from] Utf8Error),
    #[error(transparent)]
    ParseIntError(#[from] ParseIntError),
    #[error(transparent)]
    ParseFloatError(#[from] ParseFloatError),
    #[error(transparent)]
    AddrParseError(#[from] AddrParseError),
}

impl Error {
    /// Recover the legacy u32 wire/diagnostic code for this error, per §6 of
    /// the error taxonomy. Variants with no wire equivalent (parameter
    /// validation, I/O) return `0x0E000001` (IO_ERROR) as the closest match.
    pub fn code(&self) -> u32 {
        use config::codes::*;
        match self {
            Error::NoCard => NO_CARD,
            Error::WrongCard => WRONG_CARD,
            Error::IoTransport | Error::Io(_) => IO_ERROR,
            Error::NoAnswer => NO_ANSWER,
            Error::AnswerTooLong(_) => ANSWER_TOO_LONG,
            Error::Crc => PACKET_CRC_ERROR,
            Error::DataLenMismatch { received, expected } => {
                let payload = ((*received as u32) << 8) | (*expected as u32);
                PACKET_DATA_LEN_ERROR | (payload << 8)
            }
            Error::WrongAnswer => WRONG_ANSWER,
            Error::Nack(code) => *code as u32,
            Error::NoImpl => NO_IMPL,
            Error::NoImplSupport => NO_IMPL_SUPPORT,
            _ => IO_ERROR,
        }
    }
}

pub type BaseResult<T> = std::result::Result<T, Error>;
