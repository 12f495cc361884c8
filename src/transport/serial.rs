//! Native and USB-CDC serial transports (§4.B, §6 tags `"blockwise"` and
//! `"cp210x"`).
//!
//! Both tags enumerate as a standard serial port on the host and differ
//! only in native driver plumbing (vendor-specific control transfers for
//! `cp210x`'s baud/frame parameters) that's out of scope for this crate
//! (§1): both are realised here as the same [`serial2::SerialPort`]-backed
//! [`Connection`].

use crate::{BaseResult, config::{DEFAULT_BAUD, POLL_INTERVAL}};

use super::{BufClear, Connection};

#[cfg(feature = "async")]
use super::async_conn::{AsyncBufClear, ConnectionAsync};

impl BufClear for serial2::SerialPort {
    fn clear_input_buffer(&mut self) -> BaseResult<()> {
        self.discard_input_buffer().map_err(Into::into)
    }

    fn clear_output_buffer(&mut self) -> BaseResult<()> {
        self.discard_output_buffer().map_err(Into::into)
    }
}

pub type SerialConnection = Connection<serial2::SerialPort>;

/// Open a blocking serial connection at `baud`. Grounded on the teacher's
/// `BaseContextBuilder<Serial>::build` (`src/builder.rs`).
pub fn open(path: &str, baud: u32) -> BaseResult<SerialConnection> {
    let port = serial2::SerialPort::open(path, baud)?;
    // A short read timeout keeps `Connection::poll_until_resolved` waking up
    // to re-check its own deadline instead of blocking on the OS read call
    // for however long the port feels like.
    port.set_read_timeout(POLL_INTERVAL)?;
    Ok(Connection::new(port))
}

/// Open at the driver's default baud rate ([`DEFAULT_BAUD`]).
pub fn open_default(path: &str) -> BaseResult<SerialConnection> {
    open(path, DEFAULT_BAUD)
}

#[cfg(feature = "async")]
impl AsyncBufClear for serial2_tokio::SerialPort {
    /// The buffer discard itself is a plain ioctl on the underlying
    /// descriptor, not a streaming operation, so there's nothing to await.
    async fn clear_input_buffer(&mut self) -> BaseResult<()> {
        self.discard_input_buffer().map_err(Into::into)
    }

    async fn clear_output_buffer(&mut self) -> BaseResult<()> {
        self.discard_output_buffer().map_err(Into::into)
    }
}

#[cfg(feature = "async")]
pub type AsyncSerialConnection = ConnectionAsync<serial2_tokio::SerialPort>;

/// Async counterpart of [`open`].
#[cfg(feature = "async")]
pub async fn open_async(path: &str, baud: u32) -> BaseResult<AsyncSerialConnection> {
    let port = serial2_tokio::SerialPort::open(path, baud)?;
    Ok(ConnectionAsync::new(port))
}

/// Async counterpart of [`open_default`].
#[cfg(feature = "async")]
pub async fn open_default_async(path: &str) -> BaseResult<AsyncSerialConnection> {
    open_async(path, DEFAULT_BAUD).await
}
