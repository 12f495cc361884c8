//! TCP transport (§4.B, §6 tag `"tcp"`).
//!
//! DNS-resolves `host:port` and tries every resolved address in order, each
//! bounded by [`DEFAULT_CONNECT_TIMEOUT`]. Grounded on
//! `examples/original_source/tcp_impl.cpp`'s `io_thread` address-iteration
//! loop, realised as a synchronous connect to match [`Connection`].

use std::{
    io::{ErrorKind, Read},
    net::{TcpStream, ToSocketAddrs},
};

use crate::{BaseResult, Error, config::DEFAULT_CONNECT_TIMEOUT};

use super::{BufClear, Connection};

#[cfg(feature = "async")]
use super::async_conn::{AsyncBufClear, ConnectionAsync};

impl BufClear for TcpStream {
    /// Drains whatever the peer has already sent so a fresh request's
    /// answer can't be confused with a stale reply (§5 "Shared resources").
    fn clear_input_buffer(&mut self) -> BaseResult<()> {
        let mut scratch = [0u8; 64];
        loop {
            match self.read(&mut scratch) {
                Ok(0) => break,
                Ok(_) => continue,
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => return Err(Error::Io(e)),
            }
        }
        Ok(())
    }

    fn clear_output_buffer(&mut self) -> BaseResult<()> {
        Ok(())
    }
}

pub type TcpConnection = Connection<TcpStream>;

/// Connect to `host:port`, trying every DNS-resolved address in turn.
pub fn connect(addr: &str) -> BaseResult<TcpConnection> {
    let mut last_err = None;
    for candidate in addr.to_socket_addrs()? {
        match TcpStream::connect_timeout(&candidate, DEFAULT_CONNECT_TIMEOUT) {
            Ok(stream) => {
                stream.set_nonblocking(true)?;
                let _ = stream.set_nodelay(true);
                return Ok(Connection::new(stream));
            }
            Err(e) => last_err = Some(e),
        }
    }
    Err(match last_err {
        Some(e) => Error::Io(e),
        None => Error::InvalidParams(format!("no addresses resolved for {addr}")),
    })
}

#[cfg(feature = "async")]
impl AsyncBufClear for tokio::net::TcpStream {
    /// Completes the teacher's `impl AsyncBufClear for TcpStream` `todo!()`:
    /// drain whatever the peer already sent, the same way the blocking
    /// [`BufClear`] impl above does.
    async fn clear_input_buffer(&mut self) -> BaseResult<()> {
        use tokio::io::AsyncReadExt;
        let mut scratch = [0u8; 64];
        loop {
            match tokio::time::timeout(std::time::Duration::from_millis(1), self.read(&mut scratch)).await {
                Ok(Ok(0)) => break,
                Ok(Ok(_)) => continue,
                Ok(Err(e)) => return Err(Error::Io(e)),
                Err(_) => break,
            }
        }
        Ok(())
    }

    async fn clear_output_buffer(&mut self) -> BaseResult<()> {
        Ok(())
    }
}

#[cfg(feature = "async")]
pub type AsyncTcpConnection = ConnectionAsync<tokio::net::TcpStream>;

/// Async counterpart of [`connect`]: same DNS-iteration policy, realised
/// over `tokio::net::TcpStream`.
#[cfg(feature = "async")]
pub async fn connect_async(addr: &str) -> BaseResult<AsyncTcpConnection> {
    use std::net::ToSocketAddrs;

    let mut last_err = None;
    for candidate in addr.to_socket_addrs()? {
        match tokio::time::timeout(DEFAULT_CONNECT_TIMEOUT, tokio::net::TcpStream::connect(candidate)).await {
            Ok(Ok(stream)) => {
                let _ = stream.set_nodelay(true);
                return Ok(ConnectionAsync::new(stream));
            }
            Ok(Err(e)) => last_err = Some(e),
            Err(_) => last_err = Some(std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out")),
        }
    }
    Err(match last_err {
        Some(e) => Error::Io(e),
        None => Error::InvalidParams(format!("no addresses resolved for {addr}")),
    })
}
