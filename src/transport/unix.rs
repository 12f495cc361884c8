//! Local UNIX-domain stream transport (§4.B, §6 tag `"unix"`).
//!
//! Grounded on `examples/original_source/unix_impl.cpp`'s path-addressed
//! stream shape, realised synchronously like [`tcp`](super::tcp).

use std::{
    io::{ErrorKind, Read},
    os::unix::net::UnixStream,
};

use crate::{BaseResult, Error};

use super::{BufClear, Connection};

#[cfg(feature = "async")]
use super::async_conn::{AsyncBufClear, ConnectionAsync};

impl BufClear for UnixStream {
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

pub type UnixConnection = Connection<UnixStream>;

/// Connect to a local UNIX-domain socket at `path`.
pub fn connect(path: &str) -> BaseResult<UnixConnection> {
    let stream = UnixStream::connect(path)?;
    stream.set_nonblocking(true)?;
    Ok(Connection::new(stream))
}

#[cfg(feature = "async")]
impl AsyncBufClear for tokio::net::UnixStream {
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
pub type AsyncUnixConnection = ConnectionAsync<tokio::net::UnixStream>;

/// Async counterpart of [`connect`].
#[cfg(feature = "async")]
pub async fn connect_async(path: &str) -> BaseResult<AsyncUnixConnection> {
    let stream = tokio::net::UnixStream::connect(path).await?;
    Ok(ConnectionAsync::new(stream))
}
