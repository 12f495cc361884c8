//! Type-state builder selecting a transport and producing a [`Reader`]
//! (§4.D, §6 "Addressing of transports at library edge").
//!
//! Grounded on the teacher's `BaseContextBuilder<T>` (`src/builder.rs`): the
//! same per-transport marker-type states, generalised from the teacher's
//! fixed serial/network pair to every tag this crate supports.

use std::marker::PhantomData;

use crate::{BaseResult, Error, config::DEFAULT_TCP_PORT, reader::Reader, transport};

#[cfg(feature = "async")]
use crate::reader::AsyncReader;

pub struct Init;
pub struct Serial;
pub struct Tcp;
pub struct Unix;
pub struct Simulator;

/// Type-state builder for [`Reader`]. Each `with_*` call narrows `T` to the
/// transport kind whose `build()` is then available.
pub struct ReaderBuilder<T = Init> {
    path: Option<String>,
    baud: Option<u32>,
    _marker: PhantomData<T>,
}

impl Default for ReaderBuilder<Init> {
    fn default() -> Self {
        Self::new()
    }
}

impl ReaderBuilder<Init> {
    pub fn new() -> Self {
        Self { path: None, baud: None, _marker: PhantomData }
    }

    /// Native or USB-CDC serial (§6 tags `"blockwise"`/`"cp210x"`).
    pub fn with_serial(self, path: &str) -> ReaderBuilder<Serial> {
        ReaderBuilder { path: Some(path.to_owned()), baud: None, _marker: PhantomData }
    }

    /// `host:port`, or `host` alone to use [`DEFAULT_TCP_PORT`] (§6 tag `"tcp"`).
    pub fn with_tcp(self, addr: &str) -> ReaderBuilder<Tcp> {
        let addr = if addr.contains(':') { addr.to_owned() } else { format!("{addr}:{DEFAULT_TCP_PORT}") };
        ReaderBuilder { path: Some(addr), baud: None, _marker: PhantomData }
    }

    /// Local UNIX-domain stream socket, path-addressed (§6 tag `"unix"`).
    pub fn with_unix(self, path: &str) -> ReaderBuilder<Unix> {
        ReaderBuilder { path: Some(path.to_owned()), baud: None, _marker: PhantomData }
    }

    /// In-process card/reader simulator (§6 tag `"file"`), optionally seeded
    /// from a previously-saved storage file via [`Reader::load`].
    pub fn with_simulator(self) -> ReaderBuilder<Simulator> {
        ReaderBuilder { path: None, baud: None, _marker: PhantomData }
    }

    /// Resolve a `TransportTag` string and the path/address it addresses
    /// into a built [`Reader`], for callers that pick a transport at
    /// runtime rather than at compile time (§6).
    pub fn from_tag(tag: &str, address: &str, baud: Option<u32>) -> BaseResult<Reader> {
        use crate::config::TransportTag::*;
        match tag.parse()? {
            Asio | AsioMt | Blockwise | Cp210x => {
                let mut builder = Self::new().with_serial(address);
                if let Some(baud) = baud {
                    builder = builder.baud(baud);
                }
                builder.build()
            }
            Tcp => Self::new().with_tcp(address).build(),
            Unix => Self::new().with_unix(address).build(),
            File => Self::new().with_simulator().build(),
        }
    }
}

impl ReaderBuilder<Serial> {
    pub fn baud(mut self, baud: u32) -> Self {
        self.baud = Some(baud);
        self
    }

    pub fn build(self) -> BaseResult<Reader> {
        let path = self.path.expect("serial path required to reach build()");
        let conn = match self.baud {
            Some(baud) => transport::serial::open(&path, baud)?,
            None => transport::serial::open_default(&path)?,
        };
        Ok(Reader::new(Box::new(conn)))
    }

    /// Async counterpart of [`ReaderBuilder::build`].
    #[cfg(feature = "async")]
    pub async fn build_async(self) -> BaseResult<AsyncReader<serial2_tokio::SerialPort>> {
        let path = self.path.expect("serial path required to reach build_async()");
        let conn = match self.baud {
            Some(baud) => transport::serial::open_async(&path, baud).await?,
            None => transport::serial::open_default_async(&path).await?,
        };
        Ok(AsyncReader::new(conn))
    }
}

impl ReaderBuilder<Tcp> {
    pub fn build(self) -> BaseResult<Reader> {
        let addr = self.path.expect("tcp address required to reach build()");
        let conn = transport::tcp::connect(&addr)?;
        Ok(Reader::new(Box::new(conn)))
    }

    #[cfg(feature = "async")]
    pub async fn build_async(self) -> BaseResult<AsyncReader<tokio::net::TcpStream>> {
        let addr = self.path.expect("tcp address required to reach build_async()");
        let conn = transport::tcp::connect_async(&addr).await?;
        Ok(AsyncReader::new(conn))
    }
}

impl ReaderBuilder<Unix> {
    #[cfg(unix)]
    pub fn build(self) -> BaseResult<Reader> {
        let path = self.path.expect("unix socket path required to reach build()");
        let conn = transport::unix::connect(&path)?;
        Ok(Reader::new(Box::new(conn)))
    }

    #[cfg(not(unix))]
    pub fn build(self) -> BaseResult<Reader> {
        Err(Error::InvalidParams("unix-domain transport is only available on unix targets".into()))
    }

    /// Only available on unix targets: `tokio::net::UnixStream` itself
    /// doesn't exist elsewhere, unlike the blocking [`Unix`] state's
    /// `build()`, which stays compilable everywhere because [`Reader`]
    /// erases its transport behind `Box<dyn Transact>`.
    #[cfg(all(unix, feature = "async"))]
    pub async fn build_async(self) -> BaseResult<AsyncReader<tokio::net::UnixStream>> {
        let path = self.path.expect("unix socket path required to reach build_async()");
        let conn = transport::unix::connect_async(&path).await?;
        Ok(AsyncReader::new(conn))
    }
}

impl ReaderBuilder<Simulator> {
    pub fn build(self) -> BaseResult<Reader> {
        Ok(Reader::new(Box::new(transport::simulator::SimulatorTransport::new())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_a_reader_over_the_simulator() {
        let reader = ReaderBuilder::new().with_simulator().build();
        assert!(reader.is_ok());
    }

    #[test]
    fn from_tag_dispatches_the_file_tag_to_the_simulator() {
        let reader = ReaderBuilder::from_tag("file", "", None);
        assert!(reader.is_ok());
    }

    #[test]
    fn from_tag_rejects_an_unknown_tag() {
        assert!(ReaderBuilder::from_tag("carrier-pigeon", "", None).is_err());
    }
}
