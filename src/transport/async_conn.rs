//! Async counterpart of [`super::Connection`], gated behind the `async`
//! feature (§4.B, §9 "Polymorphic transports").
//!
//! Grounded on the teacher's `src/transport/connection_async.rs`
//! (`ConnectionAsync<B>`/`AsyncBufClear`), which mirrors its own blocking
//! `Connection<B>` one read-loop-per-transaction shape but leaves
//! `transaction_handler` and `impl AsyncBufClear for TcpStream` as
//! `todo!()`. This module completes that shape against the reader/terminal
//! framing protocols the same way [`super::Connection`] already does,
//! rather than inventing a different async design: one fresh
//! [`crate::protocol::ReaderProtocol`]/[`crate::protocol::TerminalProtocol`]
//! per call, write-then-poll, each inbound read bounded by
//! [`tokio::time::timeout`] instead of a blocking read deadline.

use std::{
    fmt::Debug,
    time::{Duration, Instant},
};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{
    BaseResult, Error,
    config::POLL_INTERVAL,
    protocol::{ReaderAnswer, ReaderProtocol, Resolution, TerminalAnswer, TerminalProtocol},
};

const READ_CHUNK_SIZE: usize = 64;

/// Async counterpart of [`super::BufClear`] (§4.B). Implemented per
/// backend in [`super::serial`], [`super::tcp`], and [`super::unix`].
pub trait AsyncBufClear: AsyncRead + AsyncWrite + Debug + Send + Unpin {
    async fn clear_input_buffer(&mut self) -> BaseResult<()>;
    async fn clear_output_buffer(&mut self) -> BaseResult<()>;
}

/// Generic async connection over any [`AsyncBufClear`] byte stream.
///
/// Kept generic over `B` rather than boxed as a trait object: async
/// methods in a trait aren't object-safe without an extra adapter crate,
/// and the teacher's own async builder (`src/builder.rs`) returns concrete
/// `BaseContextAsync<AsyncSerialConn>` / `BaseContextAsync<AsyncNetConn>`
/// types for the same reason rather than a `Box<dyn AsyncTransport>`.
#[derive(Debug)]
pub struct ConnectionAsync<B: AsyncBufClear> {
    io: B,
}

impl<B: AsyncBufClear> ConnectionAsync<B> {
    pub fn new(io: B) -> Self {
        Self { io }
    }

    pub fn into_inner(self) -> B {
        self.io
    }

    async fn write_frame(&mut self, frame: &[u8]) -> BaseResult<()> {
        self.io.clear_output_buffer().await?;
        self.io.clear_input_buffer().await?;
        self.io.write_all(frame).await.map_err(|_| Error::IoTransport)?;
        self.io.flush().await.map_err(|_| Error::IoTransport)?;
        Ok(())
    }

    /// Completes the teacher's `transaction_handler` `todo!()`: poll for
    /// inbound chunks, each bounded by `tokio::time::timeout`, feeding them
    /// to `feed` until it resolves or the overall deadline passes.
    async fn poll_until_resolved<A>(
        &mut self,
        deadline_timeout: Duration,
        mut feed: impl FnMut(&[u8]) -> Resolution<A>,
    ) -> BaseResult<A> {
        if deadline_timeout.is_zero() {
            return Err(Error::NoAnswer);
        }
        let deadline = Instant::now() + deadline_timeout;
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Error::NoAnswer);
            }
            match tokio::time::timeout(remaining.min(POLL_INTERVAL), self.io.read(&mut chunk)).await {
                Ok(Ok(0)) => continue,
                Ok(Ok(n)) => {
                    if let Resolution::Done(result) = feed(&chunk[..n]) {
                        return result;
                    }
                }
                Ok(Err(_)) => return Err(Error::IoTransport),
                // Per-chunk timeout: not yet the overall deadline, loop and
                // re-check it.
                Err(_) => continue,
            }
        }
    }

    pub async fn transact_reader(&mut self, addr: u8, code: u8, payload: &[u8]) -> BaseResult<ReaderAnswer> {
        let mut protocol = ReaderProtocol::new();
        let frame = protocol.encode(addr, code, payload);
        self.write_frame(&frame).await?;
        let timeout = protocol.timeout();
        self.poll_until_resolved(timeout, |chunk| protocol.feed(chunk)).await
    }

    pub async fn transact_terminal(&mut self, addr: u8, code: u8, payload: &[u8]) -> BaseResult<TerminalAnswer> {
        let mut protocol = TerminalProtocol::new(addr, code);
        let frame = protocol.encode(payload);
        self.write_frame(&frame).await?;
        let timeout = protocol.timeout();
        self.poll_until_resolved(timeout, |chunk| protocol.feed(chunk)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framing::reader as rf;

    impl AsyncBufClear for tokio::io::DuplexStream {
        async fn clear_input_buffer(&mut self) -> BaseResult<()> {
            Ok(())
        }

        async fn clear_output_buffer(&mut self) -> BaseResult<()> {
            Ok(())
        }
    }

    /// Drives a real `ConnectionAsync` over an in-memory duplex pipe: the
    /// peer end replies with a well-formed reader frame and the connection
    /// must resolve it through the actual framing/CRC decoder, not a stub.
    #[tokio::test]
    async fn transact_reader_resolves_a_reply_written_by_the_peer() {
        let (local, mut peer) = tokio::io::duplex(256);
        let mut conn = ConnectionAsync::new(local);

        let responder = tokio::spawn(async move {
            use tokio::io::{AsyncReadExt, AsyncWriteExt};
            let mut scratch = [0u8; 64];
            let _ = peer.read(&mut scratch).await.unwrap();
            let frame = rf::encode(0x00, 0x10, &[9, 9]);
            peer.write_all(&frame).await.unwrap();
        });

        let answer = conn.transact_reader(0x00, 0x10, &[1, 2, 3]).await.unwrap();
        assert_eq!(answer.code, 0x10);
        assert_eq!(answer.data, vec![9, 9]);
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn transact_reader_times_out_when_nothing_arrives() {
        let (local, _peer) = tokio::io::duplex(256);
        let mut conn = ConnectionAsync::new(local);
        let result = conn
            .poll_until_resolved(Duration::from_millis(20), |_: &[u8]| Resolution::<()>::Pending)
            .await;
        assert!(matches!(result, Err(Error::NoAnswer)));
    }
}
