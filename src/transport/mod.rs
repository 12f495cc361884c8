//! Transport abstraction: a uniform byte-stream contract over serial, TCP,
//! UNIX-domain, and an in-process simulator (§4.B).
//!
//! **Realisation note.** The original C++ exposes transports as a
//! callback/listener object graph (`IOProvider::send`/`listen`/
//! `set_timeout` plus a separate one-shot `Protocol` wired in via
//! `boost::signals2`) because Boost.Asio's reactor model requires it. That
//! object graph has no counterpart in the teacher crate or the rest of the
//! corpus: the teacher's own `src/transport.rs` already collapses "write a
//! command, block until a complete answer or a deadline" into one
//! synchronous [`Connection::transact_reader`]-style method over a blocking
//! `Read + Write` sink. This crate keeps that realisation and generalises it
//! from the teacher's ASCII/terminator framing to the binary reader/terminal
//! framing in [`crate::framing`], instead of reintroducing a
//! callback/listener/resolver object graph nothing else in the pack uses.
//! The invariants that graph existed to uphold — write-complete precedes the
//! first inbound read, exactly one resolution, idempotent cancellation
//! (§5) — all hold for a sequential blocking call without needing separate
//! objects for each.

#[cfg(feature = "async")]
pub mod async_conn;
pub mod serial;
pub mod simulator;
pub mod tcp;
#[cfg(unix)]
pub mod unix;

use std::{
    fmt::Debug,
    io::{ErrorKind, Read, Write},
    time::{Duration, Instant},
};

use tracing::instrument;

use crate::{
    BaseResult, Error,
    config::POLL_INTERVAL,
    protocol::{ReaderAnswer, ReaderProtocol, Resolution, TerminalAnswer, TerminalProtocol},
};

const READ_CHUNK_SIZE: usize = 64;

/// Unifies the blocking I/O handles usable as a [`Connection`] backend.
/// Grounded on the teacher's `src/transport.rs` `BufClear` trait, extended
/// to every backend this crate supports.
pub trait BufClear: Read + Write + Debug + Send {
    fn clear_input_buffer(&mut self) -> BaseResult<()>;
    fn clear_output_buffer(&mut self) -> BaseResult<()>;
}

/// Optional persistence capability a transport may additionally implement
/// (§4.D's `save`/`load` escape hatch; §4.F for the simulator's use of it).
pub trait Persistence {
    fn load(&mut self, path: &str) -> BaseResult<()>;
    fn save(&mut self, path: &str) -> BaseResult<()>;
}

/// The uniform contract the reader façade drives: bind a fresh protocol
/// instance to the transport for exactly one command (§4.B, §9 "Polymorphic
/// transports"). A tagged variant over concrete transports, expressed here
/// as a trait object, rather than a generic parameter threaded through
/// [`crate::reader::Reader`] — callers pick a transport at runtime from a
/// string tag (§6), so static monomorphisation would just relocate the
/// dynamic dispatch to a match statement.
pub trait Transact: Debug + Send {
    fn transact_reader(&mut self, addr: u8, code: u8, payload: &[u8]) -> BaseResult<ReaderAnswer>;
    fn transact_terminal(&mut self, addr: u8, code: u8, payload: &[u8]) -> BaseResult<TerminalAnswer>;

    /// `Some` only for transports implementing [`Persistence`] (currently
    /// just [`simulator::SimulatorTransport`]); see §4.D.
    fn as_persistence(&mut self) -> Option<&mut dyn Persistence> {
        None
    }
}

/// Generic blocking connection over any [`BufClear`] byte stream. Drives a
/// fresh [`ReaderProtocol`]/[`TerminalProtocol`] per call: write the frame,
/// then poll for inbound chunks until the protocol resolves or its timeout
/// elapses (§4.B "Scheduling model", §5). Grounded on the teacher's
/// `Connection<B>` (`src/transport.rs`): same `BytesMut`-free chunked-read
/// idiom, generalised from recognising a `\r\n` terminator to recognising a
/// complete framed packet.
#[derive(Debug)]
pub struct Connection<B: BufClear> {
    io: B,
}

impl<B: BufClear> Connection<B> {
    pub fn new(io: B) -> Self {
        Self { io }
    }

    pub fn into_inner(self) -> B {
        self.io
    }

    fn write_frame(&mut self, frame: &[u8]) -> BaseResult<()> {
        self.io.clear_output_buffer()?;
        self.io.clear_input_buffer()?;
        self.io.write_all(frame).map_err(|_| Error::IoTransport)?;
        self.io.flush().map_err(|_| Error::IoTransport)?;
        Ok(())
    }

    /// Drives any one-shot protocol's `feed` loop to resolution. The write
    /// that happens in the caller strictly precedes the first inbound read
    /// here (§4.B/§5 ordering invariant) because this method is only ever
    /// called after [`Connection::write_frame`] returns.
    fn poll_until_resolved<A>(
        &mut self,
        timeout: Duration,
        mut feed: impl FnMut(&[u8]) -> Resolution<A>,
    ) -> BaseResult<A> {
        if timeout.is_zero() {
            return Err(Error::NoAnswer);
        }
        let deadline = Instant::now() + timeout;
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Error::NoAnswer);
            }
            match self.io.read(&mut chunk) {
                Ok(0) => std::thread::sleep(POLL_INTERVAL.min(remaining)),
                Ok(n) => {
                    if let Resolution::Done(result) = feed(&chunk[..n]) {
                        return result;
                    }
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                    std::thread::sleep(POLL_INTERVAL.min(remaining));
                }
                Err(_) => return Err(Error::IoTransport),
            }
        }
    }
}

impl<B: BufClear> Transact for Connection<B> {
    #[instrument(level = "debug", skip(self, payload), fields(payload_len = payload.len()))]
    fn transact_reader(&mut self, addr: u8, code: u8, payload: &[u8]) -> BaseResult<ReaderAnswer> {
        let mut protocol = ReaderProtocol::new();
        let frame = protocol.encode(addr, code, payload);
        self.write_frame(&frame)?;
        let timeout = protocol.timeout();
        self.poll_until_resolved(timeout, |chunk| protocol.feed(chunk))
    }

    #[instrument(level = "debug", skip(self, payload), fields(payload_len = payload.len()))]
    fn transact_terminal(&mut self, addr: u8, code: u8, payload: &[u8]) -> BaseResult<TerminalAnswer> {
        let mut protocol = TerminalProtocol::new(addr, code);
        let frame = protocol.encode(payload);
        self.write_frame(&frame)?;
        let timeout = protocol.timeout();
        self.poll_until_resolved(timeout, |chunk| protocol.feed(chunk))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A transport that never delivers a byte, for exercising the deadline
    /// path of `poll_until_resolved` (§8 scenario 5).
    #[derive(Debug)]
    struct Silent;

    impl Read for Silent {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Ok(0)
        }
    }

    impl Write for Silent {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl BufClear for Silent {
        fn clear_input_buffer(&mut self) -> BaseResult<()> {
            Ok(())
        }

        fn clear_output_buffer(&mut self) -> BaseResult<()> {
            Ok(())
        }
    }

    #[test]
    fn transact_reader_resolves_to_no_answer_when_nothing_arrives_before_the_deadline() {
        let mut conn = Connection::new(Silent);
        let result = conn.poll_until_resolved(Duration::from_millis(10), |_: &[u8]| Resolution::<()>::Pending);
        assert!(matches!(result, Err(Error::NoAnswer)));
    }

    #[test]
    fn poll_until_resolved_rejects_a_zero_timeout_immediately() {
        let mut conn = Connection::new(Silent);
        let result = conn.poll_until_resolved(Duration::ZERO, |_: &[u8]| Resolution::<()>::Pending);
        assert!(matches!(result, Err(Error::NoAnswer)));
    }
}
