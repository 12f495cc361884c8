//! Wire framing: byte-stuffing, packet headers, and checksums for both the
//! reader protocol and the terminal protocol (§3-§4).

pub mod crc16;
pub mod reader;
pub mod terminal;
