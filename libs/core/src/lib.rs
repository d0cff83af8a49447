//! Courier Core - wire primitives shared by client and server
//!
//! Holds the error type, the `Request`/`Response` messages with their
//! byte-exact encoding, and the length-prefixed frame reader/writer.
//! Nothing in here opens a socket.

pub mod error;
pub mod frame;
pub mod message;

pub use error::{CodecKind, Error, Result};
pub use frame::{read_frame, write_frame, MAX_FRAME_SIZE, PREFIX_LEN};
pub use message::{Request, Response, META_DEADLINE, META_ONEWAY, PROTOCOL_VERSION};
