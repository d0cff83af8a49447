//! The fabric shares the core error type so that wire-level and
//! call-level failures travel through one `Result`.

pub use courier_core::error::{CodecKind, Error, Result};
