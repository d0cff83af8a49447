use crate::error::Result;

pub mod tcp;

pub use self::tcp::{TcpTransport, TcpTransportBuilder, TcpTransportListener};

/// Transport trait for moving whole frames
///
/// Each transport instance represents a single connection. Frames are
/// already prefixed with their header and body lengths.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Send one encoded frame
    async fn send(&mut self, frame: &[u8]) -> Result<()>;

    /// Receive exactly one frame, prefix included
    async fn receive(&mut self) -> Result<Vec<u8>>;

    /// Close the transport connection
    async fn close(&mut self) -> Result<()>;
}
