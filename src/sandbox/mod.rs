//! Isolated peer processes, seen as line-oriented channels.

mod process;

pub use process::{ProcessSandbox, SandboxLimits};

use std::time::Duration;

use thiserror::Error;

/// Longest line accepted from a peer, newline excluded.
pub const MAX_LINE_BYTES: usize = 1 << 20;
/// Lines buffered per peer stream before the peer is made to wait.
pub const LINE_QUEUE_CAPACITY: usize = 64;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("could not start peer: {0:#}")]
    Start(anyhow::Error),
    #[error("timed out")]
    Timeout,
    #[error("peer closed its stream")]
    Closed,
    #[error("peer is not running")]
    NotStarted,
    #[error("peer line longer than {limit} bytes")]
    LineTooLong { limit: usize },
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed message: {0}")]
    Decode(#[from] serde_json::Error),
}

/// One sandboxed peer. Lines are exchanged without their trailing newline.
///
/// Every method except [`SandboxChannel::start`] takes `&self` so that the turn loop and the
/// stderr drain can share a channel across threads.
pub trait SandboxChannel: Send + Sync {
    /// Launches the peer.
    fn start(&mut self) -> Result<(), ChannelError>;

    /// Queues one line for the peer's stdin.
    fn send(&self, line: &str) -> Result<(), ChannelError>;

    /// Waits at most `timeout` for the next line of the peer's stdout.
    fn recv_output(&self, timeout: Duration) -> Result<String, ChannelError>;

    /// Waits at most `timeout` for the next line of the peer's stderr.
    fn recv_error(&self, timeout: Duration) -> Result<String, ChannelError>;

    /// Kills the peer and releases its pipes. Calling it again is a no-op.
    fn destroy(&self) -> Result<(), ChannelError>;
}
