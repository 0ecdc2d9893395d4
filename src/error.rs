use std::time::Duration;

use thiserror::Error;

use crate::engine::PlayerId;
use crate::sandbox::ChannelError;

/// Why a match ended without a result.
#[derive(Debug, Error)]
pub enum MatchError {
    #[error("{player}: setup failed: {source}")]
    Setup {
        player: PlayerId,
        #[source]
        source: ChannelError,
    },
    #[error("{player}: handshake failed: {reason}")]
    Handshake { player: PlayerId, reason: String },
    #[error("{player}: no move within {timeout:?} at tick {tick}")]
    TurnTimeout {
        player: PlayerId,
        tick: u32,
        timeout: Duration,
    },
    #[error("{player}: protocol error at tick {tick}: {reason}")]
    Protocol {
        player: PlayerId,
        tick: u32,
        reason: String,
    },
    #[error("match cancelled")]
    Cancelled,
}

impl MatchError {
    /// The side responsible for the failure.
    pub fn culprit(&self) -> Option<PlayerId> {
        match self {
            MatchError::Setup { player, .. }
            | MatchError::Handshake { player, .. }
            | MatchError::TurnTimeout { player, .. }
            | MatchError::Protocol { player, .. } => Some(*player),
            MatchError::Cancelled => None,
        }
    }

    /// Short machine-readable name, used in reports.
    pub fn kind(&self) -> &'static str {
        match self {
            MatchError::Setup { .. } => "setup",
            MatchError::Handshake { .. } => "handshake",
            MatchError::TurnTimeout { .. } => "timeout",
            MatchError::Protocol { .. } => "protocol",
            MatchError::Cancelled => "cancelled",
        }
    }
}
