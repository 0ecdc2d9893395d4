//! Newline-delimited JSON messages exchanged with a peer.
//!
//! - Peer -> referee, once at startup: the readiness token [`READY_TOKEN`]
//! - Referee -> peer, every turn of that peer: a [`PlayerView`](crate::engine::PlayerView)
//! - Peer -> referee, in reply: a [`PlayerMoves`]
//!
//! Every message occupies exactly one line.

use std::{collections::BTreeMap, time::Duration};

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::engine::{Ability, Direction, Point, Verb};
use crate::sandbox::{ChannelError, SandboxChannel};

/// Readiness token a peer prints before any turn message.
pub const READY_TOKEN: &str = "__READY_V1__";

/// One player's commands for one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerMoves {
    /// Tick the peer believes it is answering. Informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tick: Option<u32>,
    /// Spawn requests keyed by proposed bot id.
    #[serde(default)]
    pub spawns: BTreeMap<u32, SpawnCmd>,
    /// Action requests keyed by existing bot id.
    #[serde(default)]
    pub actions: BTreeMap<u32, ActionCmd>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnCmd {
    #[serde(default)]
    pub abilities: Vec<Ability>,
    pub location: Point,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionCmd {
    #[serde(default)]
    pub action: Verb,
    #[serde(default)]
    pub direction: Direction,
}

impl PlayerMoves {
    pub fn is_empty(&self) -> bool {
        self.spawns.is_empty() && self.actions.is_empty()
    }
}

/// True if `line` is the readiness token, either bare or as a JSON string literal.
pub fn is_ready_token(line: &str, token: &str) -> bool {
    let line = line.trim();
    match serde_json::from_str::<String>(line) {
        Ok(decoded) => decoded.trim() == token,
        Err(_) => line == token,
    }
}

pub fn encode_line<T: Serialize>(message: &T) -> Result<String, ChannelError> {
    Ok(serde_json::to_string(message)?)
}

pub fn decode_line<T: DeserializeOwned>(line: &str) -> Result<T, ChannelError> {
    Ok(serde_json::from_str(line.trim())?)
}

/// Serializes `message` and writes it to the peer as one line.
pub fn send_message<T: Serialize>(
    channel: &dyn SandboxChannel,
    message: &T,
) -> Result<(), ChannelError> {
    channel.send(&encode_line(message)?)
}

/// Reads one line from the peer's output and decodes it.
pub fn recv_message<T: DeserializeOwned>(
    channel: &dyn SandboxChannel,
    timeout: Duration,
) -> Result<T, ChannelError> {
    decode_line(&channel.recv_output(timeout)?)
}
