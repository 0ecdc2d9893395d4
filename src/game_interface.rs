//! Traits a game implements to be refereed

use serde::{de::DeserializeOwned, Serialize};

use crate::engine::{PlayerId, Winner};
use crate::logger::MatchLog;

/// A two-player, strictly alternating game.
pub trait Game {
    /// What the current player is sent at the start of its turn.
    type View: Serialize;
    /// What the current player answers with.
    type Moves: DeserializeOwned + Serialize;
    /// Full state written to the match log after every tick.
    type Snapshot: Serialize;

    fn tick(&self) -> u32;

    /// The player whose moves are applied at the current tick.
    fn current_player(&self) -> PlayerId;

    fn view_for(&self, player: PlayerId) -> Self::View;

    /// Applies the current player's moves. Invalid individual moves are logged, not fatal.
    fn apply(&mut self, moves: &Self::Moves, log: &dyn MatchLog);

    /// Runs end-of-tick effects and moves to the next tick.
    fn advance(&mut self, log: &dyn MatchLog);

    /// The result, once the game has one. Never changes after it is first returned.
    fn decide_winner(&mut self) -> Option<Winner>;

    /// Permanent score of each player, indexed by [`PlayerId::index`].
    fn scores(&self) -> [u32; 2];

    fn snapshot(&self) -> Self::Snapshot;

    /// Tick the peer claims to be answering, if its moves carry one.
    fn claimed_tick(_moves: &Self::Moves) -> Option<u32> {
        None
    }
}

/// What will be given to the referee to allow it to create games
pub trait GameFactory<G: Game> {
    /// Returns an initialized game for the board `seed`
    fn new_game(&self, seed: u64) -> G;
}
