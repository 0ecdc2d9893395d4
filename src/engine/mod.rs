//! The deterministic match simulation.
//!
//! [`MatchState`] exclusively owns the board, the live bots, the banks and the energy pads.
//! Everything else in the crate only reads it (see [`MatchState::project`]) or hands it a
//! player's [`PlayerMoves`](crate::protocol::PlayerMoves) through [`MatchState::apply_moves`].
//!
//! A match alternates strictly between the two players: the tick counter starts at 1, player
//! A acts on odd ticks and player B on even ticks.

mod ability;
mod board;
mod bot;
mod frame;
mod rules;
mod structures;
mod view;

pub use ability::{Ability, Direction, Verb};
pub use board::{Board, Point, Tile};
pub use bot::{Bot, BotRegistry};
pub use frame::Frame;
pub use rules::{MatchState, MatchStateFactory, RuleViolation, Winner};
pub use structures::{pad_cooldown, Bank, BankEvent, Deposit, Lockpick, Pad};
pub use view::{
    AlgaeView, BankView, EnemyBotView, GameSnapshot, HazardStatus, OwnBotView, PadView,
    PermanentEntitiesView, PlayerView, VisibleEntitiesView,
};

use std::fmt::Display;

use serde::{Deserialize, Serialize};

pub const BOARD_WIDTH: i32 = 20;
pub const BOARD_HEIGHT: i32 = 20;

pub const STARTING_SCRAPS: u32 = 100;
/// Energy of a freshly spawned bot, also what an energy pad restores.
pub const SPAWN_ENERGY: f64 = 50.0;
pub const BASE_TRAVERSAL_COST: f64 = 2.0;
/// Live bots allowed per player.
pub const MAX_BOTS: usize = 50;
pub const BOT_ID_SEEDS: [u32; 2] = [100, 200];

pub const SELF_DESTRUCT_RANGE: i32 = 1;
pub const BANK_RANGE: i32 = 1;
pub const SCOUT_RADIUS: i32 = 4;
pub const VISION_RADIUS: i32 = 4;
pub const MAX_ALGAE_HELD: u32 = 5;

pub const DEPOSIT_TICKS: u32 = 10;
pub const LOCKPICK_TICKS: u32 = 5;
/// Number of applied ticks after which the higher banked score wins.
pub const MAX_TICKS: u32 = 1000;

pub const ALGAE_PROBABILITY: f64 = 0.20;
pub const POISON_PROBABILITY: f64 = 0.25;

/// One of the two sides of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PlayerId {
    A,
    B,
}

impl PlayerId {
    pub const ALL: [PlayerId; 2] = [PlayerId::A, PlayerId::B];

    pub const fn index(self) -> usize {
        match self {
            PlayerId::A => 0,
            PlayerId::B => 1,
        }
    }

    pub const fn opponent(self) -> PlayerId {
        match self {
            PlayerId::A => PlayerId::B,
            PlayerId::B => PlayerId::A,
        }
    }

    /// The player whose commands are applied at `tick`.
    pub const fn for_tick(tick: u32) -> PlayerId {
        if tick % 2 == 1 {
            PlayerId::A
        } else {
            PlayerId::B
        }
    }

    /// Short label used in match logs.
    pub const fn label(self) -> &'static str {
        match self {
            PlayerId::A => "p1",
            PlayerId::B => "p2",
        }
    }
}

impl Display for PlayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlayerId::A => write!(f, "player A"),
            PlayerId::B => write!(f, "player B"),
        }
    }
}
