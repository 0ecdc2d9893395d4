//! # Ocean Referee
//!
//! A referee for two-player bot matches. Each player is an external program, run as a
//! sandboxed OS process, that exchanges newline-delimited JSON with the referee.
//!
//! It provides:
//! - The deterministic match simulation ([`engine::MatchState`]): a fog-of-war board with
//!   algae to harvest, banks to deposit into (and lockpick), energy pads and self-destructing
//!   bots
//! - The turn orchestrator ([`match_runner::run_match`]) that alternates turns between the
//!   two peers under handshake, per-tick and per-match deadlines
//! - Process sandboxing through Linux cgroups v2 and `taskset` ([`sandbox::ProcessSandbox`])
//! - A batch runner ([`Referee`](crate::server::Referee)) gated by CPU and RAM
//!   [`constraints`]
//!
//! # Documentation Overview
//!
//! - The wire format is described in [`protocol`].
//! - For configuring referee behavior and execution environment, see
//!   [`Configuration`](crate::configuration::Configuration) and [`constraints`].
//! - Other two-player games can be refereed by implementing the [`Game`](game_interface::Game)
//!   and [`GameFactory`](game_interface::GameFactory) traits.
//!
//! # Usage Example
//!
//! ```no_run
//! use std::time::Duration;
//! use ocean_referee::prelude::*;
//!
//! fn main() -> anyhow::Result<()> {
//!     let constraints = ConstraintsBuilder::new()
//!         .with_ram_per_peer(500) // in MB
//!         .with_tick_timeout(Duration::from_millis(200))
//!         .build()?;
//!
//!     // allow running without cgroup v2 or taskset
//!     let config = Configuration::new().with_allow_uncontained(true);
//!     let factory = MatchStateFactory { mirror_player_b: config.mirror_player_b() };
//!     let referee = Referee::<MatchState, _>::new(factory, config, constraints)?;
//!
//!     let job = MatchJob::new(
//!         "demo",
//!         PeerSpec::new("alice", "./alice"),
//!         PeerSpec::new("bob", "python3").with_args(["bob.py"]),
//!     );
//!     let report = referee.run(&job);
//!     println!("{report}");
//!     Ok(())
//! }
//! ```
//!
//! ## Peer Requirements
//!
//! - Print `__READY_V1__` on stdout once started
//! - For every line received on stdin (a player view), answer with exactly one line of moves
//!   within the tick timeout
//! - Anything written to stderr ends up in the match log

pub mod cancellation;
mod cgroup_manager;
pub mod configuration;
pub mod constraints;
pub mod engine;
pub mod error;
pub mod game_interface;
pub mod logger;
pub mod match_job;
pub mod match_runner;
pub mod peer;
pub mod protocol;
pub mod sandbox;
pub mod server;

pub use anyhow;

/// Commonly used types and traits for quick access.
///
/// ```rust
/// use ocean_referee::prelude::*;
/// ```
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::configuration::Configuration;
    pub use crate::constraints::{Constraints, ConstraintsBuilder};
    pub use crate::engine::{MatchState, MatchStateFactory, PlayerId, Winner};
    pub use crate::error::MatchError;
    pub use crate::game_interface::{Game, GameFactory};
    pub use crate::match_job::MatchJob;
    pub use crate::match_runner::{run_match, MatchOutcome, MatchSettings};
    pub use crate::peer::PeerSpec;
    pub use crate::sandbox::{ProcessSandbox, SandboxChannel};
    pub use crate::server::{MatchReport, Referee};
}
