//! Running refereed matches between peer programs.
//!
//! The [`Referee`] type turns [`MatchJob`]s into [`MatchReport`]s. For every match it:
//!
//! - Creates a game from its [`GameFactory`] and a board seed (fixed by
//!   [`Configuration`] or drawn at random and logged)
//! - Launches both peers as [`ProcessSandbox`]es limited by their share of the
//!   [`Constraints`]
//! - Opens the per-match JSON-lines log when a log directory is configured
//! - Plays the match with [`run_match`]
//!
//! [`Referee::run_all`] runs matches concurrently, only starting a match once both of its
//! peers fit in the remaining CPU and RAM budget.
//!
//! ## Uncontained Mode
//!
//! If `config.allow_uncontained = true`, peers still run when Linux cgroups v2 or `taskset`
//! are missing. In this case **only time constraints are enforced**.

use std::collections::VecDeque;
use std::fmt::Display;
use std::marker::PhantomData;
use std::sync::mpsc;
use std::thread;

use serde_json::{json, Value};
use tracing::{info, instrument, trace, warn};

use crate::cancellation::CancellationToken;
use crate::configuration::Configuration;
use crate::constraints::Constraints;
use crate::engine::{PlayerId, Winner};
use crate::error::MatchError;
use crate::game_interface::{Game, GameFactory};
use crate::logger::{init_logger, JsonLinesLogger, LogKind, MatchLog, NullLog};
use crate::match_job::MatchJob;
use crate::match_runner::{run_match, MatchOutcome, MatchSettings};
use crate::sandbox::{ProcessSandbox, SandboxLimits};

/// Result of one [`MatchJob`].
#[derive(Debug)]
pub struct MatchReport {
    pub job: MatchJob,
    pub seed: u64,
    pub result: Result<MatchOutcome, MatchError>,
}

impl MatchReport {
    /// Name of the winning peer, `None` for a draw or a failed match.
    pub fn winner_name(&self) -> Option<&str> {
        match &self.result {
            Ok(MatchOutcome {
                winner: Winner::Player(p),
                ..
            }) => Some(&self.job.player(*p).name),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        let result = match &self.result {
            Ok(outcome) => json!({
                "winner": self.winner_name().unwrap_or("draw"),
                "ticks_played": outcome.ticks_played,
                "scores": outcome.scores,
                "by_timeout": outcome.by_timeout,
            }),
            Err(e) => json!({
                "error": e.kind(),
                "culprit": e.culprit().map(|p| self.job.player(p).name.clone()),
                "message": e.to_string(),
            }),
        };
        json!({
            "id": self.job.id,
            "players": [self.job.players[0].name, self.job.players[1].name],
            "seed": self.seed,
            "result": result,
        })
    }
}

impl Display for MatchReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.result {
            Ok(outcome) => {
                let winner = match self.winner_name() {
                    Some(name) => name.to_owned(),
                    None if outcome.by_timeout => "draw (timeout)".to_owned(),
                    None => "draw".to_owned(),
                };
                write!(
                    f,
                    "{}: {}-{} after {} ticks, {winner}",
                    self.job, outcome.scores[0], outcome.scores[1], outcome.ticks_played
                )
            }
            Err(e) => write!(f, "{}: {e}", self.job),
        }
    }
}

/// Referees matches of `G` between peer processes.
///
/// # Type Parameters
/// - `G`: The game type implementing [`Game`]
/// - `F`: A factory implementing [`GameFactory<G>`]
pub struct Referee<G: Game, F: GameFactory<G>> {
    factory: F,
    config: Configuration,
    constraints: Constraints,
    _game: PhantomData<fn() -> G>,
}

impl<G: Game, F: GameFactory<G> + Sync> Referee<G, F> {
    /// Create a [`Referee`] with given [`Constraints`] and [`GameFactory`]
    ///
    /// # Errors
    ///
    /// Fails when file logging is enabled but the tracing subscriber cannot be installed.
    #[instrument(skip_all)]
    pub fn new(
        factory: F,
        config: Configuration,
        constraints: Constraints,
    ) -> anyhow::Result<Referee<G, F>> {
        if config.log {
            let dir = config
                .log_dir
                .clone()
                .unwrap_or_else(|| std::path::PathBuf::from("."));
            init_logger(&dir)?;
        }
        trace!(?config, ?constraints);

        Ok(Referee {
            factory,
            config,
            constraints,
            _game: PhantomData,
        })
    }

    /// Plays one match with the whole resource budget available to it.
    pub fn run(&self, job: &MatchJob) -> MatchReport {
        let mut pool = self.constraints.clone();
        let slots = take_slots(&mut pool)
            .unwrap_or_else(|| [self.constraints.clone(), self.constraints.clone()]);
        self.run_with(job, &slots)
    }

    /// Plays every job, as many at once as the resource budget allows.
    ///
    /// Reports come back in completion order.
    pub fn run_all(&self, jobs: Vec<MatchJob>) -> Vec<MatchReport> {
        let total = jobs.len();
        let mut pending: VecDeque<MatchJob> = jobs.into();
        let mut pool = self.constraints.clone();
        let mut reports = Vec::with_capacity(total);
        let (tx_result, rx_result) = mpsc::channel();

        thread::scope(|s| {
            let mut running = 0usize;
            while reports.len() < total {
                while !pending.is_empty() {
                    let Some(slots) = take_slots(&mut pool) else {
                        break;
                    };
                    let Some(job) = pending.pop_front() else {
                        break;
                    };
                    running += 1;
                    let tx = tx_result.clone();
                    s.spawn(move || {
                        let report = self.run_with(&job, &slots);
                        let _ = tx.send((report, slots));
                    });
                }

                if running == 0 {
                    // the budget cannot host even one match: run it alone
                    match pending.pop_front() {
                        Some(job) => reports.push(self.run(&job)),
                        None => break,
                    }
                    continue;
                }

                match rx_result.recv() {
                    Ok((report, slots)) => {
                        running -= 1;
                        for slot in slots {
                            pool.add(slot);
                        }
                        reports.push(report);
                    }
                    Err(_) => break,
                }
            }
        });
        reports
    }

    #[instrument(skip_all, fields(job = %job.id))]
    fn run_with(&self, job: &MatchJob, slots: &[Constraints; 2]) -> MatchReport {
        let seed = self.config.seed.unwrap_or_else(rand::random);
        info!(seed, "starting {job}");
        let mut game = self.factory.new_game(seed);
        let log = self.open_log(job);
        log.log(
            LogKind::Debug,
            vec![
                json!("match"),
                json!(job.id),
                json!([job.players[0].name, job.players[1].name]),
                json!({ "seed": seed }),
            ],
        );

        let [mut a, mut b] = PlayerId::ALL.map(|p| self.sandbox(job, p, &slots[p.index()]));
        let settings = MatchSettings::from_constraints(&self.constraints, &self.config.ready_token);
        let cancel = CancellationToken::new();
        let result = run_match(&mut game, [&mut a, &mut b], &settings, log.as_ref(), &cancel);

        let report = MatchReport {
            job: job.clone(),
            seed,
            result,
        };
        if self.config.verbose {
            print_report(&report);
        }
        report
    }

    fn sandbox(&self, job: &MatchJob, player: PlayerId, slot: &Constraints) -> ProcessSandbox {
        let spec = job.player(player);
        ProcessSandbox::new(
            format!("{}-{}", spec.name, player.label()),
            spec.command.clone(),
            spec.args.clone(),
        )
        .with_limits(SandboxLimits {
            max_memory: i64::try_from(slot.total_ram).unwrap_or(i64::MAX),
            cpus: slot.cpu_list(),
        })
        .with_allow_uncontained(self.config.allow_uncontained)
        .with_echo_stderr(self.config.debug_peer_stderr)
    }

    fn open_log(&self, job: &MatchJob) -> Box<dyn MatchLog> {
        let Some(dir) = &self.config.log_dir else {
            return Box::new(NullLog);
        };
        match JsonLinesLogger::create(&job.log_path(dir)) {
            Ok(logger) => Box::new(logger),
            Err(e) => {
                warn!("match log disabled: {e:#}");
                Box::new(NullLog)
            }
        }
    }
}

/// Takes one peer's share of `pool` for each player, or nothing.
fn take_slots(pool: &mut Constraints) -> Option<[Constraints; 2]> {
    let a = pool.try_take_peer()?;
    match pool.try_take_peer() {
        Some(b) => Some([a, b]),
        None => {
            pool.add(a);
            None
        }
    }
}

fn print_report(report: &MatchReport) {
    // clear line, green match, red errors, start of line
    match &report.result {
        Ok(_) => println!("\x1b[2K\x1b[32m{report}\x1b[39m\x1b[0G"),
        Err(_) => println!("\x1b[2K\x1b[31m{report}\x1b[39m\x1b[0G"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::ConstraintsBuilder;
    use crate::peer::PeerSpec;

    #[test]
    fn slots_are_all_or_nothing() {
        let mut pool = ConstraintsBuilder::new()
            .with_max_total_ram(300)
            .with_ram_per_peer(100)
            .with_cpu_list("0-2")
            .build()
            .unwrap();
        assert!(take_slots(&mut pool).is_some());
        assert!(take_slots(&mut pool).is_none());
        assert_eq!(pool.cpu_list(), "2");
    }

    #[test]
    fn report_names_the_culprit() {
        let job = MatchJob::new("m1", PeerSpec::new("alice", "a"), PeerSpec::new("bob", "b"));
        let report = MatchReport {
            job,
            seed: 9,
            result: Err(MatchError::Handshake {
                player: PlayerId::B,
                reason: "no token".into(),
            }),
        };
        let json = report.to_json();
        assert_eq!(json["result"]["culprit"], "bob");
        assert_eq!(json["result"]["error"], "handshake");
        assert_eq!(report.winner_name(), None);
    }
}
