//! Drives one match between two sandboxed peers.
//!
//! ```text
//! start both peers ─► handshake A, B ─► ┌► winner? ─► project ─► send ─► await moves ┐
//!                                       └── log VIEW ◄── advance ◄── apply ◄────────┘
//! ```
//!
//! Each peer's stderr is drained on its own scoped thread for the whole match. Both peers are
//! destroyed on every exit path before [`run_match`] returns.

use std::{
    thread,
    time::{Duration, Instant},
};

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

use crate::cancellation::CancellationToken;
use crate::constraints::Constraints;
use crate::engine::{PlayerId, Winner};
use crate::error::MatchError;
use crate::game_interface::Game;
use crate::logger::{LogKind, MatchLog};
use crate::protocol::{decode_line, is_ready_token, send_message, READY_TOKEN};
use crate::sandbox::{ChannelError, SandboxChannel};

/// Longest single blocking wait, so cancellation is noticed quickly.
const POLL_SLICE: Duration = Duration::from_millis(50);

/// Timing of one match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchSettings {
    pub handshake_timeout: Duration,
    pub tick_timeout: Duration,
    /// Wall-clock ceiling for the whole match.
    pub match_timeout: Duration,
    pub ready_token: String,
}

impl MatchSettings {
    pub fn from_constraints(constraints: &Constraints, ready_token: &str) -> Self {
        MatchSettings {
            handshake_timeout: constraints.handshake_timeout(),
            tick_timeout: constraints.tick_timeout(),
            match_timeout: constraints.match_timeout(),
            ready_token: ready_token.to_owned(),
        }
    }
}

impl Default for MatchSettings {
    fn default() -> Self {
        MatchSettings {
            handshake_timeout: crate::constraints::DEFAULT_HANDSHAKE_TIMEOUT,
            tick_timeout: crate::constraints::DEFAULT_TICK_TIMEOUT,
            match_timeout: crate::constraints::DEFAULT_MATCH_TIMEOUT,
            ready_token: READY_TOKEN.to_owned(),
        }
    }
}

/// How a match that ran to completion ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MatchOutcome {
    pub winner: Winner,
    pub ticks_played: u32,
    pub scores: [u32; 2],
    /// Draw forced by the match ceiling.
    pub by_timeout: bool,
}

enum WaitError {
    Timeout,
    Cancelled,
    Channel(ChannelError),
}

/// Plays `game` to completion with `channels[0]` as player A and `channels[1]` as player B.
///
/// # Errors
///
/// Any failure other than a rejected command ends the match and names the peer
/// responsible, see [`MatchError`].
#[instrument(skip_all)]
pub fn run_match<G: Game>(
    game: &mut G,
    channels: [&mut dyn SandboxChannel; 2],
    settings: &MatchSettings,
    log: &dyn MatchLog,
    cancel: &CancellationToken,
) -> Result<MatchOutcome, MatchError> {
    let [a, b] = channels;
    let started = start_peer(PlayerId::A, &mut *a).and_then(|()| start_peer(PlayerId::B, &mut *b));
    let channels: [&dyn SandboxChannel; 2] = [&*a, &*b];

    let result = started.and_then(|()| {
        let scope = cancel.child();
        thread::scope(|s| {
            for (player, channel) in PlayerId::ALL.into_iter().zip(channels) {
                let token = scope.clone();
                s.spawn(move || drain_errors(player, channel, log, &token));
            }
            let res = play(game, channels, settings, log, &scope);
            scope.cancel();
            res
        })
    });

    if let Err(e) = &result {
        warn!("match aborted: {e}");
        log.log(
            LogKind::Error,
            vec![
                json!(e.kind()),
                json!(e.culprit().map(PlayerId::label)),
                json!(e.to_string()),
            ],
        );
    }
    for (player, channel) in PlayerId::ALL.into_iter().zip(channels) {
        if let Err(e) = channel.destroy() {
            warn!("could not destroy {player}: {e}");
            log.log_text(LogKind::Error, &format!("{}: destroy failed: {e}", player.label()));
        }
    }
    result
}

fn start_peer(player: PlayerId, channel: &mut dyn SandboxChannel) -> Result<(), MatchError> {
    channel
        .start()
        .map_err(|source| MatchError::Setup { player, source })
}

/// Logs every non-empty stderr line of `channel` until cancelled or the stream closes.
fn drain_errors(
    player: PlayerId,
    channel: &dyn SandboxChannel,
    log: &dyn MatchLog,
    cancel: &CancellationToken,
) {
    while !cancel.is_cancelled() {
        match channel.recv_error(POLL_SLICE) {
            Ok(line) if line.trim().is_empty() => {}
            Ok(line) => log.log(
                LogKind::Warn,
                vec![json!(player.label()), json!("stderr"), json!(line)],
            ),
            Err(ChannelError::Timeout) => {}
            Err(e @ ChannelError::LineTooLong { .. }) => {
                log.log(
                    LogKind::Warn,
                    vec![json!(player.label()), json!("stderr"), json!(e.to_string())],
                );
                break;
            }
            Err(e) => {
                debug!("{player}: stderr drain stopped: {e}");
                break;
            }
        }
    }
}

/// Next non-blank stdout line, waiting at most until `deadline` (`None` waits forever).
fn recv_until(
    channel: &dyn SandboxChannel,
    deadline: Option<Instant>,
    cancel: &CancellationToken,
) -> Result<String, WaitError> {
    loop {
        if cancel.is_cancelled() {
            return Err(WaitError::Cancelled);
        }
        let slice = match deadline {
            Some(deadline) => {
                let left = deadline.saturating_duration_since(Instant::now());
                if left.is_zero() {
                    return Err(WaitError::Timeout);
                }
                left.min(POLL_SLICE)
            }
            None => POLL_SLICE,
        };
        match channel.recv_output(slice) {
            Ok(line) if line.trim().is_empty() => {}
            Ok(line) => return Ok(line),
            Err(ChannelError::Timeout) => {}
            Err(e) => return Err(WaitError::Channel(e)),
        }
    }
}

fn handshake(
    player: PlayerId,
    channel: &dyn SandboxChannel,
    settings: &MatchSettings,
    deadline: Option<Instant>,
    cancel: &CancellationToken,
) -> Result<(), MatchError> {
    let reason = match recv_until(channel, deadline, cancel) {
        Ok(line) if is_ready_token(&line, &settings.ready_token) => return Ok(()),
        Ok(line) => format!("expected {:?}, got {line:?}", settings.ready_token),
        Err(WaitError::Timeout) => format!(
            "no readiness token within {:?}",
            settings.handshake_timeout
        ),
        Err(WaitError::Cancelled) => return Err(MatchError::Cancelled),
        Err(WaitError::Channel(e)) => e.to_string(),
    };
    Err(MatchError::Handshake { player, reason })
}

fn play<G: Game>(
    game: &mut G,
    channels: [&dyn SandboxChannel; 2],
    settings: &MatchSettings,
    log: &dyn MatchLog,
    cancel: &CancellationToken,
) -> Result<MatchOutcome, MatchError> {
    let start = Instant::now();
    let match_deadline = start.checked_add(settings.match_timeout);

    let handshake_deadline = Instant::now().checked_add(settings.handshake_timeout);
    for player in PlayerId::ALL {
        handshake(player, channels[player.index()], settings, handshake_deadline, cancel)?;
        debug!("{player} is ready");
        log.log(LogKind::Debug, vec![json!(player.label()), json!("ready")]);
    }

    let mut ticks_played = 0;
    loop {
        if let Some(winner) = game.decide_winner() {
            return Ok(finish(game, winner, ticks_played, false, log));
        }
        if cancel.is_cancelled() {
            return Err(MatchError::Cancelled);
        }

        let player = game.current_player();
        let tick = game.tick();
        let channel = channels[player.index()];
        let protocol = |reason: String| MatchError::Protocol {
            player,
            tick,
            reason,
        };

        // the turn may not outlive the match
        let turn_deadline = Instant::now().checked_add(settings.tick_timeout);
        let (deadline, ceiling_bound) = match (turn_deadline, match_deadline) {
            (Some(turn), Some(ceiling)) if ceiling <= turn => (Some(ceiling), true),
            (None, Some(ceiling)) => (Some(ceiling), true),
            (turn, _) => (turn, false),
        };
        if ceiling_bound && deadline.is_some_and(|d| d <= Instant::now()) {
            return Ok(finish(game, Winner::Draw, ticks_played, true, log));
        }

        send_message(channel, &game.view_for(player)).map_err(|e| protocol(e.to_string()))?;
        let line = match recv_until(channel, deadline, cancel) {
            Ok(line) => line,
            Err(WaitError::Timeout) if ceiling_bound => {
                return Ok(finish(game, Winner::Draw, ticks_played, true, log));
            }
            Err(WaitError::Timeout) => {
                return Err(MatchError::TurnTimeout {
                    player,
                    tick,
                    timeout: settings.tick_timeout,
                })
            }
            Err(WaitError::Cancelled) => return Err(MatchError::Cancelled),
            Err(WaitError::Channel(e)) => return Err(protocol(e.to_string())),
        };
        let moves: G::Moves = decode_line(&line).map_err(|e| protocol(e.to_string()))?;

        if let Some(claimed) = G::claimed_tick(&moves).filter(|&t| t != tick) {
            warn!("{player} answered tick {claimed} at tick {tick}");
            log.log(
                LogKind::Warn,
                vec![
                    json!(player.label()),
                    json!(format!("answered tick {claimed} at tick {tick}")),
                ],
            );
        }
        log.log(
            LogKind::Move,
            vec![
                json!(player.label()),
                json!(tick),
                serde_json::to_value(&moves).unwrap_or(Value::Null),
            ],
        );

        game.apply(&moves, log);
        game.advance(log);
        ticks_played += 1;
        log.log(
            LogKind::View,
            vec![serde_json::to_value(game.snapshot()).unwrap_or(Value::Null)],
        );
    }
}

fn finish<G: Game>(
    game: &G,
    winner: Winner,
    ticks_played: u32,
    by_timeout: bool,
    log: &dyn MatchLog,
) -> MatchOutcome {
    let outcome = MatchOutcome {
        winner,
        ticks_played,
        scores: game.scores(),
        by_timeout,
    };
    info!(?outcome, "match finished");
    log.log(
        LogKind::Debug,
        vec![json!("finished"), serde_json::to_value(outcome).unwrap_or(Value::Null)],
    );
    outcome
}
