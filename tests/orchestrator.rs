use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use ocean_referee::cancellation::CancellationToken;
use ocean_referee::engine::*;
use ocean_referee::error::MatchError;
use ocean_referee::logger::{LogKind, RecordingLog};
use ocean_referee::match_runner::{run_match, MatchSettings};
use ocean_referee::protocol::READY_TOKEN;
use ocean_referee::sandbox::{ChannelError, SandboxChannel};

/// A peer that answers every view with the next scripted reply. A reply may span lines.
#[derive(Default)]
struct ScriptedPeer {
    fail_start: bool,
    greeting: Option<String>,
    replies: Mutex<VecDeque<String>>,
    /// Used once `replies` runs out; `None` stays silent.
    fallback: Option<String>,
    output: Mutex<VecDeque<String>>,
    errors: Mutex<VecDeque<String>>,
    sent: Mutex<Vec<String>>,
    destroyed: AtomicUsize,
}

impl ScriptedPeer {
    fn ready() -> Self {
        ScriptedPeer {
            greeting: Some(READY_TOKEN.to_owned()),
            ..Default::default()
        }
    }

    fn answering(mut self, reply: &str) -> Self {
        self.fallback = Some(reply.to_owned());
        self
    }

    fn then(self, reply: &str) -> Self {
        self.replies.lock().unwrap().push_back(reply.to_owned());
        self
    }

    fn with_stderr(self, line: &str) -> Self {
        self.errors.lock().unwrap().push_back(line.to_owned());
        self
    }

    fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    fn destroyed(&self) -> usize {
        self.destroyed.load(Ordering::SeqCst)
    }

    fn pop(queue: &Mutex<VecDeque<String>>, timeout: Duration) -> Result<String, ChannelError> {
        if let Some(line) = queue.lock().unwrap().pop_front() {
            return Ok(line);
        }
        thread::sleep(timeout.min(Duration::from_millis(5)));
        Err(ChannelError::Timeout)
    }
}

impl SandboxChannel for ScriptedPeer {
    fn start(&mut self) -> Result<(), ChannelError> {
        if self.fail_start {
            return Err(ChannelError::Start(anyhow::anyhow!("no such program")));
        }
        if let Some(greeting) = self.greeting.take() {
            self.output.lock().unwrap().push_back(greeting);
        }
        Ok(())
    }

    fn send(&self, line: &str) -> Result<(), ChannelError> {
        self.sent.lock().unwrap().push(line.to_owned());
        let reply = self.replies.lock().unwrap().pop_front();
        if let Some(reply) = reply.or_else(|| self.fallback.clone()) {
            let mut output = self.output.lock().unwrap();
            output.extend(reply.split('\n').map(str::to_owned));
        }
        Ok(())
    }

    fn recv_output(&self, timeout: Duration) -> Result<String, ChannelError> {
        Self::pop(&self.output, timeout)
    }

    fn recv_error(&self, timeout: Duration) -> Result<String, ChannelError> {
        Self::pop(&self.errors, timeout)
    }

    fn destroy(&self) -> Result<(), ChannelError> {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn quick_settings() -> MatchSettings {
    MatchSettings {
        handshake_timeout: Duration::from_millis(200),
        tick_timeout: Duration::from_millis(200),
        match_timeout: Duration::from_secs(60),
        ready_token: READY_TOKEN.to_owned(),
    }
}

fn empty_match() -> MatchState {
    MatchState::with_board(Board::empty(BOARD_WIDTH, BOARD_HEIGHT))
}

#[test]
fn idle_peers_play_to_a_draw() {
    let mut a = ScriptedPeer::ready().answering("{}");
    let mut b = ScriptedPeer {
        greeting: Some(format!("\"{READY_TOKEN}\"")),
        ..Default::default()
    }
    .answering(r#"{"spawns":{},"actions":{}}"#);
    let log = RecordingLog::new();
    let mut game = empty_match();

    let outcome = run_match(
        &mut game,
        [&mut a, &mut b],
        &quick_settings(),
        &log,
        &CancellationToken::new(),
    )
    .unwrap();

    assert_eq!(outcome.winner, Winner::Draw);
    assert_eq!(outcome.ticks_played, MAX_TICKS);
    assert!(!outcome.by_timeout);
    assert_eq!(a.sent().len(), 500);
    assert_eq!(b.sent().len(), 500);
    assert_eq!(log.of_kind(LogKind::Move).len(), 1000);
    assert_eq!(log.of_kind(LogKind::View).len(), 1000);
    assert!(log.of_kind(LogKind::Error).is_empty());
    assert_eq!((a.destroyed(), b.destroyed()), (1, 1));

    let first: PlayerView = serde_json::from_str(&a.sent()[0]).unwrap();
    assert_eq!(first.tick, 1);
    assert_eq!(first.bot_id_seed, 100);
    let first: PlayerView = serde_json::from_str(&b.sent()[0]).unwrap();
    assert_eq!(first.tick, 2);
    assert_eq!(first.bot_id_seed, 200);
}

#[test]
fn moves_reach_the_game_in_turn_order() {
    let mut a = ScriptedPeer::ready()
        .then(r#"{"spawns":{"100":{"abilities":[],"location":{"x":1,"y":1}}}}"#)
        .then(r#"{"actions":{"100":{"action":"MOVE","direction":"NORTH"}}}"#);
    let mut b = ScriptedPeer::ready().then("{}");
    let log = RecordingLog::new();
    let mut game = empty_match();

    let err = run_match(
        &mut game,
        [&mut a, &mut b],
        &quick_settings(),
        &log,
        &CancellationToken::new(),
    )
    .unwrap_err();

    assert!(matches!(
        err,
        MatchError::TurnTimeout {
            player: PlayerId::B,
            tick: 4,
            ..
        }
    ));
    assert_eq!(game.tick(), 4);
    assert_eq!(game.bots().get(100).unwrap().location, Point::new(1, 2));
    let third: PlayerView = serde_json::from_str(&a.sent()[1]).unwrap();
    assert_eq!(third.tick, 3);
    assert_eq!(third.bots[&100].location, Point::new(1, 1));
}

#[test]
fn wrong_greeting_fails_the_handshake() {
    let mut a = ScriptedPeer::ready();
    let mut b = ScriptedPeer {
        greeting: Some("hello".to_owned()),
        ..Default::default()
    };
    let log = RecordingLog::new();

    let err = run_match(
        &mut empty_match(),
        [&mut a, &mut b],
        &quick_settings(),
        &log,
        &CancellationToken::new(),
    )
    .unwrap_err();

    match &err {
        MatchError::Handshake { player, reason } => {
            assert_eq!(*player, PlayerId::B);
            assert!(reason.contains("hello"));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(a.sent().is_empty());
    assert_eq!((a.destroyed(), b.destroyed()), (1, 1));
    let errors = log.of_kind(LogKind::Error);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0][0], "handshake");
    assert_eq!(errors[0][1], "p2");
}

#[test]
fn silent_peer_fails_the_handshake() {
    let mut a = ScriptedPeer::default();
    let mut b = ScriptedPeer::ready();

    let err = run_match(
        &mut empty_match(),
        [&mut a, &mut b],
        &quick_settings(),
        &RecordingLog::new(),
        &CancellationToken::new(),
    )
    .unwrap_err();

    assert!(matches!(err, MatchError::Handshake { player: PlayerId::A, .. }));
    assert_eq!(err.culprit(), Some(PlayerId::A));
}

#[test]
fn failed_start_is_a_setup_error() {
    let mut a = ScriptedPeer::ready();
    let mut b = ScriptedPeer {
        fail_start: true,
        ..Default::default()
    };

    let err = run_match(
        &mut empty_match(),
        [&mut a, &mut b],
        &quick_settings(),
        &RecordingLog::new(),
        &CancellationToken::new(),
    )
    .unwrap_err();

    assert!(matches!(err, MatchError::Setup { player: PlayerId::B, .. }));
    assert_eq!((a.destroyed(), b.destroyed()), (1, 1));
}

#[test]
fn slow_peer_times_out() {
    let mut a = ScriptedPeer::ready();
    let mut b = ScriptedPeer::ready().answering("{}");

    let err = run_match(
        &mut empty_match(),
        [&mut a, &mut b],
        &quick_settings(),
        &RecordingLog::new(),
        &CancellationToken::new(),
    )
    .unwrap_err();

    match err {
        MatchError::TurnTimeout {
            player,
            tick,
            timeout,
        } => {
            assert_eq!(player, PlayerId::A);
            assert_eq!(tick, 1);
            assert_eq!(timeout, Duration::from_millis(200));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(b.sent().is_empty());
    assert_eq!((a.destroyed(), b.destroyed()), (1, 1));
}

#[test]
fn malformed_moves_are_a_protocol_error() {
    let mut a = ScriptedPeer::ready().answering("{}");
    let mut b = ScriptedPeer::ready().answering("{\"spawns\": [");
    let mut game = empty_match();

    let err = run_match(
        &mut game,
        [&mut a, &mut b],
        &quick_settings(),
        &RecordingLog::new(),
        &CancellationToken::new(),
    )
    .unwrap_err();

    assert!(matches!(
        err,
        MatchError::Protocol {
            player: PlayerId::B,
            tick: 2,
            ..
        }
    ));
    assert_eq!(err.kind(), "protocol");
    assert_eq!(game.tick(), 2);
}

#[test]
fn blank_lines_are_skipped() {
    let mut a = ScriptedPeer::ready().then("   \n\n{}");
    let mut b = ScriptedPeer::ready();
    let log = RecordingLog::new();

    let err = run_match(
        &mut empty_match(),
        [&mut a, &mut b],
        &quick_settings(),
        &log,
        &CancellationToken::new(),
    )
    .unwrap_err();

    assert!(matches!(err, MatchError::TurnTimeout { player: PlayerId::B, tick: 2, .. }));
    assert_eq!(log.of_kind(LogKind::Move).len(), 1);
}

#[test]
fn peer_stderr_lands_in_the_log() {
    let mut a = ScriptedPeer::ready()
        .answering(r#"{"tick":9}"#)
        .with_stderr("thinking hard");
    let mut b = ScriptedPeer::ready().with_stderr("");
    let log = RecordingLog::new();

    run_match(
        &mut empty_match(),
        [&mut a, &mut b],
        &quick_settings(),
        &log,
        &CancellationToken::new(),
    )
    .unwrap_err();

    let stderr: Vec<_> = log
        .of_kind(LogKind::Warn)
        .into_iter()
        .filter(|msg| msg.get(1).is_some_and(|v| v == "stderr"))
        .collect();
    assert_eq!(stderr.len(), 1);
    assert_eq!(stderr[0][0], "p1");
    assert_eq!(stderr[0][2], "thinking hard");

    assert!(log
        .of_kind(LogKind::Debug)
        .iter()
        .all(|msg| msg.get(1).map_or(true, |v| v != "stderr")));

    let warnings = log.of_kind(LogKind::Warn);
    assert!(warnings
        .iter()
        .any(|w| w[1].as_str().is_some_and(|s| s.contains("answered tick 9 at tick 1"))));
}

#[test]
fn match_ceiling_ends_in_a_draw() {
    let mut a = ScriptedPeer::ready().answering("{}");
    let mut b = ScriptedPeer::ready();
    let settings = MatchSettings {
        tick_timeout: Duration::from_secs(5),
        match_timeout: Duration::from_millis(300),
        ..quick_settings()
    };

    let outcome = run_match(
        &mut empty_match(),
        [&mut a, &mut b],
        &settings,
        &RecordingLog::new(),
        &CancellationToken::new(),
    )
    .unwrap();

    assert_eq!(outcome.winner, Winner::Draw);
    assert!(outcome.by_timeout);
    assert_eq!(outcome.ticks_played, 1);
    assert_eq!((a.destroyed(), b.destroyed()), (1, 1));
}

#[test]
fn cancelled_match_stops_and_cleans_up() {
    let mut a = ScriptedPeer::ready().answering("{}");
    let mut b = ScriptedPeer::ready().answering("{}");
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = run_match(
        &mut empty_match(),
        [&mut a, &mut b],
        &quick_settings(),
        &RecordingLog::new(),
        &cancel,
    )
    .unwrap_err();

    assert!(matches!(err, MatchError::Cancelled));
    assert_eq!(err.culprit(), None);
    assert_eq!((a.destroyed(), b.destroyed()), (1, 1));
}
