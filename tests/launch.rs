use std::time::Duration;

use ocean_referee::prelude::*;
use time::format_description;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

const IDLE_PEER: &str = "echo __READY_V1__; while read line; do echo '{}'; done";
const SILENT_PEER: &str = "echo __READY_V1__; exec sleep 30";
const QUITTER: &str = "exit 0";
const LONG_LINE_PEER: &str =
    "echo __READY_V1__; read line; head -c 2000000 /dev/zero | tr '\\0' a; echo";

fn init_as_file_logger() {
    let local_offset = time::UtcOffset::current_local_offset().unwrap_or(time::UtcOffset::UTC);
    let timer = tracing_subscriber::fmt::time::OffsetTime::new(
        local_offset,
        format_description::parse("[year]-[month]-[day] [hour]:[minute]:[second]").unwrap(),
    );

    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::DEBUG)
        .with_ansi(false)
        .with_timer(timer)
        .with_test_writer()
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn shell(name: &str, script: &str) -> PeerSpec {
    PeerSpec::new(name, "sh").with_args(["-c", script])
}

fn referee(config: Configuration, tick_timeout: Duration) -> Referee<MatchState, MatchStateFactory> {
    init_as_file_logger();
    let constraints = ConstraintsBuilder::new()
        .with_max_total_ram(400)
        .with_ram_per_peer(100)
        .with_total_cpu_count(1)
        .with_handshake_timeout(Duration::from_secs(2))
        .with_tick_timeout(tick_timeout)
        .build()
        .unwrap();
    let config = config.with_allow_uncontained(true).with_verbose(false);
    let factory = MatchStateFactory {
        mirror_player_b: config.mirror_player_b(),
    };
    Referee::new(factory, config, constraints).unwrap()
}

#[test]
fn idle_shell_peers_draw() {
    let referee = referee(Configuration::new().with_seed(7), Duration::from_secs(1));
    let job = MatchJob::new("idle", shell("alice", IDLE_PEER), shell("bob", IDLE_PEER));

    let report = referee.run(&job);

    let outcome = report.result.as_ref().unwrap();
    assert_eq!(outcome.winner, Winner::Draw);
    assert_eq!(outcome.ticks_played, 1000);
    assert_eq!(report.seed, 7);
    assert_eq!(report.to_json()["result"]["winner"], "draw");
}

#[test]
fn silent_shell_peer_times_out() {
    let referee = referee(Configuration::new(), Duration::from_millis(300));
    let job = MatchJob::new("silent", shell("alice", IDLE_PEER), shell("bob", SILENT_PEER));

    let report = referee.run(&job);

    match &report.result {
        Err(MatchError::TurnTimeout { player, tick, .. }) => {
            assert_eq!(*player, PlayerId::B);
            assert_eq!(*tick, 2);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(report.to_json()["result"]["culprit"], "bob");
}

#[test]
fn oversized_reply_is_a_protocol_error() {
    let referee = referee(Configuration::new(), Duration::from_secs(2));
    let job = MatchJob::new("long", shell("alice", LONG_LINE_PEER), shell("bob", IDLE_PEER));

    let report = referee.run(&job);

    match &report.result {
        Err(MatchError::Protocol {
            player,
            tick,
            reason,
        }) => {
            assert_eq!(*player, PlayerId::A);
            assert_eq!(*tick, 1);
            assert!(reason.contains("longer than"), "{reason}");
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(report.to_json()["result"]["error"], "protocol");
}

#[test]
fn every_job_gets_a_report() {
    let referee = referee(Configuration::new(), Duration::from_millis(300));
    let jobs = vec![
        MatchJob::new("m1", shell("alice", QUITTER), shell("bob", IDLE_PEER)),
        MatchJob::new("m2", shell("carol", IDLE_PEER), shell("dave", QUITTER)),
    ];

    let mut reports = referee.run_all(jobs);
    reports.sort_by(|a, b| a.job.id.cmp(&b.job.id));

    assert_eq!(reports.len(), 2);
    let culprits: Vec<_> = reports
        .iter()
        .map(|r| r.result.as_ref().err().and_then(MatchError::culprit))
        .collect();
    assert_eq!(culprits, vec![Some(PlayerId::A), Some(PlayerId::B)]);
}

#[test]
fn match_log_is_written_per_job() {
    let dir = std::env::temp_dir().join(format!("ocean-referee-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let referee = referee(
        Configuration::new().with_log_dir(&dir),
        Duration::from_millis(300),
    );
    let job = MatchJob::new("logged", shell("alice", IDLE_PEER), shell("bob", SILENT_PEER));

    let report = referee.run(&job);
    assert!(report.result.is_err());

    let content = std::fs::read_to_string(job.log_path(&dir)).unwrap();
    let records: Vec<serde_json::Value> = content
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert!(records.iter().any(|r| r["typ"] == "MOVE"));
    assert!(records.iter().any(|r| r["typ"] == "VIEW"));
    assert_eq!(records.last().unwrap()["typ"], "ERROR");
    assert!(records.iter().all(|r| r["time"].is_string()));
    let _ = std::fs::remove_dir_all(&dir);
}
