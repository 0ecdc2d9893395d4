use std::{
    fmt::Display,
    path::{Path, PathBuf},
};

use crate::engine::PlayerId;
use crate::peer::PeerSpec;

/// One match to referee: player A is `players[0]`, player B is `players[1]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MatchJob {
    pub id: String,
    pub players: [PeerSpec; 2],
}

impl MatchJob {
    pub fn new(id: impl Into<String>, a: PeerSpec, b: PeerSpec) -> MatchJob {
        MatchJob {
            id: id.into(),
            players: [a, b],
        }
    }

    pub fn player(&self, player: PlayerId) -> &PeerSpec {
        &self.players[player.index()]
    }

    /// Where this match's JSON-lines log goes inside `dir`.
    pub fn log_path(&self, dir: &Path) -> PathBuf {
        let safe: String = self
            .id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        dir.join(format!("match_{safe}.jsonl"))
    }
}

impl Display for MatchJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{} VS {}]", self.id, self.players[0], self.players[1])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_and_log_path() {
        let job = MatchJob::new("r1/m 2", PeerSpec::new("alice", "a"), PeerSpec::new("bob", "b"));
        assert_eq!(job.to_string(), "r1/m 2 [alice VS bob]");
        assert_eq!(
            job.log_path(Path::new("/tmp/logs")),
            PathBuf::from("/tmp/logs/match_r1_m_2.jsonl")
        );
        assert_eq!(job.player(PlayerId::B).name, "bob");
    }
}
