//! Referees one match between two peer programs.
//!
//! ```text
//! referee "<player A command>" "<player B command>" [match id]
//! ```
//!
//! Limits and behavior come from the environment, see `Configuration::from_env` and
//! `ConstraintsBuilder::from_env`. The report is printed to stdout as one JSON object; the
//! exit status is non-zero when the match failed.

use anyhow::{self, bail, Context};

use ocean_referee::prelude::*;

fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let (Some(a), Some(b)) = (args.next(), args.next()) else {
        bail!("usage: referee \"<player A command>\" \"<player B command>\" [match id]");
    };
    let id = args.next().unwrap_or_else(|| "match".to_owned());
    let a = PeerSpec::from_command_line("p1", &a).context("empty command for player A")?;
    let b = PeerSpec::from_command_line("p2", &b).context("empty command for player B")?;

    let config = Configuration::from_env().with_verbose(false);
    let constraints = ConstraintsBuilder::from_env()
        .build()
        .context("invalid constraints")?;
    let factory = MatchStateFactory {
        mirror_player_b: config.mirror_player_b(),
    };
    let referee = Referee::<MatchState, _>::new(factory, config, constraints)?;

    let report = referee.run(&MatchJob::new(id, a, b));
    println!("{}", report.to_json());
    if let Err(e) = report.result {
        bail!("match failed: {e}");
    }
    Ok(())
}
