//! Resource and timing limits for refereed matches.
//!
//! Every match runs two peer processes. Each peer gets its own RAM limit and a set of CPUs it
//! is pinned to, enforced through Linux cgroups v2 and `taskset`. The timing limits bound the
//! handshake, every turn, and the whole match.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use ocean_referee::constraints::ConstraintsBuilder;
//!
//! let constraints = ConstraintsBuilder::new()
//!     .with_max_total_ram(16_000)
//!     .with_ram_per_peer(2_000)
//!     .with_cpu_list("0-3")
//!     .with_tick_timeout(Duration::from_millis(500))
//!     .with_match_timeout(Duration::from_secs(600))
//!     .build()
//!     .unwrap();
//! ```
//!
//! [`ConstraintsBuilder::from_env()`] reads the same settings from environment variables.

use std::{collections::HashSet, env, time::Duration};

use anyhow::{bail, Context};
use tracing::warn;

pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_TICK_TIMEOUT: Duration = Duration::from_secs(1);
pub const DEFAULT_MATCH_TIMEOUT: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Default)]
enum AutoCpus {
    #[default]
    Auto,
    Count(usize),
    List(String),
}

/// Builder for [`Constraints`].
///
/// By default RAM is only bounded by what the host has available, CPUs default to the
/// host's physical cores with one per peer, and the timing limits use the `DEFAULT_*`
/// constants of this module.
#[derive(Debug, Default)]
pub struct ConstraintsBuilder {
    total_ram: Option<usize>,
    peer_ram: Option<usize>,
    cpus: AutoCpus,
    cpus_per_peer: Option<usize>,
    handshake_timeout: Option<Duration>,
    tick_timeout: Option<Duration>,
    match_timeout: Option<Duration>,
}

impl ConstraintsBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads:
    /// - `MAX_TOTAL_RAM` (MB)
    /// - `RAM_PER_PEER` (MB)
    /// - `CPU_LIST`, e.g. "0-3,6"
    /// - `TOTAL_CPU_COUNT`, overridden by `CPU_LIST`
    /// - `CPUS_PER_PEER`
    /// - `HANDSHAKE_TIMEOUT_MS`
    /// - `TICK_TIMEOUT_MS`
    /// - `MATCH_TIMEOUT_SECS`
    #[must_use]
    pub fn from_env() -> Self {
        fn parse_usize(var: &str) -> Option<usize> {
            env::var(var).ok()?.parse().ok()
        }

        fn parse_duration_secs(var: &str) -> Option<Duration> {
            env::var(var)
                .ok()?
                .parse::<u64>()
                .ok()
                .map(Duration::from_secs)
        }

        fn parse_duration_millis(var: &str) -> Option<Duration> {
            env::var(var)
                .ok()?
                .parse::<u64>()
                .ok()
                .map(Duration::from_millis)
        }

        let cpus = if let Ok(list) = env::var("CPU_LIST") {
            AutoCpus::List(list)
        } else if let Some(count) = parse_usize("TOTAL_CPU_COUNT") {
            AutoCpus::Count(count)
        } else {
            AutoCpus::Auto
        };

        ConstraintsBuilder {
            total_ram: parse_usize("MAX_TOTAL_RAM"),
            peer_ram: parse_usize("RAM_PER_PEER"),
            cpus,
            cpus_per_peer: parse_usize("CPUS_PER_PEER"),
            handshake_timeout: parse_duration_millis("HANDSHAKE_TIMEOUT_MS"),
            tick_timeout: parse_duration_millis("TICK_TIMEOUT_MS"),
            match_timeout: parse_duration_secs("MATCH_TIMEOUT_SECS"),
        }
    }

    /// Maximum RAM shared by every running peer (in MB).
    #[must_use]
    pub fn with_max_total_ram(self, max: usize) -> Self {
        Self {
            total_ram: Some(max),
            ..self
        }
    }

    /// Maximum RAM of one peer process (in MB).
    #[must_use]
    pub fn with_ram_per_peer(self, max: usize) -> Self {
        Self {
            peer_ram: Some(max),
            ..self
        }
    }

    /// CPUs peers may run on, as inclusive ranges and single ids: `"0-3,6,8"`.
    #[must_use]
    pub fn with_cpu_list(self, cpus: &str) -> Self {
        Self {
            cpus: AutoCpus::List(cpus.to_string()),
            ..self
        }
    }

    /// Ignored if `with_cpu_list` is also used.
    #[must_use]
    pub fn with_total_cpu_count(self, max: usize) -> Self {
        if let AutoCpus::List(_) = self.cpus {
            warn!("`with_total_cpu_count` is ignored if `with_cpu_list` is used!");
            self
        } else {
            Self {
                cpus: AutoCpus::Count(max),
                ..self
            }
        }
    }

    #[must_use]
    pub fn with_cpus_per_peer(self, max: usize) -> Self {
        Self {
            cpus_per_peer: Some(max),
            ..self
        }
    }

    /// How long a peer may take to print its readiness token.
    #[must_use]
    pub fn with_handshake_timeout(self, duration: Duration) -> Self {
        Self {
            handshake_timeout: Some(duration),
            ..self
        }
    }

    /// How long a peer may think about one turn.
    #[must_use]
    pub fn with_tick_timeout(self, duration: Duration) -> Self {
        Self {
            tick_timeout: Some(duration),
            ..self
        }
    }

    /// Wall-clock ceiling for a whole match. A match still running at the ceiling is a draw.
    #[must_use]
    pub fn with_match_timeout(self, duration: Duration) -> Self {
        Self {
            match_timeout: Some(duration),
            ..self
        }
    }

    /// # Errors
    ///
    /// Fails when the limits are impossible, e.g. total RAM < peer RAM, or when the CPU list
    /// does not parse.
    pub fn build(self) -> anyhow::Result<Constraints> {
        let mut sys = sysinfo::System::new();

        let total_ram = self.total_ram.map(|i| i * 1_000_000).unwrap_or_else(|| {
            sys.refresh_memory();
            sys.available_memory() as usize
        });

        if total_ram < (self.peer_ram.unwrap_or(0) * 1_000_000) {
            bail!(
                "Peer RAM size ({}MB) is greater than total RAM ({}MB)",
                self.peer_ram.unwrap_or(0),
                total_ram / 1_000_000
            );
        }

        // physical cores only, sibling threads halve peer performance
        let cpus = match self.cpus {
            AutoCpus::Auto => (0..num_cpus::get_physical() as u8).collect::<HashSet<u8>>(),
            AutoCpus::Count(count) => (0..(count as u8)).collect::<HashSet<u8>>(),
            AutoCpus::List(s) => {
                cpu_list_to_hashset(&s).map_err(|e| e.context("error parsing cpu list"))?
            }
        };
        let cpus_per_peer = self.cpus_per_peer.unwrap_or(1).max(1);
        let peer_slots = (cpus.len() / cpus_per_peer).max(1);
        let peer_ram = self
            .peer_ram
            .map(|i| i * 1_000_000)
            .unwrap_or(total_ram / peer_slots);

        Ok(Constraints {
            total_ram,
            peer_ram,
            cpus,
            cpus_per_peer,
            handshake_timeout: self
                .handshake_timeout
                .unwrap_or(DEFAULT_HANDSHAKE_TIMEOUT),
            tick_timeout: self.tick_timeout.unwrap_or(DEFAULT_TICK_TIMEOUT),
            match_timeout: self.match_timeout.unwrap_or(DEFAULT_MATCH_TIMEOUT),
        })
    }
}

fn cpu_list_to_hashset(s: &str) -> anyhow::Result<HashSet<u8>> {
    if s.is_empty() {
        bail!("Empty string");
    }
    let parse = |value: &str| -> anyhow::Result<u8> {
        value
            .trim()
            .parse()
            .with_context(|| format!("could not parse {value}"))
    };
    let mut set: HashSet<u8> = HashSet::new();
    for item in s.split(',') {
        match item.split('-').collect::<Vec<_>>()[..] {
            [value] => {
                set.insert(parse(value)?);
            }
            [start, end] => {
                let (start, end) = (parse(start)?, parse(end)?);
                set.extend(start.min(end)..=start.max(end));
            }
            _ => bail!(
                "each comma-separated item must be a number or a range (e.g. '0-3'), got '{item}'"
            ),
        }
    }
    Ok(set)
}

/// Obtained using [`ConstraintsBuilder`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Constraints {
    pub(crate) total_ram: usize,
    pub(crate) peer_ram: usize,
    pub(crate) cpus: HashSet<u8>,
    pub(crate) cpus_per_peer: usize,
    pub(crate) handshake_timeout: Duration,
    pub(crate) tick_timeout: Duration,
    pub(crate) match_timeout: Duration,
}

impl Constraints {
    pub fn builder() -> ConstraintsBuilder {
        ConstraintsBuilder::new()
    }

    pub fn handshake_timeout(&self) -> Duration {
        self.handshake_timeout
    }

    pub fn tick_timeout(&self) -> Duration {
        self.tick_timeout
    }

    pub fn match_timeout(&self) -> Duration {
        self.match_timeout
    }

    /// RAM limit of one peer, in bytes.
    pub fn peer_ram(&self) -> usize {
        self.peer_ram
    }

    /// CPUs in `taskset` list form ("0,2,3").
    pub fn cpu_list(&self) -> String {
        let mut cpus: Vec<_> = self.cpus.iter().collect();
        cpus.sort();
        cpus.iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }

    pub(crate) fn add(&mut self, res: Constraints) {
        self.total_ram += res.total_ram;
        self.cpus.extend(res.cpus);
    }

    fn take(&mut self, num_cpus: usize, ram: usize) -> Constraints {
        let mut ordered: Vec<u8> = self.cpus.iter().copied().collect();
        ordered.sort_unstable();
        let cpus: HashSet<u8> = ordered.into_iter().take(num_cpus).collect();
        self.cpus.retain(|c| !cpus.contains(c));
        self.total_ram -= ram;
        Constraints {
            total_ram: ram,
            cpus,
            ..*self
        }
    }

    pub(crate) fn try_take(&mut self, num_cpus: usize, ram: usize) -> Option<Constraints> {
        if self.cpus.len() >= num_cpus && self.total_ram >= ram {
            Some(self.take(num_cpus, ram))
        } else {
            None
        }
    }

    /// Takes what one peer needs out of this pool.
    pub(crate) fn try_take_peer(&mut self) -> Option<Constraints> {
        self.try_take(self.cpus_per_peer, self.peer_ram)
    }
}
