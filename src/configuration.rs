//! Config for the referee behaviors
//!
//! Configuration can be created programmatically using [`Configuration::new()`] or by reading
//! environment variables using [`Configuration::from_env()`].
//!
//! # Environment Variables
//!
//! All values are optional. Flags are case-insensitive; set them to `"true"` to enable.
//!
//! - `REFEREE_VERBOSE`: Print match progress to stdout (default: `true`)
//! - `REFEREE_LOG`: Enable tracing output to a file (default: `false`)
//! - `REFEREE_ALLOW_UNCONTAINED`: Allow running peers without `taskset` and cgroups (default: `false`)
//! - `REFEREE_DEBUG_PEER_STDERR`: Mirror peer stderr to the referee's stderr (default: `false`)
//! - `REFEREE_MIRROR_PLAYER_B`: Show player B a horizontally mirrored board (default: `true`)
//! - `REFEREE_SEED`: Board seed used for every match (default: random per match)
//! - `REFEREE_LOG_DIR`: Directory for per-match JSON-lines logs (default: none)
//! - `REFEREE_READY_TOKEN`: Readiness token peers must print (default: `__READY_V1__`)

use std::path::PathBuf;

use crate::protocol::READY_TOKEN;

/// Configuration for referee behaviors.
#[derive(Debug, Clone)]
pub struct Configuration {
    pub(crate) verbose: bool,
    pub(crate) log: bool,
    pub(crate) allow_uncontained: bool,
    pub(crate) debug_peer_stderr: bool,
    pub(crate) mirror_player_b: bool,
    pub(crate) seed: Option<u64>,
    pub(crate) log_dir: Option<PathBuf>,
    pub(crate) ready_token: String,
}

impl Configuration {
    /// Create a new configuration with default parameters.
    ///
    /// By default:
    /// - Match progress is printed to stdout.
    /// - Logging to file is disabled.
    /// - Peers must run contained.
    /// - Player B sees a mirrored board.
    /// - Every match draws its own board seed.
    /// - No match log files are written.
    pub fn new() -> Self {
        Self {
            verbose: true,
            log: false,
            allow_uncontained: false,
            debug_peer_stderr: false,
            mirror_player_b: true,
            seed: None,
            log_dir: None,
            ready_token: READY_TOKEN.to_owned(),
        }
    }

    /// Create configuration from `REFEREE_*` environment variables (see module docs).
    ///
    /// Unset or unparsable values fall back to the defaults of [`Configuration::new()`].
    pub fn from_env() -> Self {
        fn get_env_flag(var: &str, default: bool) -> bool {
            match std::env::var(var) {
                Ok(val) => val.eq_ignore_ascii_case("true"),
                Err(_) => default,
            }
        }

        let defaults = Self::new();
        Self {
            verbose: get_env_flag("REFEREE_VERBOSE", defaults.verbose),
            log: get_env_flag("REFEREE_LOG", defaults.log),
            allow_uncontained: get_env_flag("REFEREE_ALLOW_UNCONTAINED", false),
            debug_peer_stderr: get_env_flag("REFEREE_DEBUG_PEER_STDERR", false),
            mirror_player_b: get_env_flag("REFEREE_MIRROR_PLAYER_B", true),
            seed: std::env::var("REFEREE_SEED")
                .ok()
                .and_then(|s| s.parse().ok()),
            log_dir: std::env::var_os("REFEREE_LOG_DIR").map(PathBuf::from),
            ready_token: std::env::var("REFEREE_READY_TOKEN").unwrap_or(defaults.ready_token),
        }
    }

    /// Enable or disable progress output.
    pub fn with_verbose(mut self, value: bool) -> Self {
        self.verbose = value;
        self
    }

    /// Enable or disable logging to file.
    pub fn with_log(mut self, value: bool) -> Self {
        self.log = value;
        self
    }

    /// Enable or disable running peers outside of cgroups and `taskset`.
    pub fn with_allow_uncontained(mut self, value: bool) -> Self {
        self.allow_uncontained = value;
        self
    }

    /// Enable or disable peer stderr output (debug purposes only).
    pub fn with_debug_peer_stderr(mut self, value: bool) -> Self {
        self.debug_peer_stderr = value;
        self
    }

    pub fn with_mirror_player_b(mut self, value: bool) -> Self {
        self.mirror_player_b = value;
        self
    }

    /// Use the same board seed for every match.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Write one JSON-lines log per match into `dir`.
    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    pub fn with_ready_token(mut self, token: impl Into<String>) -> Self {
        self.ready_token = token.into();
        self
    }

    pub fn mirror_player_b(&self) -> bool {
        self.mirror_player_b
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new()
    }
}
