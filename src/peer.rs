use std::fmt::Display;

/// How to launch one player's program.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerSpec {
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
}

impl PeerSpec {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> PeerSpec {
        PeerSpec {
            name: name.into(),
            command: command.into(),
            args: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> PeerSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Splits `line` on whitespace: the first word is the program, the rest its arguments.
    /// Returns `None` for a blank line.
    pub fn from_command_line(name: impl Into<String>, line: &str) -> Option<PeerSpec> {
        let mut words = line.split_whitespace();
        let command = words.next()?;
        Some(PeerSpec::new(name, command).with_args(words))
    }
}

impl Display for PeerSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}
