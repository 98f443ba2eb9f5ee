//! Command line parsing.

/// One parsed command line.
///
/// A line is a command token, optionally followed by exactly one space and
/// an argument. Any other separator makes the token unrecognisable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Command<'a> {
    /// `fetch <plugin>`
    Fetch(Option<&'a [u8]>),
    /// `config <plugin>`
    Config(Option<&'a [u8]>),
    /// `list [node]`
    List,
    /// `nodes`
    Nodes,
    /// `version`
    Version,
    /// `cap [capabilities...]`
    Cap,
    /// `quit` or `.`
    Quit,
    Unknown,
}

impl<'a> Command<'a> {
    /// Parses a line with its terminator already removed.
    pub(crate) fn parse(line: &'a [u8]) -> Self {
        let (token, argument) = match line.iter().position(|&b| b == b' ') {
            Some(i) => (&line[..i], Some(&line[i + 1..])),
            None => (line, None),
        };
        let argument = argument.filter(|arg| !arg.is_empty());

        match token {
            b"fetch" => Self::Fetch(argument),
            b"config" => Self::Config(argument),
            b"list" => Self::List,
            b"nodes" => Self::Nodes,
            b"version" => Self::Version,
            b"cap" => Self::Cap,
            b"quit" | b"." => Self::Quit,
            _ => Self::Unknown,
        }
    }

    /// Name used in logs.
    pub(crate) const fn name(&self) -> &'static str {
        match self {
            Self::Fetch(_) => "fetch",
            Self::Config(_) => "config",
            Self::List => "list",
            Self::Nodes => "nodes",
            Self::Version => "version",
            Self::Cap => "cap",
            Self::Quit => "quit",
            Self::Unknown => "unknown",
        }
    }
}
