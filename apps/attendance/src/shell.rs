//! Line-oriented interactive session.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    Mark,
    Clear,
    /// Replaces the query input; an empty string clears it.
    Query(String),
    Check,
    Refresh,
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  mark            mark your attendance
  clear           clear all attendance (owner only)
  query <address> set the address to look up
  check           look up the timestamp for the query address
  refresh         re-read the contract
  help            show this help
  quit            leave the session";

impl ShellCommand {
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };
        let command = match word.to_ascii_lowercase().as_str() {
            "mark" => Self::Mark,
            "clear" => Self::Clear,
            "query" => Self::Query(rest.to_string()),
            "check" => Self::Check,
            "refresh" => Self::Refresh,
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => return Err(format!("unknown command '{other}' (try 'help')")),
        };
        Ok(Some(command))
    }
}
