//! Script commands: tokenizing and host-side dispatch.
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

use super::value::Variables;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("bad command: empty")]
    Empty,
    #[error("bad command: unterminated quote in {0:?}")]
    UnterminatedQuote(String),
    #[error("unknown command {0}")]
    Unknown(String),
    #[error("command {command}: {reason}")]
    InvalidArgument { command: String, reason: String },
}

impl CommandError {
    pub fn invalid(command: &str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            command: command.to_string(),
            reason: reason.into(),
        }
    }
}

/// A tokenized command: a name followed by its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    name: String,
    args: Vec<String>,
}

impl Command {
    /// Split on whitespace, honouring double-quoted arguments.
    ///
    /// # Errors
    ///
    /// Returns an error for blank input or an unterminated quote.
    pub fn parse(text: &str) -> Result<Self, CommandError> {
        let mut tokens = Vec::new();
        let mut current = String::new();
        let mut in_quotes = false;
        let mut has_token = false;
        for c in text.trim().chars() {
            match c {
                '"' => {
                    in_quotes = !in_quotes;
                    has_token = true;
                }
                c if c.is_whitespace() && !in_quotes => {
                    if has_token {
                        tokens.push(std::mem::take(&mut current));
                        has_token = false;
                    }
                }
                c => {
                    current.push(c);
                    has_token = true;
                }
            }
        }
        if in_quotes {
            return Err(CommandError::UnterminatedQuote(text.to_string()));
        }
        if has_token {
            tokens.push(current);
        }
        let mut tokens = tokens.into_iter();
        let name = tokens.next().ok_or(CommandError::Empty)?;
        Ok(Self {
            name,
            args: tokens.collect(),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Argument `index` parsed as a number.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::InvalidArgument`] if missing or not numeric.
    pub fn number_arg(&self, index: usize) -> Result<f64, CommandError> {
        let raw = self
            .args
            .get(index)
            .ok_or_else(|| CommandError::invalid(&self.name, format!("missing argument {index}")))?;
        raw.parse()
            .map_err(|_| CommandError::invalid(&self.name, format!("{raw:?} is not a number")))
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " \"{arg}\"")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

type CommandFn<C> = Box<dyn FnMut(&mut C, &Command, &mut Variables) -> Result<(), CommandError> + Send>;

/// Name to handler table a host can use to implement its commands.
///
/// `C` is the host context handed to each handler.
pub struct CommandSet<C> {
    handlers: HashMap<String, CommandFn<C>>,
}

impl<C> Default for CommandSet<C> {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }
}

impl<C> fmt::Debug for CommandSet<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.handlers.keys().collect();
        names.sort();
        f.debug_struct("CommandSet").field("commands", &names).finish()
    }
}

impl<C> CommandSet<C> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `name`, replacing any previous one.
    #[must_use]
    pub fn with(
        mut self,
        name: &str,
        handler: impl FnMut(&mut C, &Command, &mut Variables) -> Result<(), CommandError>
        + Send
        + 'static,
    ) -> Self {
        self.handlers.insert(name.to_string(), Box::new(handler));
        self
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Run the handler registered for the command's name.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::Unknown`] if nothing is registered, otherwise
    /// whatever the handler returns.
    pub fn dispatch(
        &mut self,
        context: &mut C,
        command: &Command,
        vars: &mut Variables,
    ) -> Result<(), CommandError> {
        let handler = self
            .handlers
            .get_mut(command.name())
            .ok_or_else(|| CommandError::Unknown(command.name().to_string()))?;
        handler(context, command, vars)
    }
}
