//! Contract the scene layer implements to receive dialogue output.
use serde::{Deserialize, Serialize};

use super::command::{Command, CommandError};
use super::strings::Line;
use super::value::Variables;

/// A choice offered to the player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogueOption {
    /// Position in the option list; this is what gets selected.
    pub index: usize,
    pub line: Line,
    /// Rendered option text.
    pub text: String,
    /// Options whose condition failed are still shown but cannot be picked.
    pub available: bool,
}

/// A line ready for display, already rendered against the string table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresentedLine {
    pub line: Line,
    pub text: String,
    pub last_line: bool,
}

/// Host callbacks. Every method runs on the dialogue execution thread while
/// the runner's stage lock is held, so implementations may freely mutate
/// state the frame thread also reads through [`super::DialogueRunner::with_stage`].
///
/// Presentation callbacks must not block; the runner itself waits for the
/// frame thread after `on_line` and `on_options` return.
pub trait DialogueHost: Send + 'static {
    fn on_node_start(&mut self, _node: &str) {}

    fn on_prepare_for_lines(&mut self, _line_ids: &[String]) {}

    /// A line starts presenting; it stays pending until the frame thread
    /// calls `finish_line`.
    fn on_line(&mut self, line: &PresentedLine);

    /// Options are on screen; they stay pending until the frame thread calls
    /// `select_option`.
    fn on_options(&mut self, options: &[DialogueOption]);

    /// Perform a script command.
    ///
    /// # Errors
    ///
    /// Unrecognised or malformed commands return an error; what happens next
    /// is decided by the runner's command error policy.
    fn on_command(&mut self, command: &Command, vars: &mut Variables)
    -> Result<(), CommandError>;

    fn on_node_complete(&mut self, _node: &str) {}

    fn on_dialogue_complete(&mut self) {}
}
