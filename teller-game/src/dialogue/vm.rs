//! Dialogue virtual machine.
use thiserror::Error;

use super::command::CommandError;
use super::program::{Instruction, Node, Operand, Program};
use super::strings::Line;
use super::value::{Value, VariableStorage};

/// Errors that end a node's execution.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DialogueError {
    #[error("node {0} does not exist")]
    UnknownNode(String),
    #[error("node {node}: label {label} does not exist")]
    UnknownLabel { node: String, label: String },
    #[error("node {node}: show_options without any options")]
    NoOptions { node: String },
    #[error("node {node}: option {index} is not selectable ({count} offered)")]
    InvalidOption {
        node: String,
        index: usize,
        count: usize,
    },
    #[error("node {node}: {source}")]
    Command {
        node: String,
        #[source]
        source: CommandError,
    },
    #[error("dialogue cancelled")]
    Cancelled,
    #[error("dialogue thread panicked")]
    Panicked,
}

impl DialogueError {
    /// Whether the error should end the whole day rather than just the node.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !matches!(self, Self::Command { .. })
    }
}

/// An option as the VM offers it, before rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct OfferedOption {
    pub line: Line,
    pub available: bool,
}

/// Callbacks the VM drives. Each call returns before the VM continues.
pub trait DialogueHandler {
    /// # Errors
    /// Aborts the node.
    fn node_start(&mut self, node: &str) -> Result<(), DialogueError>;
    /// # Errors
    /// Aborts the node.
    fn prepare_for_lines(&mut self, line_ids: &[String]) -> Result<(), DialogueError>;
    /// # Errors
    /// Aborts the node.
    fn line(&mut self, line: Line) -> Result<(), DialogueError>;
    /// Returns the index of the chosen option.
    ///
    /// # Errors
    /// Aborts the node.
    fn options(&mut self, options: &[OfferedOption]) -> Result<usize, DialogueError>;
    /// # Errors
    /// Aborts the node.
    fn command(&mut self, node: &str, text: &str) -> Result<(), DialogueError>;
    /// # Errors
    /// Aborts the dialogue.
    fn node_complete(&mut self, node: &str) -> Result<(), DialogueError>;
    /// # Errors
    /// Reported to the caller of [`VirtualMachine::run`].
    fn dialogue_complete(&mut self) -> Result<(), DialogueError>;
}

/// Interprets nodes of a [`Program`].
#[derive(Debug, Clone, Copy)]
pub struct VirtualMachine<'p> {
    program: &'p Program,
}

impl<'p> VirtualMachine<'p> {
    #[must_use]
    pub const fn new(program: &'p Program) -> Self {
        Self { program }
    }

    /// Run from `start` until the dialogue stops, the last node ends, or an
    /// error aborts it.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by the program or the handler.
    pub fn run<H, V>(&self, start: &str, handler: &mut H, vars: &mut V) -> Result<(), DialogueError>
    where
        H: DialogueHandler + ?Sized,
        V: VariableStorage + ?Sized,
    {
        let mut node = self.lookup(start)?;
        'nodes: loop {
            log::debug!("entering node {}", node.name);
            handler.node_start(&node.name)?;
            handler.prepare_for_lines(&node.line_ids())?;

            let mut pending: Vec<(OfferedOption, &str)> = Vec::new();
            let mut pc = 0;
            while let Some(inst) = node.instructions.get(pc) {
                pc += 1;
                match inst {
                    Instruction::Label { .. } => {}
                    Instruction::Line { id, substitutions } => {
                        handler.line(resolve_line(id, substitutions, &*vars))?;
                    }
                    Instruction::AddOption {
                        id,
                        target,
                        substitutions,
                        condition,
                    } => {
                        let available = condition.as_ref().is_none_or(|c| c.holds(&*vars));
                        let line = resolve_line(id, substitutions, &*vars);
                        pending.push((OfferedOption { line, available }, target.as_str()));
                    }
                    Instruction::ShowOptions => {
                        pc = self.show_options(node, &mut pending, handler)?;
                    }
                    Instruction::Command { text } => handler.command(&node.name, text)?,
                    Instruction::Set { var, value } => {
                        let value = value.resolve(&*vars);
                        vars.set(var, value);
                    }
                    Instruction::Add { var, amount } => {
                        let current = vars.get(var).and_then(|v| v.as_number()).unwrap_or(0.0);
                        vars.set(var, Value::Number(current + amount));
                    }
                    Instruction::Jump { label } => pc = jump_target(node, label)?,
                    Instruction::JumpIf { condition, label } => {
                        if condition.holds(&*vars) {
                            pc = jump_target(node, label)?;
                        }
                    }
                    Instruction::RunNode { node: target } => {
                        handler.node_complete(&node.name)?;
                        node = self.lookup(target)?;
                        continue 'nodes;
                    }
                    Instruction::Stop => break,
                }
            }
            handler.node_complete(&node.name)?;
            break;
        }
        handler.dialogue_complete()
    }

    fn show_options<H: DialogueHandler + ?Sized>(
        &self,
        node: &Node,
        pending: &mut Vec<(OfferedOption, &str)>,
        handler: &mut H,
    ) -> Result<usize, DialogueError> {
        if pending.is_empty() {
            return Err(DialogueError::NoOptions {
                node: node.name.clone(),
            });
        }
        let offered: Vec<OfferedOption> = pending.iter().map(|(o, _)| o.clone()).collect();
        let index = handler.options(&offered)?;
        let target = match pending.get(index) {
            Some((option, target)) if option.available => *target,
            _ => {
                return Err(DialogueError::InvalidOption {
                    node: node.name.clone(),
                    index,
                    count: pending.len(),
                });
            }
        };
        pending.clear();
        jump_target(node, target)
    }

    fn lookup(&self, name: &str) -> Result<&'p Node, DialogueError> {
        self.program
            .node(name)
            .ok_or_else(|| DialogueError::UnknownNode(name.to_string()))
    }
}

fn jump_target(node: &Node, label: &str) -> Result<usize, DialogueError> {
    node.label(label).ok_or_else(|| DialogueError::UnknownLabel {
        node: node.name.clone(),
        label: label.to_string(),
    })
}

fn resolve_line<V: VariableStorage + ?Sized>(id: &str, substitutions: &[Operand], vars: &V) -> Line {
    Line {
        id: id.to_string(),
        substitutions: substitutions.iter().map(|op| op.resolve(vars)).collect(),
    }
}
