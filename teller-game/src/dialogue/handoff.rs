//! Single-slot blocking handoff between the dialogue thread and the frame thread.
//!
//! ```text
//! dialogue thread                     frame thread
//! ───────────────                     ────────────
//! lock stage
//!   host.on_line(line)
//!   slot = Line(pending)
//!   wait on signal ──────────────┐     lock stage (with_stage)
//!                                │       advance typewriter
//!                                │       stage.finish_line()
//!   wake  <──────────────────────┘     unlock + notify
//!   slot = Empty
//! unlock, continue VM
//! ```
//!
//! The host object and the variable store live inside the same mutex, so
//! anything the frame thread reads is consistent with the script's view.
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use super::command::Command;
use super::host::{DialogueHost, DialogueOption, PresentedLine};
use super::loader::DialogueProgram;
use super::strings::Line;
use super::value::{Value, VariableStorage, Variables};
use super::vm::{DialogueError, DialogueHandler, OfferedOption};

/// Lifecycle of a [`super::DialogueRunner`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunnerState {
    /// No node is executing.
    Stopped,
    /// The VM is interpreting instructions.
    Running,
    /// The VM is blocked until the frame thread finishes a line or picks an option.
    Waiting,
}

/// What to do when a script command fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandErrorPolicy {
    /// End the current node with [`DialogueError::Command`].
    #[default]
    AbortNode,
    /// Log the failure and keep running the node.
    Continue,
}

#[derive(Debug, Clone, PartialEq)]
enum Slot {
    Empty,
    Line {
        line: PresentedLine,
        finished: bool,
    },
    Options {
        options: Vec<DialogueOption>,
        selected: Option<usize>,
    },
}

/// Everything guarded by the handoff lock.
#[derive(Debug)]
pub struct Stage<H> {
    /// The scene's callback object.
    pub host: H,
    /// Variables shared with the running script.
    pub variables: Variables,
    slot: Slot,
    state: RunnerState,
    current_node: Option<String>,
    cancelled: bool,
}

impl<H> Stage<H> {
    #[must_use]
    pub const fn state(&self) -> RunnerState {
        self.state
    }

    #[must_use]
    pub fn current_node(&self) -> Option<&str> {
        self.current_node.as_deref()
    }

    /// The line waiting to be acknowledged, if any.
    #[must_use]
    pub fn pending_line(&self) -> Option<&PresentedLine> {
        match &self.slot {
            Slot::Line {
                line,
                finished: false,
            } => Some(line),
            _ => None,
        }
    }

    /// Options waiting for a selection, if any.
    #[must_use]
    pub fn pending_options(&self) -> Option<&[DialogueOption]> {
        match &self.slot {
            Slot::Options {
                options,
                selected: None,
            } => Some(options),
            _ => None,
        }
    }

    /// Mark the pending line as fully presented. Returns false if no line
    /// was pending.
    pub fn finish_line(&mut self) -> bool {
        match &mut self.slot {
            Slot::Line { finished, .. } if !*finished => {
                *finished = true;
                self.state = RunnerState::Running;
                true
            }
            _ => false,
        }
    }

    /// Choose option `index`. Returns false if no options were pending.
    /// An out-of-range or unavailable index is passed on to the VM, which
    /// rejects it.
    pub fn select_option(&mut self, index: usize) -> bool {
        match &mut self.slot {
            Slot::Options { selected, .. } if selected.is_none() => {
                *selected = Some(index);
                self.state = RunnerState::Running;
                true
            }
            _ => false,
        }
    }

    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        self.cancelled
    }
}

pub(crate) struct Handoff<H> {
    stage: Mutex<Stage<H>>,
    signal: Condvar,
}

impl<H> Handoff<H> {
    pub(crate) fn new(host: H, variables: Variables) -> Self {
        Self {
            stage: Mutex::new(Stage {
                host,
                variables,
                slot: Slot::Empty,
                state: RunnerState::Stopped,
                current_node: None,
                cancelled: false,
            }),
            signal: Condvar::new(),
        }
    }

    /// Lock the stage. A panic on the other side does not wedge this one.
    pub(crate) fn lock(&self) -> MutexGuard<'_, Stage<H>> {
        self.stage.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mutate the stage, then wake every waiter.
    pub(crate) fn update<R>(&self, f: impl FnOnce(&mut Stage<H>) -> R) -> R {
        let result = {
            let mut stage = self.lock();
            f(&mut stage)
        };
        self.signal.notify_all();
        result
    }

    /// Mark a node as starting. Called on the frame thread before spawning.
    pub(crate) fn begin(&self, node: &str) {
        self.update(|stage| {
            stage.state = RunnerState::Running;
            stage.slot = Slot::Empty;
            stage.cancelled = false;
            stage.current_node = Some(node.to_string());
        });
    }

    /// Return to `Stopped` and wake every waiter.
    pub(crate) fn halt(&self) {
        self.update(|stage| {
            stage.state = RunnerState::Stopped;
            stage.slot = Slot::Empty;
        });
    }

    pub(crate) fn cancel(&self) {
        self.update(|stage| {
            stage.cancelled = true;
            if stage.state == RunnerState::Waiting {
                stage.state = RunnerState::Running;
            }
        });
    }

    /// Block until the dialogue thread is waiting on the frame thread or has
    /// stopped. Returns false if `timeout` elapsed first.
    pub(crate) fn wait_until_settled(&self, timeout: Duration) -> bool {
        let stage = self.lock();
        let (stage, result) = self
            .signal
            .wait_timeout_while(stage, timeout, |stage| {
                stage.state == RunnerState::Running
            })
            .unwrap_or_else(PoisonError::into_inner);
        drop(stage);
        !result.timed_out()
    }

    fn wait<'a>(&self, stage: MutexGuard<'a, Stage<H>>) -> MutexGuard<'a, Stage<H>> {
        self.signal.wait(stage).unwrap_or_else(PoisonError::into_inner)
    }
}

impl<H: DialogueHost> Handoff<H> {
    fn present_line(&self, line: PresentedLine) -> Result<(), DialogueError> {
        let mut stage = self.lock();
        if stage.cancelled {
            return Err(DialogueError::Cancelled);
        }
        stage.host.on_line(&line);
        stage.slot = Slot::Line {
            line,
            finished: false,
        };
        stage.state = RunnerState::Waiting;
        self.signal.notify_all();

        while !stage.cancelled && stage.pending_line().is_some() {
            stage = self.wait(stage);
        }
        stage.slot = Slot::Empty;
        stage.state = RunnerState::Running;
        if stage.cancelled {
            return Err(DialogueError::Cancelled);
        }
        Ok(())
    }

    fn present_options(
        &self,
        options: Vec<DialogueOption>,
        timeout: Option<Duration>,
    ) -> Result<usize, DialogueError> {
        let fallback = options.iter().position(|o| o.available).unwrap_or(0);
        let mut stage = self.lock();
        if stage.cancelled {
            return Err(DialogueError::Cancelled);
        }
        stage.host.on_options(&options);
        stage.slot = Slot::Options {
            options,
            selected: None,
        };
        stage.state = RunnerState::Waiting;
        self.signal.notify_all();

        let deadline = timeout.map(|t| Instant::now() + t);
        let choice = loop {
            if stage.cancelled {
                break None;
            }
            if let Slot::Options {
                selected: Some(index),
                ..
            } = stage.slot
            {
                break Some(index);
            }
            match deadline {
                None => stage = self.wait(stage),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        log::warn!("option selection timed out; choosing option {fallback}");
                        break Some(fallback);
                    }
                    stage = self
                        .signal
                        .wait_timeout(stage, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                }
            }
        };
        stage.slot = Slot::Empty;
        stage.state = RunnerState::Running;
        choice.ok_or(DialogueError::Cancelled)
    }
}

/// Resets the stage to stopped when the dialogue thread exits, however it exits.
pub(crate) struct StopGuard<H>(pub(crate) Arc<Handoff<H>>);

impl<H> Drop for StopGuard<H> {
    fn drop(&mut self) {
        self.0.halt();
    }
}

/// VM callbacks routed through the stage. Lives on the dialogue thread.
pub(crate) struct StageHandler<H> {
    pub(crate) handoff: Arc<Handoff<H>>,
    pub(crate) program: Arc<DialogueProgram>,
    pub(crate) option_timeout: Option<Duration>,
    pub(crate) command_errors: CommandErrorPolicy,
}

impl<H: DialogueHost> StageHandler<H> {
    fn notify(&self, f: impl FnOnce(&mut Stage<H>)) -> Result<(), DialogueError> {
        self.handoff.update(|stage| {
            if stage.cancelled {
                return Err(DialogueError::Cancelled);
            }
            f(stage);
            Ok(())
        })
    }
}

impl<H: DialogueHost> DialogueHandler for StageHandler<H> {
    fn node_start(&mut self, node: &str) -> Result<(), DialogueError> {
        self.notify(|stage| {
            stage.current_node = Some(node.to_string());
            stage.host.on_node_start(node);
        })
    }

    fn prepare_for_lines(&mut self, line_ids: &[String]) -> Result<(), DialogueError> {
        self.notify(|stage| stage.host.on_prepare_for_lines(line_ids))
    }

    fn line(&mut self, line: Line) -> Result<(), DialogueError> {
        let presented = PresentedLine {
            text: self.program.render(&line),
            last_line: self.program.is_last_line(&line),
            line,
        };
        log::debug!("line {}: {}", presented.line.id, presented.text);
        self.handoff.present_line(presented)
    }

    fn options(&mut self, options: &[OfferedOption]) -> Result<usize, DialogueError> {
        let rendered = options
            .iter()
            .enumerate()
            .map(|(index, option)| DialogueOption {
                index,
                text: self.program.render(&option.line),
                line: option.line.clone(),
                available: option.available,
            })
            .collect();
        self.handoff.present_options(rendered, self.option_timeout)
    }

    fn command(&mut self, node: &str, text: &str) -> Result<(), DialogueError> {
        log::debug!("run command: {text}");
        let result = self.handoff.update(|stage| {
            if stage.cancelled {
                return Err(DialogueError::Cancelled);
            }
            let Stage {
                host, variables, ..
            } = stage;
            Ok(Command::parse(text).and_then(|command| host.on_command(&command, variables)))
        })?;
        match result {
            Ok(()) => Ok(()),
            Err(source) => match self.command_errors {
                CommandErrorPolicy::AbortNode => Err(DialogueError::Command {
                    node: node.to_string(),
                    source,
                }),
                CommandErrorPolicy::Continue => {
                    log::warn!("node {node}: {source}; continuing");
                    Ok(())
                }
            },
        }
    }

    fn node_complete(&mut self, node: &str) -> Result<(), DialogueError> {
        self.notify(|stage| stage.host.on_node_complete(node))
    }

    fn dialogue_complete(&mut self) -> Result<(), DialogueError> {
        self.notify(|stage| stage.host.on_dialogue_complete())
    }
}

/// Variable access for the VM, taken under the stage lock per operation.
pub(crate) struct StageVariables<H>(pub(crate) Arc<Handoff<H>>);

impl<H> VariableStorage for StageVariables<H> {
    fn get(&self, name: &str) -> Option<Value> {
        self.0.lock().variables.get(name).cloned()
    }

    fn set(&mut self, name: &str, value: Value) {
        self.0.lock().variables.insert(name, value);
    }
}
