//! Runs dialogue nodes on a dedicated thread and exposes the frame-side API.
use rand::rngs::SmallRng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;

use super::handoff::{
    CommandErrorPolicy, Handoff, RunnerState, Stage, StageHandler, StageVariables, StopGuard,
};
use super::host::DialogueHost;
use super::loader::DialogueProgram;
use super::portrait::{Portrait, PortraitCatalog, resolve_portrait};
use super::strings::Line;
use super::value::Variables;
use super::vm::{DialogueError, VirtualMachine};
use crate::constants::VM_THREAD_NAME;
use crate::rng::{CountingRng, RngStreams};

/// Result of running one node to completion.
pub type NodeOutcome = Result<(), DialogueError>;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("node {0} is still running")]
    AlreadyRunning(String),
    #[error("node {0} does not exist")]
    UnknownNode(String),
    #[error("failed to spawn dialogue thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Runner tuning.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Pick the first available option when the frame thread does not
    /// choose within this long. `None` waits forever.
    pub option_timeout: Option<Duration>,
    pub command_errors: CommandErrorPolicy,
    pub portraits: PortraitCatalog,
    /// Seed for random portrait selection.
    pub seed: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            option_timeout: None,
            command_errors: CommandErrorPolicy::default(),
            portraits: PortraitCatalog::load_from_static(),
            seed: 0,
        }
    }
}

/// Snapshot of what the script has done so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    pub current_node: Option<String>,
    pub variables: Variables,
}

/// Executes dialogue nodes one at a time on a background thread.
///
/// The frame thread drives presentation: it polls [`Self::with_stage`] or
/// [`Self::wait_until_settled`], animates whatever line is pending, and
/// calls [`Self::finish_line`] or [`Self::select_option`] to let the script
/// continue.
pub struct DialogueRunner<H: DialogueHost> {
    program: Arc<DialogueProgram>,
    handoff: Arc<Handoff<H>>,
    worker: Option<JoinHandle<NodeOutcome>>,
    option_timeout: Option<Duration>,
    command_errors: CommandErrorPolicy,
    portraits: PortraitCatalog,
    portrait_rng: CountingRng<SmallRng>,
    portrait: Option<(String, Option<Portrait>)>,
}

impl<H: DialogueHost> DialogueRunner<H> {
    pub fn new(
        program: Arc<DialogueProgram>,
        host: H,
        variables: Variables,
        config: RunnerConfig,
    ) -> Self {
        Self {
            program,
            handoff: Arc::new(Handoff::new(host, variables)),
            worker: None,
            option_timeout: config.option_timeout,
            command_errors: config.command_errors,
            portraits: config.portraits,
            portrait_rng: RngStreams::from_user_seed(config.seed).portrait(),
            portrait: None,
        }
    }

    /// Start executing `name` on a fresh dialogue thread.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::AlreadyRunning`] if a node has not finished,
    /// [`RunnerError::UnknownNode`] if the program lacks `name`, and
    /// [`RunnerError::Spawn`] if the thread cannot be created.
    pub fn start_node(&mut self, name: &str) -> Result<(), RunnerError> {
        {
            let stage = self.handoff.lock();
            if stage.state() != RunnerState::Stopped {
                let running = stage.current_node().unwrap_or_default().to_string();
                return Err(RunnerError::AlreadyRunning(running));
            }
        }
        if !self.program.program().has_node(name) {
            return Err(RunnerError::UnknownNode(name.to_string()));
        }
        if let Some(outcome) = self.join()
            && let Err(err) = outcome
        {
            log::debug!("discarding unpolled outcome: {err}");
        }

        log::debug!("starting node {name}");
        self.portrait = None;
        self.handoff.begin(name);

        let handoff = Arc::clone(&self.handoff);
        let program = Arc::clone(&self.program);
        let mut handler = StageHandler {
            handoff: Arc::clone(&self.handoff),
            program: Arc::clone(&self.program),
            option_timeout: self.option_timeout,
            command_errors: self.command_errors,
        };
        let start = name.to_string();
        let spawned = thread::Builder::new()
            .name(VM_THREAD_NAME.to_string())
            .spawn(move || {
                let _guard = StopGuard(Arc::clone(&handoff));
                let mut vars = StageVariables(handoff);
                let outcome =
                    VirtualMachine::new(program.program()).run(&start, &mut handler, &mut vars);
                if let Err(err) = &outcome {
                    log::debug!("node {start} ended: {err}");
                }
                outcome
            });
        match spawned {
            Ok(handle) => {
                self.worker = Some(handle);
                Ok(())
            }
            Err(err) => {
                self.handoff.halt();
                Err(RunnerError::Spawn(err))
            }
        }
    }

    /// Outcome of the last node if its thread has exited. Never blocks.
    pub fn poll(&mut self) -> Option<NodeOutcome> {
        if self.worker.as_ref().is_some_and(JoinHandle::is_finished) {
            return self.join();
        }
        None
    }

    /// Block until the dialogue thread exits and return its outcome.
    /// `None` if no node was started since the last join.
    pub fn join(&mut self) -> Option<NodeOutcome> {
        let handle = self.worker.take()?;
        Some(handle.join().unwrap_or_else(|_| {
            log::warn!("dialogue thread panicked");
            Err(DialogueError::Panicked)
        }))
    }

    /// Lock the stage, run `f`, then wake the dialogue thread.
    pub fn with_stage<R>(&self, f: impl FnOnce(&mut Stage<H>) -> R) -> R {
        self.handoff.update(f)
    }

    /// Signal that the pending line has been fully presented.
    pub fn finish_line(&self) -> bool {
        self.handoff.update(Stage::finish_line)
    }

    pub fn select_option(&self, index: usize) -> bool {
        self.handoff.update(|stage| stage.select_option(index))
    }

    /// Ask the running node to stop at its next suspension point.
    pub fn cancel(&self) {
        self.handoff.cancel();
    }

    /// Block until the dialogue thread is waiting on the frame thread or has
    /// stopped. Returns false on timeout.
    pub fn wait_until_settled(&self, timeout: Duration) -> bool {
        self.handoff.wait_until_settled(timeout)
    }

    #[must_use]
    pub fn state(&self) -> RunnerState {
        self.handoff.lock().state()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state() != RunnerState::Stopped
    }

    /// The node executing now, or the last one that ran.
    #[must_use]
    pub fn current_node(&self) -> Option<String> {
        self.handoff.lock().current_node().map(str::to_string)
    }

    #[must_use]
    pub fn variables(&self) -> Variables {
        self.handoff.lock().variables.clone()
    }

    #[must_use]
    pub fn game_state(&self) -> GameState {
        let stage = self.handoff.lock();
        GameState {
            current_node: stage.current_node().map(str::to_string),
            variables: stage.variables.clone(),
        }
    }

    #[must_use]
    pub fn program(&self) -> &DialogueProgram {
        &self.program
    }

    #[must_use]
    pub fn render(&self, line: &Line) -> String {
        self.program.render(line)
    }

    #[must_use]
    pub fn is_last_line(&self, line: &Line) -> bool {
        self.program.is_last_line(line)
    }

    /// Portrait for the current node, resolved on first request and cached
    /// until another node starts.
    pub fn portrait(&mut self) -> Option<Portrait> {
        let node = self.current_node()?;
        if let Some((cached, portrait)) = &self.portrait
            && *cached == node
        {
            return portrait.clone();
        }
        let resolved = self
            .program
            .program()
            .node(&node)
            .and_then(|n| resolve_portrait(n, &self.portraits, &mut self.portrait_rng));
        self.portrait = Some((node, resolved.clone()));
        resolved
    }
}

impl<H: DialogueHost> Drop for DialogueRunner<H> {
    fn drop(&mut self) {
        self.cancel();
        if let Some(handle) = self.worker.take()
            && handle.join().is_err()
        {
            log::warn!("dialogue thread panicked during shutdown");
        }
    }
}
