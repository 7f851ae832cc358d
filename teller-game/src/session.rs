//! Binds a [`Day`] to a [`DialogueRunner`] for the scene loop.
use std::time::Duration;

use crate::day::Day;
use crate::dialogue::{DialogueError, DialogueHost, DialogueRunner, NodeOutcome, RunnerError};

/// What happened during one [`DaySession::update`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A node is still running or waiting on presentation.
    Idle,
    NodeStarted(String),
    NodeFinished {
        node: String,
        outcome: NodeOutcome,
    },
    /// The terminal node finished or a fatal error ended the day.
    DayOver,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Phase {
    Between,
    Running { node: String, terminal: bool },
    Over,
}

/// One day of encounters driven from the frame thread.
pub struct DaySession<H: DialogueHost> {
    day: Day,
    runner: DialogueRunner<H>,
    phase: Phase,
    failure: Option<DialogueError>,
    nodes_run: usize,
}

impl<H: DialogueHost> DaySession<H> {
    pub const fn new(day: Day, runner: DialogueRunner<H>) -> Self {
        Self {
            day,
            runner,
            phase: Phase::Between,
            failure: None,
            nodes_run: 0,
        }
    }

    /// Advance the session. Starts the next node when none is running and
    /// reports finished nodes. A node is reported finished on the first
    /// update that observes the runner stopped, so a frame loop that settles
    /// the runner before updating sees the same events for the same inputs.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError`] if the scheduled node cannot be started.
    pub fn update(&mut self, elapsed: Duration) -> Result<SessionEvent, RunnerError> {
        match &self.phase {
            Phase::Over => Ok(SessionEvent::DayOver),
            Phase::Running { node, terminal } => {
                if self.runner.is_running() {
                    return Ok(SessionEvent::Idle);
                }
                // Stopped means the worker is past the VM and about to exit.
                let outcome = self.runner.join().unwrap_or(Err(DialogueError::Cancelled));
                let node = node.clone();
                let ends_day = *terminal;
                self.phase = Phase::Between;
                if let Err(err) = &outcome {
                    if err.is_fatal() {
                        log::warn!("day {} ended by node {node}: {err}", self.day.index());
                        self.failure = Some(err.clone());
                        self.phase = Phase::Over;
                    } else {
                        log::warn!("node {node} aborted: {err}");
                    }
                }
                if ends_day {
                    self.phase = Phase::Over;
                }
                Ok(SessionEvent::NodeFinished { node, outcome })
            }
            Phase::Between => {
                let terminal = self.day.is_over(elapsed);
                let node = self.day.next(elapsed).to_string();
                self.runner.start_node(&node)?;
                self.nodes_run += 1;
                self.phase = Phase::Running {
                    node: node.clone(),
                    terminal,
                };
                Ok(SessionEvent::NodeStarted(node))
            }
        }
    }

    #[must_use]
    pub fn is_over(&self) -> bool {
        self.phase == Phase::Over
    }

    /// The fatal error that ended the day early, if any.
    #[must_use]
    pub const fn failure(&self) -> Option<&DialogueError> {
        self.failure.as_ref()
    }

    #[must_use]
    pub const fn nodes_run(&self) -> usize {
        self.nodes_run
    }

    #[must_use]
    pub const fn day(&self) -> &Day {
        &self.day
    }

    pub const fn day_mut(&mut self) -> &mut Day {
        &mut self.day
    }

    #[must_use]
    pub const fn runner(&self) -> &DialogueRunner<H> {
        &self.runner
    }

    pub const fn runner_mut(&mut self) -> &mut DialogueRunner<H> {
        &mut self.runner
    }

    /// Tear the session apart, e.g. to carry the runner into the next day.
    pub fn into_parts(self) -> (Day, DialogueRunner<H>) {
        (self.day, self.runner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::day::DayDefinition;
    use crate::dialogue::{
        Command, CommandError, DialogueOption, DialogueProgram, Instruction, Node, PresentedLine,
        Program, RunnerConfig, StringEntry, StringTable, Variables,
    };
    use crate::rng::CountingRng;
    use std::sync::Arc;

    struct Quiet;

    impl DialogueHost for Quiet {
        fn on_line(&mut self, _line: &PresentedLine) {}
        fn on_options(&mut self, _options: &[DialogueOption]) {}
        fn on_command(&mut self, command: &Command, _vars: &mut Variables) -> Result<(), CommandError> {
            Err(CommandError::Unknown(command.name().to_string()))
        }
    }

    fn said(id: &str) -> Node {
        Node::new(
            id,
            vec![Instruction::Line {
                id: "hi".to_string(),
                substitutions: Default::default(),
            }],
        )
    }

    fn session(day_length: Duration) -> DaySession<Quiet> {
        let grumpy = Node::new(
            "Grumpy",
            vec![Instruction::Command {
                text: "shout".to_string(),
            }],
        );
        let program = Program::from_nodes(vec![said("Intro"), said("Cust"), said("End"), grumpy])
            .unwrap();
        let strings = StringTable::from_entries(
            "en_US",
            [(
                "hi".to_string(),
                StringEntry {
                    text: "Hi".to_string(),
                    tags: Default::default(),
                },
            )],
        );
        let runner = DialogueRunner::new(
            Arc::new(DialogueProgram::new(program, strings)),
            Quiet,
            Variables::new(),
            RunnerConfig::default(),
        );
        let definition = DayDefinition {
            sequence: vec!["Intro".to_string(), "Grumpy".to_string()],
            random: vec!["Cust".to_string()],
            end_node: "End".to_string(),
        };
        DaySession::new(Day::new(0, definition, day_length, CountingRng::new(1)), runner)
    }

    fn drive(session: &mut DaySession<Quiet>, elapsed: Duration) -> SessionEvent {
        loop {
            session.runner().finish_line();
            match session.update(elapsed).unwrap() {
                SessionEvent::Idle => std::thread::sleep(Duration::from_millis(1)),
                event => return event,
            }
        }
    }

    #[test]
    fn nodes_run_in_day_order_until_the_terminal_node() {
        let mut session = session(Duration::from_secs(60));
        let early = Duration::from_secs(1);
        assert_eq!(drive(&mut session, early), SessionEvent::NodeStarted("Intro".into()));
        assert_eq!(
            drive(&mut session, early),
            SessionEvent::NodeFinished {
                node: "Intro".into(),
                outcome: Ok(())
            }
        );

        assert_eq!(drive(&mut session, early), SessionEvent::NodeStarted("Grumpy".into()));
        let SessionEvent::NodeFinished { outcome, .. } = drive(&mut session, early) else {
            panic!("expected Grumpy to finish");
        };
        assert!(matches!(outcome, Err(DialogueError::Command { .. })));
        assert!(!session.is_over());

        let late = Duration::from_secs(60);
        assert_eq!(drive(&mut session, late), SessionEvent::NodeStarted("End".into()));
        assert!(matches!(
            drive(&mut session, late),
            SessionEvent::NodeFinished { outcome: Ok(()), .. }
        ));
        assert_eq!(drive(&mut session, late), SessionEvent::DayOver);
        assert!(session.is_over());
        assert!(session.failure().is_none());
        assert_eq!(session.nodes_run(), 3);
        assert_eq!(session.day().cursor(), 2);
    }

    #[test]
    fn fatal_errors_end_the_day() {
        let mut session = session(Duration::from_secs(60));
        assert!(matches!(
            drive(&mut session, Duration::ZERO),
            SessionEvent::NodeStarted(_)
        ));
        session.runner().cancel();
        let SessionEvent::NodeFinished { outcome, .. } = drive(&mut session, Duration::ZERO) else {
            panic!("expected the node to finish");
        };
        assert_eq!(outcome, Err(DialogueError::Cancelled));
        assert_eq!(drive(&mut session, Duration::ZERO), SessionEvent::DayOver);
        assert_eq!(session.failure(), Some(&DialogueError::Cancelled));
    }
}
