//! Teller Game Engine
//!
//! Platform-agnostic core for the Teller bank-counter game: the day scheduler
//! that decides which customer comes next, and the dialogue engine that runs
//! each encounter's script on its own thread while the frame loop presents it.
//! This crate has no rendering or input dependencies.

pub mod constants;
pub mod day;
pub mod dialogue;
pub mod rng;
pub mod session;

// Re-export commonly used types
pub use day::{Calendar, Day, DayConfig, DayConfigError, DayDefinition, DepositSlip, SlipKind};
pub use dialogue::{
    Command, CommandError, CommandErrorPolicy, CommandSet, DialogueError, DialogueHost,
    DialogueOption, DialogueProgram, DialogueRunner, GameState, Line, LoadError, NodeOutcome,
    Portrait, PortraitCatalog, PresentedLine, ResourceLoader, RunnerConfig, RunnerError,
    RunnerState, Value, Variables,
};
pub use rng::{CountingRng, RngStreams};
pub use session::{DaySession, SessionEvent};
