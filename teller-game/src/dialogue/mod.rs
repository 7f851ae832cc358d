//! Dialogue program model, virtual machine and threaded runner.
pub mod command;
pub mod handoff;
pub mod host;
pub mod loader;
pub mod portrait;
pub mod program;
pub mod runner;
pub mod strings;
pub mod value;
pub mod vm;

pub use command::{Command, CommandError, CommandSet};
pub use handoff::{CommandErrorPolicy, RunnerState, Stage};
pub use host::{DialogueHost, DialogueOption, PresentedLine};
pub use loader::{BundledResources, DialogueProgram, DirectoryLoader, ResourceLoader};
pub use portrait::{Portrait, PortraitCatalog, resolve_portrait};
pub use program::{Condition, Header, Instruction, LoadError, Node, Operand, Program};
pub use runner::{DialogueRunner, GameState, NodeOutcome, RunnerConfig, RunnerError};
pub use strings::{Line, RenderError, StringEntry, StringTable};
pub use value::{Value, VariableStorage, Variables};
pub use vm::{DialogueError, DialogueHandler, OfferedOption, VirtualMachine};
