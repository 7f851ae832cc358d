pub mod host;
pub mod reports;
pub mod scene;
pub mod seeds;
pub mod tester;

pub use scene::{OptionPolicy, PlayPlan, PlaySummary, play};
pub use seeds::resolve_seed_inputs;
pub use tester::*;
