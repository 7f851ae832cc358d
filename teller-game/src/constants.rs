//! Shared identifiers and tuning values for the Teller engine.
//!
//! Script authors and the scene layer both depend on these strings, so they
//! live in one place instead of being scattered through the modules.

use std::time::Duration;

// Scheduling ---------------------------------------------------------------
/// Sequence entry that is replaced by a pick from the day's random pool.
pub const RANDOM_NODE_TOKEN: &str = "random";
/// Wall-clock budget of a single working day.
pub const DEFAULT_DAY_LENGTH: Duration = Duration::from_secs(180);

// Dialogue -----------------------------------------------------------------
/// Format version of the compiled dialogue program accepted by the loader.
pub const PROGRAM_FORMAT_VERSION: u32 = 1;
/// Locale the bundled string table is authored in.
pub const DEFAULT_LOCALE: &str = "en_US";
/// Name of the bundled dialogue program.
pub const DEFAULT_PROGRAM: &str = "game";
/// String-table tag marking the final line a customer says in a node.
pub const LAST_LINE_TAG: &str = "lastline";
/// Text shown in place of a line whose template cannot be rendered.
pub const RENDER_ERROR_MARKER: &str = "ERROR";
/// Node header selecting the customer portrait.
pub const PORTRAIT_HEADER: &str = "portrait";
/// Portrait header value requesting a random head/body pair.
pub const RANDOM_PORTRAIT: &str = "random";

// Threads ------------------------------------------------------------------
pub(crate) const VM_THREAD_NAME: &str = "dialogue-vm";
