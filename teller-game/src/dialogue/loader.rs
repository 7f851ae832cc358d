//! Loading the compiled program and its string table.
use std::convert::Infallible;
use std::path::PathBuf;

use super::program::{LoadError, Program};
use super::strings::{Line, StringTable};
use crate::constants::{DEFAULT_LOCALE, DEFAULT_PROGRAM, RENDER_ERROR_MARKER};

const BUNDLED_PROGRAM: &str = include_str!("../../assets/dialogue/game.program.json");
const BUNDLED_STRINGS: &str = include_str!("../../assets/dialogue/game.en_US.strings.json");

/// Source of named text resources.
/// Platform-specific implementations should provide this
pub trait ResourceLoader {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Read a resource, returning `Ok(None)` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the resource exists but cannot be read.
    fn load_resource(&self, name: &str) -> Result<Option<String>, Self::Error>;
}

/// Resources compiled into the binary.
#[derive(Debug, Clone, Copy, Default)]
pub struct BundledResources;

impl ResourceLoader for BundledResources {
    type Error = Infallible;

    fn load_resource(&self, name: &str) -> Result<Option<String>, Self::Error> {
        let text = match name {
            "game.program.json" => Some(BUNDLED_PROGRAM),
            "game.en_US.strings.json" => Some(BUNDLED_STRINGS),
            _ => None,
        };
        Ok(text.map(str::to_string))
    }
}

/// Resources read from a directory on disk.
#[derive(Debug, Clone)]
pub struct DirectoryLoader {
    root: PathBuf,
}

impl DirectoryLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ResourceLoader for DirectoryLoader {
    type Error = std::io::Error;

    fn load_resource(&self, name: &str) -> Result<Option<String>, Self::Error> {
        match std::fs::read_to_string(self.root.join(name)) {
            Ok(text) => Ok(Some(text)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }
}

/// A compiled program paired with the string table for one locale.
#[derive(Debug, Clone, Default)]
pub struct DialogueProgram {
    program: Program,
    strings: StringTable,
}

impl DialogueProgram {
    #[must_use]
    pub const fn new(program: Program, strings: StringTable) -> Self {
        Self { program, strings }
    }

    /// Load `<name>.program.json` and `<name>.<locale>.strings.json`.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError`] if either resource is absent, unreadable or malformed.
    pub fn load<L: ResourceLoader>(loader: &L, name: &str, locale: &str) -> Result<Self, LoadError> {
        let program_name = format!("{name}.program.json");
        let strings_name = format!("{name}.{locale}.strings.json");
        let program = Program::from_json(&program_name, &read(loader, &program_name)?)?;
        let strings = StringTable::from_json(&strings_name, &read(loader, &strings_name)?)?;
        log::debug!(
            "loaded dialogue program {name} ({} nodes, locale {})",
            program.len(),
            strings.locale()
        );
        Ok(Self { program, strings })
    }

    /// The program bundled with the game.
    ///
    /// # Errors
    ///
    /// Returns an error only if the bundled assets are corrupt.
    pub fn load_default() -> Result<Self, LoadError> {
        Self::load(&BundledResources, DEFAULT_PROGRAM, DEFAULT_LOCALE)
    }

    #[must_use]
    pub const fn program(&self) -> &Program {
        &self.program
    }

    #[must_use]
    pub const fn strings(&self) -> &StringTable {
        &self.strings
    }

    /// Render a line for display. Lines that cannot be rendered show the
    /// error marker instead of failing.
    #[must_use]
    pub fn render(&self, line: &Line) -> String {
        match self.strings.render(line) {
            Ok(text) => text,
            Err(err) => {
                log::warn!("error rendering line {}: {err}", line.id);
                RENDER_ERROR_MARKER.to_string()
            }
        }
    }

    #[must_use]
    pub fn is_last_line(&self, line: &Line) -> bool {
        self.strings.is_last_line(line)
    }
}

fn read<L: ResourceLoader>(loader: &L, name: &str) -> Result<String, LoadError> {
    loader
        .load_resource(name)
        .map_err(|err| LoadError::Io {
            resource: name.to_string(),
            source: Box::new(err),
        })?
        .ok_or_else(|| LoadError::Missing(name.to_string()))
}
