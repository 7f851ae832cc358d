//! Localized string table and line rendering.
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::HashMap;
use thiserror::Error;

use super::program::LoadError;
use super::value::Value;
use crate::constants::LAST_LINE_TAG;

/// Tags attached to a string-table row.
pub type LineTags = SmallVec<[String; 2]>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RenderError {
    #[error("no string table entry for line {0}")]
    MissingLine(String),
    #[error("line {id} references substitution {{{index}}} but only {available} were supplied")]
    MissingSubstitution {
        id: String,
        index: usize,
        available: usize,
    },
}

/// A line the VM asks the host to present, with resolved substitutions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Line {
    pub id: String,
    #[serde(default)]
    pub substitutions: SmallVec<[Value; 2]>,
}

impl Line {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            substitutions: SmallVec::new(),
        }
    }

    #[must_use]
    pub fn with_substitution(mut self, value: impl Into<Value>) -> Self {
        self.substitutions.push(value.into());
        self
    }
}

/// Template text and tags for one line id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StringEntry {
    pub text: String,
    #[serde(default)]
    pub tags: LineTags,
}

#[derive(Debug, Deserialize)]
struct StringTableFile {
    locale: String,
    lines: HashMap<String, StringEntry>,
}

/// Line id to template lookup for a single locale.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StringTable {
    locale: String,
    table: HashMap<String, StringEntry>,
}

impl StringTable {
    /// Parse a string table document.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Malformed`] if the JSON cannot be parsed.
    pub fn from_json(resource: &str, json: &str) -> Result<Self, LoadError> {
        let file: StringTableFile =
            serde_json::from_str(json).map_err(|source| LoadError::Malformed {
                resource: resource.to_string(),
                source,
            })?;
        Ok(Self {
            locale: file.locale,
            table: file.lines,
        })
    }

    #[must_use]
    pub fn from_entries(
        locale: impl Into<String>,
        entries: impl IntoIterator<Item = (String, StringEntry)>,
    ) -> Self {
        Self {
            locale: locale.into(),
            table: entries.into_iter().collect(),
        }
    }

    #[must_use]
    pub fn locale(&self) -> &str {
        &self.locale
    }

    #[must_use]
    pub fn entry(&self, id: &str) -> Option<&StringEntry> {
        self.table.get(id)
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.table.contains_key(id)
    }

    /// Fill `{0}`, `{1}`, ... in the line's template. `{{` and `}}` escape braces.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is unknown or a placeholder has no value.
    pub fn render(&self, line: &Line) -> Result<String, RenderError> {
        let entry = self
            .table
            .get(&line.id)
            .ok_or_else(|| RenderError::MissingLine(line.id.clone()))?;
        substitute(&line.id, &entry.text, &line.substitutions)
    }

    /// Whether the line carries the last-line tag.
    #[must_use]
    pub fn is_last_line(&self, line: &Line) -> bool {
        self.table
            .get(&line.id)
            .is_some_and(|entry| entry.tags.iter().any(|tag| tag == LAST_LINE_TAG))
    }
}

fn substitute(id: &str, template: &str, values: &[Value]) -> Result<String, RenderError> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut digits = String::new();
                while let Some(&d) = chars.peek() {
                    if d == '}' {
                        break;
                    }
                    digits.push(d);
                    chars.next();
                }
                let closed = chars.next() == Some('}');
                match digits.parse::<usize>() {
                    Ok(index) if closed => {
                        let value = values.get(index).ok_or(RenderError::MissingSubstitution {
                            id: id.to_string(),
                            index,
                            available: values.len(),
                        })?;
                        out.push_str(&value.to_string());
                    }
                    _ => {
                        out.push('{');
                        out.push_str(&digits);
                        if closed {
                            out.push('}');
                        }
                    }
                }
            }
            other => out.push(other),
        }
    }
    Ok(out)
}
