//! Compiled dialogue program: nodes, headers and instructions.
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::HashMap;
use thiserror::Error;

use super::value::{Value, VariableStorage};
use crate::constants::PROGRAM_FORMAT_VERSION;

/// Errors raised while loading the program or its string table.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("resource {0} not found")]
    Missing(String),
    #[error("resource {resource} is malformed: {source}")]
    Malformed {
        resource: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("program format version {found} is not supported (expected {expected})")]
    Version { found: u32, expected: u32 },
    #[error("node {node}: {reason}")]
    Invalid { node: String, reason: String },
    #[error("reading resource {resource} failed: {source}")]
    Io {
        resource: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Script-supplied value: a literal or a variable reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operand {
    Literal(Value),
    Var(String),
}

impl Operand {
    /// Resolve against the variable store; unset variables read as `false`.
    #[must_use]
    pub fn resolve<V: VariableStorage + ?Sized>(&self, vars: &V) -> Value {
        match self {
            Self::Literal(value) => value.clone(),
            Self::Var(name) => vars.get(name).unwrap_or(Value::Bool(false)),
        }
    }
}

/// Test on a single variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub var: String,
    /// Compare for equality; when absent the variable's truthiness is used.
    #[serde(default)]
    pub equals: Option<Value>,
    #[serde(default)]
    pub negate: bool,
}

impl Condition {
    #[must_use]
    pub fn holds<V: VariableStorage + ?Sized>(&self, vars: &V) -> bool {
        let current = vars.get(&self.var);
        let result = match (&self.equals, current) {
            (Some(expected), Some(actual)) => *expected == actual,
            (Some(_), None) => false,
            (None, Some(actual)) => actual.is_truthy(),
            (None, None) => false,
        };
        result != self.negate
    }
}

/// Values substituted into a line template, in placeholder order.
pub type Substitutions = SmallVec<[Operand; 2]>;

/// One VM instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Instruction {
    Label {
        name: String,
    },
    Line {
        id: String,
        #[serde(default)]
        substitutions: Substitutions,
    },
    AddOption {
        id: String,
        target: String,
        #[serde(default)]
        substitutions: Substitutions,
        #[serde(default)]
        condition: Option<Condition>,
    },
    ShowOptions,
    Command {
        text: String,
    },
    Set {
        var: String,
        value: Operand,
    },
    Add {
        var: String,
        amount: f64,
    },
    Jump {
        label: String,
    },
    JumpIf {
        condition: Condition,
        label: String,
    },
    RunNode {
        node: String,
    },
    Stop,
}

/// Key/value metadata written above a node in the script source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub key: String,
    pub value: String,
}

/// A named unit of compiled script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    #[serde(default)]
    pub headers: Vec<Header>,
    pub instructions: Vec<Instruction>,
    #[serde(skip)]
    labels: HashMap<String, usize>,
}

impl Node {
    #[must_use]
    pub fn new(name: impl Into<String>, instructions: Vec<Instruction>) -> Self {
        let mut node = Self {
            name: name.into(),
            headers: Vec::new(),
            instructions,
            labels: HashMap::new(),
        };
        node.index_labels();
        node
    }

    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(Header {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    /// Value of the first header named `key`.
    #[must_use]
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.key == key)
            .map(|h| h.value.as_str())
    }

    /// Instruction index a label points at.
    #[must_use]
    pub fn label(&self, name: &str) -> Option<usize> {
        self.labels.get(name).copied()
    }

    /// Every line id this node can present, in instruction order.
    #[must_use]
    pub fn line_ids(&self) -> Vec<String> {
        self.instructions
            .iter()
            .filter_map(|inst| match inst {
                Instruction::Line { id, .. } | Instruction::AddOption { id, .. } => {
                    Some(id.clone())
                }
                _ => None,
            })
            .collect()
    }

    fn index_labels(&mut self) {
        self.labels = self
            .instructions
            .iter()
            .enumerate()
            .filter_map(|(index, inst)| match inst {
                Instruction::Label { name } => Some((name.clone(), index)),
                _ => None,
            })
            .collect();
    }
}

#[derive(Debug, Deserialize)]
struct ProgramFile {
    version: u32,
    nodes: Vec<Node>,
}

/// Immutable compiled program holding every node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    nodes: HashMap<String, Node>,
}

impl Program {
    /// Parse and validate a compiled program.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is malformed, has the wrong format
    /// version, or references labels or nodes that do not exist.
    pub fn from_json(resource: &str, json: &str) -> Result<Self, LoadError> {
        let file: ProgramFile =
            serde_json::from_str(json).map_err(|source| LoadError::Malformed {
                resource: resource.to_string(),
                source,
            })?;
        if file.version != PROGRAM_FORMAT_VERSION {
            return Err(LoadError::Version {
                found: file.version,
                expected: PROGRAM_FORMAT_VERSION,
            });
        }
        Self::from_nodes(file.nodes)
    }

    /// Build a program from nodes, validating jump targets.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Invalid`] for duplicate nodes or dangling targets.
    pub fn from_nodes(nodes: Vec<Node>) -> Result<Self, LoadError> {
        let mut map = HashMap::with_capacity(nodes.len());
        for mut node in nodes {
            node.index_labels();
            if map.contains_key(&node.name) {
                return Err(invalid(&node.name, "defined more than once"));
            }
            map.insert(node.name.clone(), node);
        }
        let program = Self { nodes: map };
        program.validate()?;
        Ok(program)
    }

    fn validate(&self) -> Result<(), LoadError> {
        for node in self.nodes.values() {
            for inst in &node.instructions {
                match inst {
                    Instruction::Jump { label }
                    | Instruction::JumpIf { label, .. }
                    | Instruction::AddOption { target: label, .. }
                        if node.label(label).is_none() =>
                    {
                        return Err(invalid(&node.name, &format!("unknown label {label}")));
                    }
                    Instruction::RunNode { node: target } if !self.nodes.contains_key(target) => {
                        return Err(invalid(&node.name, &format!("unknown node {target}")));
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.get(name)
    }

    #[must_use]
    pub fn has_node(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn node_names(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

fn invalid(node: &str, reason: &str) -> LoadError {
    LoadError::Invalid {
        node: node.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialogue::value::Variables;

    #[test]
    fn parses_tagged_instructions_and_headers() {
        let json = r#"{
            "version": 1,
            "nodes": [{
                "name": "Start",
                "headers": [{"key": "portrait", "value": "bald:suit"}],
                "instructions": [
                    {"op": "line", "id": "line:1", "substitutions": [{"var": "$cash"}]},
                    {"op": "add_option", "id": "line:2", "target": "yes"},
                    {"op": "show_options"},
                    {"op": "label", "name": "yes"},
                    {"op": "set", "var": "$met", "value": {"literal": true}},
                    {"op": "stop"}
                ]
            }]
        }"#;
        let program = Program::from_json("test", json).unwrap();
        let node = program.node("Start").unwrap();
        assert_eq!(node.header("portrait"), Some("bald:suit"));
        assert_eq!(node.label("yes"), Some(3));
        assert_eq!(node.line_ids(), vec!["line:1", "line:2"]);
    }

    #[test]
    fn rejects_wrong_version() {
        let err = Program::from_json("test", r#"{"version": 9, "nodes": []}"#).unwrap_err();
        assert!(matches!(err, LoadError::Version { found: 9, .. }));
    }

    #[test]
    fn rejects_dangling_targets() {
        let bad_label = Node::new(
            "A",
            vec![Instruction::Jump {
                label: "nowhere".to_string(),
            }],
        );
        assert!(matches!(
            Program::from_nodes(vec![bad_label]),
            Err(LoadError::Invalid { .. })
        ));

        let bad_node = Node::new(
            "A",
            vec![Instruction::RunNode {
                node: "Missing".to_string(),
            }],
        );
        let err = Program::from_nodes(vec![bad_node]).unwrap_err();
        assert!(err.to_string().contains("unknown node Missing"));
    }

    #[test]
    fn rejects_duplicate_nodes() {
        let err = Program::from_nodes(vec![Node::new("A", vec![]), Node::new("A", vec![])])
            .unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn malformed_json_names_the_resource() {
        let err = Program::from_json("game.program.json", "{").unwrap_err();
        assert!(err.to_string().contains("game.program.json"));
    }

    #[test]
    fn conditions_compare_or_test_truthiness() {
        let vars: Variables = [("$rude", Value::Bool(true)), ("$count", Value::from(2))]
            .into_iter()
            .collect();
        let truthy = Condition {
            var: "$rude".to_string(),
            equals: None,
            negate: false,
        };
        let equals = Condition {
            var: "$count".to_string(),
            equals: Some(Value::from(2)),
            negate: true,
        };
        assert!(truthy.holds(&vars));
        assert!(!equals.holds(&vars));
        assert_eq!(
            Operand::Var("$unset".to_string()).resolve(&vars),
            Value::Bool(false)
        );
    }
}
