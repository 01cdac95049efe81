//! Error types for SQLTrace

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// One step on the way from the top of a raw plan to an element inside it
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    /// Position in an array, or a line number for text formats
    Index(usize),
    /// Object key
    Key(String),
}

/// Location of an element inside a raw plan, rendered as a JSON pointer
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlanPath(Vec<PathSegment>);

impl PlanPath {
    /// The empty path, pointing at the whole input
    pub fn root() -> Self {
        Self::default()
    }

    /// Returns a copy of this path extended by an array index
    pub fn index(&self, index: usize) -> Self {
        let mut path = self.clone();
        path.0.push(PathSegment::Index(index));
        path
    }

    /// Returns a copy of this path extended by an object key
    pub fn key(&self, key: impl Into<String>) -> Self {
        let mut path = self.clone();
        path.0.push(PathSegment::Key(key.into()));
        path
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<PathSegment>> for PlanPath {
    fn from(segments: Vec<PathSegment>) -> Self {
        Self(segments)
    }
}

impl fmt::Display for PlanPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.0 {
            match segment {
                PathSegment::Index(index) => write!(f, "/{index}")?,
                PathSegment::Key(key) => write!(f, "/{}", key.replace('~', "~0").replace('/', "~1"))?,
            }
        }
        Ok(())
    }
}

/// What was wrong with a raw plan element
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    #[error("missing node type field '{field}'")]
    MissingNodeType { field: String },

    #[error("node type field '{field}' is not a string")]
    NodeTypeNotString { field: String },

    #[error("children field '{field}' is not an array")]
    ChildrenNotArray { field: String },

    #[error("plan entry is not an object")]
    NodeNotObject,

    #[error("field '{field}' must be a non-negative number")]
    InvalidNumber { field: String },

    #[error("field '{field}' must be a string")]
    InvalidString { field: String },

    #[error("child index {child} is out of bounds for {len} nodes")]
    ChildOutOfBounds { child: usize, len: usize },

    #[error("node {child} has more than one parent")]
    MultipleParents { child: usize },

    #[error("root indices do not match the nodes without a parent")]
    RootMismatch,

    #[error("plan contains a cycle")]
    Cycle,

    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("missing '{0}' in EXPLAIN output")]
    MissingSection(String),

    #[error("unrecognized EXPLAIN line: {0}")]
    UnrecognizedLine(String),

    #[error("empty EXPLAIN output")]
    EmptyOutput,
}

/// A raw plan could not be turned into a plan tree
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} at {path}")]
pub struct ParseError {
    pub path: PlanPath,
    pub kind: ParseErrorKind,
}

impl ParseError {
    pub fn new(path: PlanPath, kind: ParseErrorKind) -> Self {
        Self { path, kind }
    }

    pub fn at_root(kind: ParseErrorKind) -> Self {
        Self::new(PlanPath::root(), kind)
    }

    /// Error for a text-format line, numbered from zero
    pub fn at_line(line: usize, kind: ParseErrorKind) -> Self {
        Self::new(PlanPath::root().index(line), kind)
    }
}

/// Core error type for SQLTrace operations
#[derive(Error, Debug)]
pub enum TraceError {
    #[error("Plan parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error(
        "Insufficient samples for '{label}': {successful_runs} of {attempted_runs} runs succeeded"
    )]
    InsufficientSamples {
        label: String,
        successful_runs: u32,
        attempted_runs: u32,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TraceError {
    /// Stable machine-readable name of the error variant
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Parse(_) => "parse_error",
            Self::Execution(_) => "execution_error",
            Self::Timeout { .. } => "timeout",
            Self::InsufficientSamples { .. } => "insufficient_samples",
            Self::Configuration(_) => "configuration_error",
            Self::Io(_) => "io_error",
            Self::Serialization(_) => "serialization_error",
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Result type alias for SQLTrace operations
pub type Result<T> = std::result::Result<T, TraceError>;
