//! Error taxonomy.
//!
//! Parse and compile errors are fatal for one compile attempt, runtime
//! faults for one execution. An outcome other than the success sentinel is
//! not an error at all: it is reported as a [`crate::report::Verdict`].

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::tree::Span;

#[derive(Debug, Clone, Error)]
#[error("parse error at line {line}, column {column}: {message}")]
pub struct ParseError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl ParseError {
    pub fn new(message: impl Into<String>, line: usize, column: usize) -> Self {
        Self { message: message.into(), line, column }
    }

    pub fn unexpected(expected: &str, found: &str, line: usize, column: usize) -> Self {
        Self::new(format!("expected {}, found {}", expected, found), line, column)
    }
}

pub type ParseResult<T> = Result<T, ParseError>;

/// One compiler complaint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub message: String,
    pub span: Option<Span>,
}

impl Diagnostic {
    pub fn new(message: impl Into<String>, span: Option<Span>) -> Self {
        Self { message: message.into(), span }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.span {
            Some(s) if s.line_start == s.line_end => write!(f, "line {}: error: {}", s.line_start, self.message),
            Some(s) => write!(f, "lines {}-{}: error: {}", s.line_start, s.line_end, self.message),
            None => write!(f, "<generated>: error: {}", self.message),
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("compilation failed: {} error(s)", .diagnostics.len())]
pub struct CompileError {
    pub diagnostics: Vec<Diagnostic>,
}

impl CompileError {
    pub fn new(diagnostics: Vec<Diagnostic>) -> Self {
        Self { diagnostics }
    }

    pub fn single(message: impl Into<String>) -> Self {
        Self::new(vec![Diagnostic::new(message, None)])
    }
}

#[derive(Debug, Clone, Error)]
pub enum RuntimeFault {
    #[error("unhandled exception of type {type_name}")]
    Uncaught { type_name: String },

    #[error("execution exceeded its budget ({limit})")]
    Timeout { limit: String },

    #[error("{what} depth exceeded {depth}")]
    StackOverflow { what: &'static str, depth: usize },

    #[error("type error: {0}")]
    Type(String),

    #[error("entry point did not return an integer: {0}")]
    BadExit(String),

    #[error("process crashed: {0}")]
    Crashed(String),
}

impl RuntimeFault {
    pub fn timeout(after: Duration) -> Self {
        RuntimeFault::Timeout { limit: format!("{:?}", after) }
    }

    pub fn out_of_steps(steps: u64) -> Self {
        RuntimeFault::Timeout { limit: format!("{} steps", steps) }
    }
}

/// Everything that can stop a file or a variant from being verified.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("can't access '{}': {source}", .path.display())]
    InputAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Runtime(#[from] RuntimeFault),

    #[error("invalid configuration: {0}")]
    Config(String),
}
