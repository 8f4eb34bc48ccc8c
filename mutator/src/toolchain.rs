//! The three collaborators a verification run needs, and the in-process
//! implementation of all three.

use std::path::Path;

use crate::compile::{compile, Program};
use crate::error::{CompileError, ParseError, RuntimeFault};
use crate::interp::{execute, Execution, Limits};
use crate::parser::parse;
use crate::tree::SyntaxTree;

pub trait Frontend {
    fn parse(&self, source: &str, path: &Path) -> Result<SyntaxTree, ParseError>;
}

pub trait Compiler {
    /// Whatever the executor needs. Dropped at the end of each cycle.
    type Artifact;

    fn compile(&self, tree: &SyntaxTree) -> Result<Self::Artifact, CompileError>;
}

pub trait Executor<A> {
    fn run(&self, artifact: &A) -> Result<Execution, RuntimeFault>;
}

/// Parser, checker and interpreter, bounded by `limits`.
#[derive(Clone, Debug, Default)]
pub struct ReferenceToolchain {
    pub limits: Limits,
}

impl ReferenceToolchain {
    pub fn new(limits: Limits) -> Self {
        Self { limits }
    }
}

impl Frontend for ReferenceToolchain {
    fn parse(&self, source: &str, path: &Path) -> Result<SyntaxTree, ParseError> {
        parse(source, path)
    }
}

impl Compiler for ReferenceToolchain {
    type Artifact = Program;

    fn compile(&self, tree: &SyntaxTree) -> Result<Program, CompileError> {
        compile(tree)
    }
}

impl Executor<Program> for ReferenceToolchain {
    fn run(&self, artifact: &Program) -> Result<Execution, RuntimeFault> {
        execute(artifact, self.limits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn full_cycle() {
        let tc = ReferenceToolchain::default();
        let tree = tc.parse("fn main() { print(\"hi\"); return 100; }", Path::new("t.eh")).unwrap();
        let program = tc.compile(&tree).unwrap();
        let run = tc.run(&program).unwrap();
        assert_eq!(run.code, 100);
        assert_eq!(run.output, "hi\n");
    }

    #[test]
    fn limits_apply() {
        let tc = ReferenceToolchain::new(Limits {
            step_limit: 1_000,
            time_limit: Duration::from_secs(5),
            ..Limits::default()
        });
        let tree = tc.parse("fn main() { while (true) { } return 100; }", Path::new("t.eh")).unwrap();
        let program = tc.compile(&tree).unwrap();
        assert!(matches!(tc.run(&program), Err(RuntimeFault::Timeout { .. })));
    }
}
