mod combinator;
mod compile;
mod config;
mod emit;
mod engine;
mod environment;
mod error;
mod factory;
mod interp;
mod legality;
mod lexer;
mod mutator;
mod orchestrator;
mod parser;
mod report;
mod strategy;
mod toolchain;
mod tree;

pub use crate::combinator::{shared_rng, RandomApply, RandomChoice, Repeat, Sequence, SharedRng};
pub use crate::compile::{compile, Program};
pub use crate::config::VerifyConfig;
pub use crate::emit::{Emit, Emitter};
pub use crate::engine::{mutate, MutationOutcome};
pub use crate::error::{CompileError, Diagnostic, HarnessError, ParseError, RuntimeFault};
pub use crate::factory::SENTINEL_EXCEPTION;
pub use crate::interp::{execute, Execution, Limits};
pub use crate::legality::{contains_disallowed_for_catch, contains_disallowed_for_finally, enclosed_in_protected_region};
pub use crate::mutator::{MutationEvent, MutationLog, Mutator, Pattern, Primitive};
pub use crate::orchestrator::{collect_inputs, NullReporter, Orchestrator, Reporter};
pub use crate::parser::parse;
pub use crate::report::{FileResult, Progress, RunRecord, SetSummary, Verdict, FAILURE, SUCCESS};
pub use crate::strategy::{select as select_strategies, standard_strategies};
pub use crate::toolchain::{Compiler, Executor, Frontend, ReferenceToolchain};
pub use crate::tree::{GreenNode, Span, SyntaxKind, SyntaxNode, SyntaxTree};

/// An orchestrator running the standard strategies (narrowed by
/// `config.only`) on `toolchain`, seeded from `config.random_seed`.
pub fn orchestrator_with_config<T>(toolchain: T, config: VerifyConfig) -> Result<Orchestrator<T>, HarnessError>
where
    T: Frontend + Compiler + Executor<<T as Compiler>::Artifact>,
{
    let rng = shared_rng(config.random_seed);
    let strategies = select_strategies(standard_strategies(&rng), &config.only)?;
    Ok(Orchestrator::new(toolchain, strategies, config))
}

/// Same, on the in-process toolchain bounded by the config's limits.
pub fn reference_orchestrator(config: VerifyConfig) -> Result<Orchestrator<ReferenceToolchain>, HarnessError> {
    let toolchain = ReferenceToolchain::new(config.limits());
    orchestrator_with_config(toolchain, config)
}
