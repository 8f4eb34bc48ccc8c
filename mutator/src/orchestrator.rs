//! Baseline-then-variants verification over one file or a set of files.
//!
//! Per file: read, parse, compile and run the original. Only a passing
//! baseline is worth stressing; every strategy then produces one variant
//! which is compiled and run in turn. A failing variant never stops the
//! ones after it.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::VerifyConfig;
use crate::engine::{self, MutationOutcome};
use crate::error::HarnessError;
use crate::mutator::Mutator;
use crate::report::{FileResult, Progress, RunRecord, SetSummary, Verdict, FAILURE, SUCCESS};
use crate::toolchain::{Compiler, Executor, Frontend};
use crate::tree::SyntaxTree;

/// Receives everything worth telling a user while a run is in flight.
///
/// All methods default to doing nothing.
#[allow(unused_variables)]
pub trait Reporter {
    fn set_started(&mut self, files: usize, strategies: usize, planned: usize) {}

    fn file_started(&mut self, path: &Path) {}

    /// The file could not be read or parsed. No runs happen for it.
    fn file_skipped(&mut self, path: &Path, error: &HarnessError) {}

    fn variant_started(&mut self, path: &Path, index: usize, count: usize, mutator: &str) {}

    fn variant_mutated(&mut self, path: &Path, original: &SyntaxTree, outcome: &MutationOutcome) {}

    fn run_finished(&mut self, path: &Path, record: &RunRecord, progress: &Progress) {}

    /// A variant did not pass. `variant` is the tree that was compiled.
    fn variant_failed(&mut self, path: &Path, record: &RunRecord, variant: &SyntaxTree) {}

    fn file_finished(&mut self, result: &FileResult) {}

    fn set_finished(&mut self, summary: &SetSummary) {}
}

/// A reporter that ignores everything.
pub struct NullReporter;

impl Reporter for NullReporter {}

pub struct Orchestrator<T> {
    toolchain: T,
    strategies: Vec<Box<dyn Mutator>>,
    config: VerifyConfig,
}

impl<T> Orchestrator<T>
where
    T: Frontend + Compiler + Executor<<T as Compiler>::Artifact>,
{
    /// `strategies` are reused for every file, in order.
    pub fn new(toolchain: T, strategies: Vec<Box<dyn Mutator>>, config: VerifyConfig) -> Self {
        Self { toolchain, strategies, config }
    }

    pub fn config(&self) -> &VerifyConfig {
        &self.config
    }

    pub fn strategy_names(&self) -> Vec<String> {
        self.strategies.iter().map(|m| m.name()).collect()
    }

    /// Number of variants each passing file will get.
    fn variants_per_file(&self) -> usize {
        if self.config.enable_mutation {
            self.strategies.len()
        } else {
            0
        }
    }

    pub fn process_file(&mut self, path: &Path, reporter: &mut dyn Reporter) -> FileResult {
        let mut progress = Progress::new(self.variants_per_file() + 1);
        self.verify(path, &mut progress, reporter)
    }

    pub fn process_file_set(&mut self, paths: &[PathBuf], reporter: &mut dyn Reporter) -> SetSummary {
        let started = Instant::now();
        let per_file = self.variants_per_file();
        let mut progress = Progress::new(paths.len() * (per_file + 1));
        reporter.set_started(paths.len(), per_file, progress.planned());

        let mut summary = SetSummary::default();
        for path in paths {
            let result = self.verify(path, &mut progress, reporter);
            summary.add(result);
        }
        summary.elapsed = started.elapsed();
        reporter.set_finished(&summary);
        summary
    }

    fn verify(&mut self, path: &Path, progress: &mut Progress, reporter: &mut dyn Reporter) -> FileResult {
        reporter.file_started(path);
        let per_file = self.variants_per_file();

        let tree = match self.load(path) {
            Ok(tree) => tree,
            Err(e) => {
                progress.unplan(per_file + 1);
                reporter.file_skipped(path, &e);
                let result = FileResult {
                    path: path.to_path_buf(),
                    baseline: None,
                    variants: vec![],
                    skipped: Some(e.to_string()),
                    code: FAILURE,
                };
                reporter.file_finished(&result);
                return result;
            }
        };

        let baseline = self.cycle(&tree, None, 0);
        progress.complete_one();
        reporter.run_finished(path, &baseline, progress);
        if !baseline.passed() {
            progress.unplan(per_file);
            let result = FileResult {
                path: path.to_path_buf(),
                code: baseline.verdict.code(),
                skipped: Some(format!("baseline {}", baseline.verdict)),
                baseline: Some(baseline),
                variants: vec![],
            };
            reporter.file_finished(&result);
            return result;
        }

        let mut code = SUCCESS;
        let mut variants = Vec::with_capacity(per_file);
        let count = per_file;
        for index in 0..count {
            let mutator = self.strategies[index].as_mut();
            let name = mutator.name();
            reporter.variant_started(path, index, count, &name);

            let outcome = engine::mutate(mutator, &tree);
            reporter.variant_mutated(path, &tree, &outcome);

            let record = self.cycle(&outcome.tree, Some(name), outcome.transform_count);
            progress.complete_one();
            reporter.run_finished(path, &record, progress);
            if !record.passed() {
                reporter.variant_failed(path, &record, &outcome.tree);
                if code == SUCCESS {
                    code = record.verdict.code();
                }
            }
            variants.push(record);
        }

        let result = FileResult {
            path: path.to_path_buf(),
            baseline: Some(baseline),
            variants,
            skipped: None,
            code,
        };
        reporter.file_finished(&result);
        result
    }

    fn load(&self, path: &Path) -> Result<SyntaxTree, HarnessError> {
        let text = fs::read_to_string(path).map_err(|source| HarnessError::InputAccess {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(self.toolchain.parse(&text, path)?)
    }

    /// One compile-and-execute cycle. The artifact does not outlive it.
    fn cycle(&self, tree: &SyntaxTree, mutator: Option<String>, transform_count: usize) -> RunRecord {
        let started = Instant::now();
        let verdict = match self.toolchain.compile(tree) {
            Err(e) => Verdict::CompileFailed(e),
            Ok(artifact) => match self.toolchain.run(&artifact) {
                Ok(execution) => Verdict::from_code(execution.code),
                Err(fault) => Verdict::Faulted(fault),
            },
        };
        RunRecord {
            mutator,
            transform_count,
            verdict,
            elapsed: started.elapsed(),
        }
    }
}

/// Every file under `root` whose extension is `extension`, sorted by path.
pub fn collect_inputs(root: &Path, extension: &str) -> Result<Vec<PathBuf>, HarnessError> {
    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let entries = fs::read_dir(&dir).map_err(|source| HarnessError::InputAccess { path: dir.clone(), source })?;
        for entry in entries {
            let entry = entry.map_err(|source| HarnessError::InputAccess { path: dir.clone(), source })?;
            let path = entry.path();
            if path.is_dir() {
                pending.push(path);
            } else if path.extension().is_some_and(|e| e == extension) {
                found.push(path);
            }
        }
    }
    found.sort();
    Ok(found)
}
