use std::fs;
use std::path::{Path, PathBuf};

use colored::Colorize;
use eh_mutate::{
    Emit, FileResult, HarnessError, MutationOutcome, Progress, Reporter, RunRecord, SetSummary, SyntaxTree, Verdict,
};
use short_uuid::ShortUuid;
use similar::TextDiff;

/// What to show, and where to keep failing variants.
#[derive(Clone, Debug, Default)]
pub struct ConsoleOptions {
    pub quiet: bool,
    pub verbose: bool,
    pub show_source: bool,
    pub show_diff: bool,
    pub save_failures: Option<PathBuf>,
}

/// Prints `// ...` progress lines to stdout.
pub struct ConsoleReporter {
    options: ConsoleOptions,
    /// Title of the variant in flight, e.g. `a.eh: EH Stress [3/29]`.
    title: String,
    /// Files written for failing variants.
    saved: Vec<PathBuf>,
}

impl ConsoleReporter {
    pub fn new(options: ConsoleOptions) -> Self {
        Self {
            options,
            title: String::new(),
            saved: vec![],
        }
    }

    #[cfg(test)]
    pub fn saved(&self) -> &[PathBuf] {
        &self.saved
    }

    /// Write a failing variant, headed by where it came from.
    fn save(&self, path: &Path, record: &RunRecord, variant: &SyntaxTree) -> std::io::Result<Option<PathBuf>> {
        let Some(dir) = self.options.save_failures.as_ref() else {
            return Ok(None);
        };
        fs::create_dir_all(dir)?;
        let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
        let target = dir.join(format!("{}-{}.eh", stem, ShortUuid::generate()));
        let header = format!("// {}\n// strategy: {}\n// {}\n", path.display(), record.label(), record.verdict);
        fs::write(&target, header + &variant.to_source())?;
        Ok(Some(target))
    }
}

impl Reporter for ConsoleReporter {
    fn set_started(&mut self, files: usize, strategies: usize, planned: usize) {
        println!(
            "// File count: {}, stressor count: {}, total variant count: {}",
            files, strategies, planned
        );
    }

    fn file_started(&mut self, path: &Path) {
        self.title = path.display().to_string();
        if !self.options.quiet {
            println!("---------------------------------------");
            println!("// Original Program: {}", path.display());
        }
    }

    fn file_skipped(&mut self, _path: &Path, error: &HarnessError) {
        println!("{}", format!("// {}", error).red());
    }

    fn variant_started(&mut self, path: &Path, index: usize, count: usize, mutator: &str) {
        self.title = format!("{}: EH Stress [{}/{}]", path.display(), index, count);
        if !self.options.quiet {
            println!();
            println!("---------------------------------------");
            println!("// {}: {}", self.title, mutator.bold());
        }
    }

    fn variant_mutated(&mut self, _path: &Path, original: &SyntaxTree, outcome: &MutationOutcome) {
        if !self.options.quiet {
            println!("// {}: made {} mutations", self.title, outcome.transform_count);
        }
        if self.options.verbose {
            for event in outcome.log.events() {
                println!("// {}", event.to_string().dimmed());
            }
        }
        if self.options.show_source {
            println!("{}", outcome.tree.to_source());
        }
        if self.options.show_diff {
            let before = original.to_source();
            let after = outcome.tree.to_source();
            let diff = TextDiff::from_lines(&before, &after);
            print!("{}", diff.unified_diff().context_radius(2).header("original", "variant"));
        }
    }

    fn run_finished(&mut self, path: &Path, record: &RunRecord, progress: &Progress) {
        let name = match record.mutator {
            None => path.display().to_string(),
            Some(_) => self.title.clone(),
        };
        match &record.verdict {
            Verdict::Passed => {
                if !self.options.quiet {
                    println!("// Execution of '{}' {}", name, record.verdict.to_string().green());
                    println!("// {}", progress);
                }
            }
            Verdict::CompileFailed(e) => {
                println!("{}", format!("// Compilation of '{}' failed: {} errors", name, e.diagnostics.len()).red());
                for d in &e.diagnostics {
                    println!("{}", d);
                }
            }
            other => println!("{}", format!("// Execution of '{}' {}", name, other).red()),
        }
    }

    fn variant_failed(&mut self, path: &Path, record: &RunRecord, variant: &SyntaxTree) {
        match self.save(path, record, variant) {
            Ok(None) => {}
            Ok(Some(target)) => {
                println!("// Saved failing variant to {}", target.display());
                self.saved.push(target);
            }
            Err(e) => println!("{}", format!("// Unable to save failing variant: {}", e).red()),
        }
    }

    fn file_finished(&mut self, result: &FileResult) {
        if let Some(reason) = &result.skipped {
            if !self.options.quiet {
                println!("// Skipped variants for {}: {}", result.path.display(), reason);
            }
        }
    }

    fn set_finished(&mut self, summary: &SetSummary) {
        let line = summary.to_string();
        if summary.failed == 0 {
            println!("{}", line.green());
        } else {
            println!("{}", line.red());
            for file in summary.files.iter().filter(|f| !f.succeeded()) {
                println!("{}", format!("//   {} (exitCode {})", file.path.display(), file.code).red());
                for record in file.failed_variants() {
                    println!("//     {}: {}", record.label(), record.verdict);
                }
            }
        }
        if let (Some(dir), false) = (&self.options.save_failures, self.saved.is_empty()) {
            println!("// Saved {} failing variant(s) under {}", self.saved.len(), dir.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eh_mutate::{mutate, parse, Primitive, RuntimeFault};
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn failing_variant_is_saved() {
        let dir = TempDir::new().unwrap();
        let mut reporter = ConsoleReporter::new(ConsoleOptions {
            quiet: true,
            save_failures: Some(dir.path().join("failures")),
            ..ConsoleOptions::default()
        });
        let tree = parse("fn main() { return 100; }", "case.eh").unwrap();
        let variant = mutate(&mut Primitive::into_catch(), &tree).tree;
        let record = RunRecord {
            mutator: Some("IntoCatch".to_string()),
            transform_count: 1,
            verdict: Verdict::Faulted(RuntimeFault::Crashed("boom".to_string())),
            elapsed: Duration::ZERO,
        };
        reporter.variant_failed(Path::new("tests/case.eh"), &record, &variant);

        assert_eq!(reporter.saved().len(), 1);
        let saved = &reporter.saved()[0];
        assert!(saved.file_name().unwrap().to_string_lossy().starts_with("case-"));
        let text = fs::read_to_string(saved).unwrap();
        assert!(text.starts_with("// tests/case.eh\n// strategy: IntoCatch\n"));
        // The saved file is a runnable reproduction.
        assert_eq!(parse(&text, saved).unwrap().green(), variant.green());
    }

    #[test]
    fn nothing_saved_without_directory() {
        let mut reporter = ConsoleReporter::new(ConsoleOptions { quiet: true, ..ConsoleOptions::default() });
        let tree = parse("fn main() { return 1; }", "case.eh").unwrap();
        let record = RunRecord {
            mutator: Some("TryCatch".to_string()),
            transform_count: 1,
            verdict: Verdict::Mismatch(1),
            elapsed: Duration::ZERO,
        };
        reporter.variant_failed(Path::new("case.eh"), &record, &tree);
        assert!(reporter.saved().is_empty());
    }
}
