//! What a verification run found, per variant, per file and per file set.

use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::error::{CompileError, RuntimeFault};

/// Outcome code of a passing test program.
pub const SUCCESS: i32 = 100;
/// Outcome code reported for anything that is not a pass.
pub const FAILURE: i32 = -1;

/// How one compile-and-execute cycle ended.
#[derive(Clone, Debug)]
pub enum Verdict {
    Passed,
    /// Ran to completion with some other code.
    Mismatch(i32),
    CompileFailed(CompileError),
    Faulted(RuntimeFault),
}

impl Verdict {
    pub fn from_code(code: i32) -> Self {
        if code == SUCCESS {
            Verdict::Passed
        } else {
            Verdict::Mismatch(code)
        }
    }

    pub fn passed(&self) -> bool {
        matches!(self, Verdict::Passed)
    }

    /// The code to carry upwards for this verdict.
    pub fn code(&self) -> i32 {
        match self {
            Verdict::Passed => SUCCESS,
            Verdict::Mismatch(code) => *code,
            Verdict::CompileFailed(_) | Verdict::Faulted(_) => FAILURE,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Passed => write!(f, "succeeded (exitCode {})", SUCCESS),
            Verdict::Mismatch(code) => write!(f, "failed (exitCode {})", code),
            Verdict::CompileFailed(e) => write!(f, "{}", e),
            Verdict::Faulted(fault) => write!(f, "faulted: {}", fault),
        }
    }
}

/// One baseline or variant run.
#[derive(Clone, Debug)]
pub struct RunRecord {
    /// Strategy name, or `None` for the baseline.
    pub mutator: Option<String>,
    pub transform_count: usize,
    pub verdict: Verdict,
    pub elapsed: Duration,
}

impl RunRecord {
    pub fn label(&self) -> &str {
        self.mutator.as_deref().unwrap_or("baseline")
    }

    pub fn passed(&self) -> bool {
        self.verdict.passed()
    }
}

#[derive(Clone, Debug)]
pub struct FileResult {
    pub path: PathBuf,
    /// `None` when the file never got as far as a baseline run.
    pub baseline: Option<RunRecord>,
    pub variants: Vec<RunRecord>,
    /// Why no variants ran, if they didn't.
    pub skipped: Option<String>,
    /// `SUCCESS`, or the first non-success code seen for this file.
    pub code: i32,
}

impl FileResult {
    pub fn succeeded(&self) -> bool {
        self.code == SUCCESS
    }

    pub fn failed_variants(&self) -> impl Iterator<Item = &RunRecord> {
        self.variants.iter().filter(|r| !r.passed())
    }
}

#[derive(Clone, Debug, Default)]
pub struct SetSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Compile-and-execute cycles actually performed, baselines included.
    pub runs: usize,
    pub elapsed: Duration,
    pub files: Vec<FileResult>,
}

impl SetSummary {
    pub fn add(&mut self, result: FileResult) {
        self.total += 1;
        if result.succeeded() {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        self.runs += result.baseline.iter().count() + result.variants.len();
        self.files.push(result);
    }

    pub fn exit_code(&self) -> i32 {
        if self.failed == 0 {
            SUCCESS
        } else {
            FAILURE
        }
    }

    pub fn seconds_per_run(&self) -> f64 {
        if self.runs == 0 {
            0.0
        } else {
            self.elapsed.as_secs_f64() / self.runs as f64
        }
    }
}

impl fmt::Display for SetSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            concat!(
                "Final Results: {} files, {} variants, {} succeeded files, {} failed files, ",
                "total time: {:.2?}, time/test: {:.2}"
            ),
            self.total,
            self.runs,
            self.succeeded,
            self.failed,
            self.elapsed,
            self.seconds_per_run()
        )
    }
}

/// Running tally of cycles against the number planned up front.
#[derive(Clone, Debug)]
pub struct Progress {
    started: Instant,
    completed: usize,
    planned: usize,
}

impl Progress {
    pub fn new(planned: usize) -> Self {
        Self { started: Instant::now(), completed: 0, planned }
    }

    pub fn complete_one(&mut self) {
        self.completed += 1;
    }

    /// Drop runs that will not happen after all.
    pub fn unplan(&mut self, runs: usize) {
        self.planned = self.planned.saturating_sub(runs);
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    pub fn planned(&self) -> usize {
        self.planned
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn fraction(&self) -> f64 {
        if self.planned == 0 {
            1.0
        } else {
            self.completed as f64 / self.planned as f64
        }
    }

    /// Remaining time at the average pace so far.
    pub fn remaining(&self, elapsed: Duration) -> Duration {
        if self.completed == 0 {
            return Duration::ZERO;
        }
        let per_run = elapsed.as_secs_f64() / self.completed as f64;
        let left = self.planned.saturating_sub(self.completed);
        Duration::from_secs_f64(per_run * left as f64)
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let elapsed = self.elapsed();
        let per_run = if self.completed == 0 {
            0.0
        } else {
            elapsed.as_secs_f64() / self.completed as f64
        };
        write!(
            f,
            "Total time: {:.2?}, seconds/test: {:.2}, progress: {}/{} ({:.2}%), estimated remaining: {:.0?}",
            elapsed,
            per_run,
            self.completed,
            self.planned,
            self.fraction() * 100.0,
            self.remaining(elapsed)
        )
    }
}
