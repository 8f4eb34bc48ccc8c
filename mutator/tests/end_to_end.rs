use std::fs;
use std::path::{Path, PathBuf};

use eh_mutate::{
    collect_inputs, compile, execute, mutate, parse, reference_orchestrator, Emit, GreenNode, Limits, Mutator,
    NullReporter, Primitive, Progress, Reporter, RunRecord, RuntimeFault, SetSummary, SyntaxKind, SyntaxTree,
    Verdict, VerifyConfig, FAILURE, SENTINEL_EXCEPTION, SUCCESS,
};
use tempfile::TempDir;

fn demos() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../demos")
}

fn run(tree: &SyntaxTree) -> (i32, String) {
    let program = compile(tree).unwrap_or_else(|e| panic!("{:?}\n{}", e.diagnostics, tree.to_source()));
    let execution = execute(&program, Limits::default()).unwrap();
    (execution.code, execution.output)
}

#[test]
fn try_catch_on_trivial_program() {
    let tree = parse("fn main() { return 100; }", "trivial.eh").unwrap();
    assert_eq!(run(&tree).0, SUCCESS);

    let mut m = Primitive::try_catch();
    let outcome = mutate(&mut m, &tree);
    assert_eq!(outcome.transform_count, 1);

    let main = &outcome.tree.green().children()[0];
    let body = &main.children()[1];
    let tries: Vec<&GreenNode> = body.children().iter().filter(|s| s.kind() == SyntaxKind::TryStmt).collect();
    assert_eq!(tries.len(), 1);
    let catches: Vec<&GreenNode> = tries[0].children().iter().filter(|c| c.kind() == SyntaxKind::CatchClause).collect();
    assert_eq!(catches.len(), 1);
    assert_eq!(catches[0].children()[0].text(), Some(SENTINEL_EXCEPTION));
    let handler = &catches[0].children()[1];
    assert_eq!(handler.children()[0].kind(), SyntaxKind::ThrowStmt);

    assert_eq!(run(&outcome.tree).0, SUCCESS);
}

#[test]
fn empty_try_finally_leaves_returning_block_alone() {
    let tree = parse("fn main() { return 100; }", "ret.eh").unwrap();
    let mut m = Primitive::empty_try_finally();
    let outcome = mutate(&mut m, &tree);
    assert_eq!(outcome.transform_count, 0);
    assert!(outcome.is_identity(&tree));
}

#[test]
fn primitives_preserve_demo_outcomes() {
    for path in collect_inputs(&demos(), "eh").unwrap() {
        let text = fs::read_to_string(&path).unwrap();
        let tree = parse(&text, &path).unwrap();
        let expected = run(&tree);
        assert_eq!(expected.0, SUCCESS, "{}", path.display());

        let mut primitives: Vec<Box<dyn Mutator>> = vec![
            Box::new(Primitive::try_catch()),
            Box::new(Primitive::empty_try_finally()),
            Box::new(Primitive::try_empty_finally()),
            Box::new(Primitive::into_catch()),
        ];
        for m in primitives.iter_mut() {
            let outcome = mutate(m.as_mut(), &tree);
            assert!(outcome.transform_count > 0, "{} did nothing to {}", m.name(), path.display());
            // Printing and re-parsing must not change the variant either.
            let reparsed = parse(&outcome.tree.to_source(), &path).unwrap();
            assert_eq!(reparsed.green(), outcome.tree.green());
            assert_eq!(run(&outcome.tree), expected, "{} on {}", m.name(), path.display());
        }
    }
}

#[derive(Default)]
struct Trace {
    planned: Vec<usize>,
    names: Vec<String>,
    counts: Vec<usize>,
    skipped: Vec<PathBuf>,
}

impl Reporter for Trace {
    fn set_started(&mut self, _files: usize, _strategies: usize, planned: usize) {
        self.planned.push(planned);
    }

    fn file_skipped(&mut self, path: &Path, _error: &eh_mutate::HarnessError) {
        self.skipped.push(path.to_path_buf());
    }

    fn run_finished(&mut self, _path: &Path, record: &RunRecord, progress: &Progress) {
        self.names.push(record.label().to_string());
        self.counts.push(record.transform_count);
        self.planned.push(progress.planned());
    }
}

fn verify_set(paths: Vec<PathBuf>, seed: u64) -> (SetSummary, Trace) {
    let config = VerifyConfig { random_seed: seed, ..VerifyConfig::default() };
    let mut orchestrator = reference_orchestrator(config).unwrap();
    let mut trace = Trace::default();
    let summary = orchestrator.process_file_set(&paths, &mut trace);
    (summary, trace)
}

#[test]
fn unparsable_file_in_set() {
    let dir = TempDir::new().unwrap();
    let write = |name: &str, text: &str| {
        let path = dir.path().join(name);
        fs::write(&path, text).unwrap();
        path
    };
    let paths = vec![
        write("1.eh", "fn main() { { print(1); } return 100; }"),
        write("2.eh", "fn main( { return 100; }"),
        write("3.eh", "fn main() { let x = 50; return x + x; }"),
    ];

    let (summary, trace) = verify_set(paths.clone(), 42);
    assert_eq!(summary.total, 3);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 1);
    assert_ne!(summary.exit_code(), SUCCESS);
    assert_eq!(summary.exit_code(), FAILURE);

    assert_eq!(trace.skipped, vec![paths[1].clone()]);
    let second = &summary.files[1];
    assert!(second.baseline.is_none());
    assert!(second.variants.is_empty());

    // 29 strategies plus a baseline per file, minus the skipped file.
    assert_eq!(trace.planned[0], 90);
    assert_eq!(*trace.planned.last().unwrap(), 60);
    assert_eq!(summary.runs, 60);
}

#[test]
fn same_seed_same_run() {
    let paths = collect_inputs(&demos(), "eh").unwrap();
    let (a, trace_a) = verify_set(paths.clone(), 1234);
    let (b, trace_b) = verify_set(paths, 1234);
    assert_eq!(trace_a.names, trace_b.names);
    assert_eq!(trace_a.counts, trace_b.counts);
    assert_eq!(a.exit_code(), SUCCESS);
    assert_eq!(b.exit_code(), SUCCESS);
}

#[test]
fn deep_recursion_faults_instead_of_aborting() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("deep.eh");
    fs::write(
        &path,
        "fn down(n) { if (n == 0) { return 100; } { let x = n; } return down(n - 1); }\n\
         fn main() { return down(100); }\n",
    )
    .unwrap();

    // Runs on the default test thread: the largest strategies nest each of
    // the 100 frames dozens of blocks deep.
    let mut orchestrator = reference_orchestrator(VerifyConfig::default()).unwrap();
    let result = orchestrator.process_file(&path, &mut NullReporter);
    assert!(result.baseline.as_ref().unwrap().passed());
    assert_eq!(result.variants.len(), 29);
    for record in &result.variants {
        assert!(
            matches!(record.verdict, Verdict::Passed | Verdict::Faulted(RuntimeFault::StackOverflow { .. })),
            "{} -> {}",
            record.label(),
            record.verdict
        );
    }
    assert!(result.variants.iter().any(|r| matches!(r.verdict, Verdict::Faulted(_))));
    assert_eq!(result.code, FAILURE);
}

#[test]
fn baseline_only_mode() {
    let paths = collect_inputs(&demos(), "eh").unwrap();
    let config = VerifyConfig { enable_mutation: false, ..VerifyConfig::default() };
    let mut orchestrator = reference_orchestrator(config).unwrap();
    let summary = orchestrator.process_file_set(&paths, &mut NullReporter);
    assert_eq!(summary.runs, paths.len());
    assert_eq!(summary.exit_code(), SUCCESS);
}
