use std::path::PathBuf;
use std::process;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use colored::Colorize;
use eh_mutate::{
    collect_inputs, orchestrator_with_config, reference_orchestrator, shared_rng, standard_strategies, SetSummary,
    VerifyConfig, FAILURE,
};

mod console;
mod run;

use crate::console::{ConsoleOptions, ConsoleReporter};
use crate::run::ScriptToolchain;

/// Stack for the verification thread. Variants nest blocks dozens deep and
/// the parser, checker and emitter all recurse over them.
const VERIFY_STACK_SIZE: usize = 256 << 20;

#[derive(Parser, Debug)]
#[command(about = "Stress exception handling by running EH-mutated variants of known-good programs")]
struct Args {
    /// Program to verify, or a directory of them with --recursive
    input: Option<PathBuf>,

    /// Path to .toml configuration; flags override it
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Verify every matching file under INPUT
    #[arg(short, long)]
    recursive: bool,
    /// Only report failures
    #[arg(short, long)]
    quiet: bool,
    /// Report every rewrite and random draw
    #[arg(short, long)]
    verbose: bool,
    /// Seed for the random strategies
    #[arg(short, long)]
    seed: Option<u64>,
    /// Print each variant's source
    #[arg(long)]
    show_source: bool,
    /// Print a diff of each variant against the original
    #[arg(long)]
    show_diff: bool,
    /// Run baselines only
    #[arg(long)]
    no_mutation: bool,
    /// Run only the named strategy; may be repeated
    #[arg(long, value_name = "NAME")]
    only: Vec<String>,
    /// How long to wait before timing out a run, in seconds
    #[arg(short, long)]
    timeout: Option<u64>,
    /// Interpreter step budget per run
    #[arg(long)]
    steps: Option<u64>,
    /// Directory that receives the source of every failing variant
    #[arg(long, value_name = "DIR")]
    save_failures: Option<PathBuf>,
    /// External program that runs a variant file and exits with its outcome
    #[arg(long, value_name = "PROGRAM")]
    toolchain: Option<String>,
    /// Extra argument passed to the toolchain before the file; may be repeated
    #[arg(long = "toolchain-arg", value_name = "ARG", allow_hyphen_values = true)]
    toolchain_args: Vec<String>,
    /// List the strategy names and exit
    #[arg(long)]
    list: bool,
}

fn load_config(cli: &Args) -> Result<VerifyConfig> {
    let mut config = match &cli.config {
        Some(path) => VerifyConfig::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => VerifyConfig::default(),
    };

    config.recursive |= cli.recursive;
    config.quiet |= cli.quiet;
    config.verbose |= cli.verbose;
    config.show_rewritten_source |= cli.show_source;
    config.show_diff |= cli.show_diff;
    if cli.no_mutation {
        config.enable_mutation = false;
    }
    if let Some(seed) = cli.seed {
        config.random_seed = seed;
    }
    if !cli.only.is_empty() {
        config.only = cli.only.clone();
    }
    if let Some(timeout) = cli.timeout {
        config.timeout_secs = timeout;
    }
    if cli.steps.is_some() {
        config.step_limit = cli.steps;
    }
    if cli.save_failures.is_some() {
        config.save_failures = cli.save_failures.clone();
    }
    Ok(config)
}

fn verify(cli: &Args) -> Result<i32> {
    if cli.list {
        for m in standard_strategies(&shared_rng(0)) {
            println!("{}", m.name());
        }
        return Ok(0);
    }

    let Some(input) = &cli.input else {
        bail!("no input given");
    };
    let config = load_config(cli)?;

    let paths = if config.recursive {
        collect_inputs(input, &config.extension)
            .with_context(|| format!("enumerating {}", input.display()))?
    } else {
        vec![input.clone()]
    };

    let mut reporter = ConsoleReporter::new(ConsoleOptions {
        quiet: config.quiet,
        verbose: config.verbose,
        show_source: config.show_rewritten_source,
        show_diff: config.show_diff,
        save_failures: config.save_failures.clone(),
    });

    let summary: SetSummary = match &cli.toolchain {
        Some(program) => {
            let mut command = vec![program.clone()];
            command.extend(cli.toolchain_args.iter().cloned());
            let toolchain = ScriptToolchain::new(command, Duration::from_secs(config.timeout_secs));
            orchestrator_with_config(toolchain, config)?.process_file_set(&paths, &mut reporter)
        }
        None => reference_orchestrator(config)?.process_file_set(&paths, &mut reporter),
    };
    Ok(summary.exit_code())
}

/// Run `verify` on its own thread so deep variants do not depend on the size
/// of the main thread's stack.
fn verify_on_large_stack(cli: Args) -> Result<i32> {
    let worker = thread::Builder::new()
        .name("verify".to_string())
        .stack_size(VERIFY_STACK_SIZE)
        .spawn(move || verify(&cli))
        .context("starting the verification thread")?;
    worker
        .join()
        .map_err(|_| anyhow!("verification thread panicked"))?
}

fn main() {
    let cli = Args::parse();
    let code = match verify_on_large_stack(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            FAILURE
        }
    };
    process::exit(code);
}
