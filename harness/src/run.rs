use std::io::Write;
use std::path::Path;
use std::time::Duration;

use eh_mutate::{
    parse, CompileError, Compiler, Emit, Execution, Executor, Frontend, ParseError, RuntimeFault, SyntaxTree,
};
use subprocess::{ExitStatus, Popen, PopenConfig, Redirection};
use tempfile::NamedTempFile;

/// Compile and run variants with an external program.
///
/// "Compiling" a variant renders it to a temporary `.eh` file; running it
/// invokes `command... <file>` and takes the exit status as the outcome.
/// The temporary file lives exactly as long as the artifact.
pub struct ScriptToolchain {
    command: Vec<String>,
    timeout: Duration,
}

impl ScriptToolchain {
    pub fn new(command: Vec<String>, timeout: Duration) -> Self {
        Self { command, timeout }
    }
}

impl Frontend for ScriptToolchain {
    fn parse(&self, source: &str, path: &Path) -> Result<SyntaxTree, ParseError> {
        parse(source, path)
    }
}

impl Compiler for ScriptToolchain {
    type Artifact = NamedTempFile;

    fn compile(&self, tree: &SyntaxTree) -> Result<NamedTempFile, CompileError> {
        let write = || -> std::io::Result<NamedTempFile> {
            let mut file = tempfile::Builder::new().suffix(".eh").tempfile()?;
            file.write_all(tree.to_source().as_bytes())?;
            file.flush()?;
            Ok(file)
        };
        write().map_err(|e| CompileError::single(format!("unable to write variant: {}", e)))
    }
}

impl Executor<NamedTempFile> for ScriptToolchain {
    /// Run the script for a bounded number of seconds. Stderr passes
    /// through, stdout is captured.
    fn run(&self, artifact: &NamedTempFile) -> Result<Execution, RuntimeFault> {
        let path = artifact
            .path()
            .to_str()
            .ok_or_else(|| RuntimeFault::Crashed("unable to coerce temp path into string".to_string()))?;
        let mut argv: Vec<&str> = self.command.iter().map(String::as_str).collect();
        argv.push(path);

        let mut p = Popen::create(
            &argv,
            PopenConfig {
                stdout: Redirection::Pipe,
                ..Default::default()
            },
        )
        .map_err(|e| RuntimeFault::Crashed(format!("unable to start '{}': {}", argv[0], e)))?;

        let read = p.communicate_start(None).limit_time(self.timeout).read_string();
        let output = match read {
            Ok((out, _)) => out.unwrap_or_default(),
            Err(_) => {
                p.terminate().map_err(|e| RuntimeFault::Crashed(e.to_string()))?;
                let _ = p.wait();
                return Err(RuntimeFault::timeout(self.timeout));
            }
        };

        let status = p
            .wait_timeout(self.timeout)
            .map_err(|e| RuntimeFault::Crashed(e.to_string()))?;
        match status {
            Some(ExitStatus::Exited(code)) => Ok(Execution { code: code as i32, output }),
            Some(ExitStatus::Signaled(signal)) => Err(RuntimeFault::Crashed(format!("killed by signal {}", signal))),
            Some(other) => Err(RuntimeFault::Crashed(format!("{:?}", other))),
            None => {
                p.terminate().map_err(|e| RuntimeFault::Crashed(e.to_string()))?;
                Err(RuntimeFault::timeout(self.timeout))
            }
        }
    }
}
