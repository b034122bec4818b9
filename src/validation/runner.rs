//! Script execution for the runtime and test stages

use std::io::{Read, Write};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// How a script run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptOutcome {
    Completed {
        stdout: String,
        stderr: String,
        exit_code: i32,
    },
    TimedOut,
    /// The script could not be started or waited on
    Failed(String),
}

/// Runs a JavaScript program and reports its output
pub trait ScriptRunner: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether the runtime can be used at all
    fn available(&self) -> bool;

    fn run(&self, script: &str, timeout: Duration) -> ScriptOutcome;
}

/// Runs scripts with the `node` executable
#[derive(Debug, Clone)]
pub struct NodeRunner {
    program: String,
}

impl Default for NodeRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeRunner {
    pub fn new() -> Self {
        Self::with_program("node")
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// A runner if `node` is installed
    pub fn detect() -> Option<Self> {
        let runner = Self::new();
        runner.available().then_some(runner)
    }
}

impl ScriptRunner for NodeRunner {
    fn name(&self) -> &'static str {
        "node"
    }

    fn available(&self) -> bool {
        Command::new(&self.program)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    fn run(&self, script: &str, timeout: Duration) -> ScriptOutcome {
        let mut file = match tempfile::Builder::new()
            .prefix("codemend-")
            .suffix(".js")
            .tempfile()
        {
            Ok(f) => f,
            Err(e) => return ScriptOutcome::Failed(format!("cannot create script file: {}", e)),
        };
        if let Err(e) = file.write_all(script.as_bytes()).and_then(|_| file.flush()) {
            return ScriptOutcome::Failed(format!("cannot write script file: {}", e));
        }

        debug!("Running {} {}", self.program, file.path().display());
        let child = Command::new(&self.program)
            .arg(file.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn();
        let child = match child {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return ScriptOutcome::Failed(format!("{} not found", self.program));
            }
            Err(e) => return ScriptOutcome::Failed(format!("failed to run {}: {}", self.program, e)),
        };

        // The temp file must outlive the child
        let outcome = wait_with_timeout(child, timeout);
        drop(file);
        outcome
    }
}

fn read_pipe(pipe: Option<impl Read>) -> String {
    let mut out = String::new();
    if let Some(mut p) = pipe {
        let _ = p.read_to_string(&mut out);
    }
    out
}

/// Poll the child until it exits or the timeout expires; kill it on expiry
fn wait_with_timeout(mut child: Child, timeout: Duration) -> ScriptOutcome {
    let start = Instant::now();

    // Drain pipes on helper threads so a chatty script cannot block on a full pipe
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let out_handle = thread::spawn(move || read_pipe(stdout));
    let err_handle = thread::spawn(move || read_pipe(stderr));

    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                let stdout = out_handle.join().unwrap_or_default();
                let stderr = err_handle.join().unwrap_or_default();
                return ScriptOutcome::Completed {
                    stdout,
                    stderr,
                    exit_code: status.code().unwrap_or(-1),
                };
            }
            Ok(None) => {
                if start.elapsed() > timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    warn!("Script timed out after {}ms", timeout.as_millis());
                    return ScriptOutcome::TimedOut;
                }
                thread::sleep(Duration::from_millis(10));
            }
            Err(e) => {
                let _ = child.kill();
                return ScriptOutcome::Failed(format!("failed to wait for script: {}", e));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_program_is_unavailable() {
        let runner = NodeRunner::with_program("codemend-no-such-runtime");
        assert!(!runner.available());
        match runner.run("1;", Duration::from_millis(100)) {
            ScriptOutcome::Failed(msg) => assert!(msg.contains("not found")),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_kills_process() {
        // `sh <file>` runs the script file; sleep outlasts the timeout
        let runner = NodeRunner::with_program("sh");
        let start = Instant::now();
        let outcome = runner.run("sleep 5\n", Duration::from_millis(200));
        assert_eq!(outcome, ScriptOutcome::TimedOut);
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[cfg(unix)]
    #[test]
    fn test_completed_output_is_captured() {
        let runner = NodeRunner::with_program("sh");
        match runner.run("echo hello\necho oops >&2\nexit 3\n", Duration::from_secs(5)) {
            ScriptOutcome::Completed {
                stdout,
                stderr,
                exit_code,
            } => {
                assert_eq!(stdout.trim(), "hello");
                assert_eq!(stderr.trim(), "oops");
                assert_eq!(exit_code, 3);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }
}
