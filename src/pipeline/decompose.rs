use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use super::{file_name, Artifacts};
use crate::config::{PipelineConfig, ToolConfig};
use crate::data::model::Quantity;
use crate::error::{PipelineError, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const LOG_TAIL_LINES: usize = 20;

// ---------------------------------------------------------------------------
// Tool invocation
// ---------------------------------------------------------------------------

/// A fully expanded command line for the decomposition tool.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub timeout: Duration,
}

impl ToolInvocation {
    /// Substitute `{output_dir}`, `{step}` and `{run}` into the configured
    /// arguments.
    pub fn new(tool: &ToolConfig, working_dir: &Path, step: u32, run: &str) -> Self {
        let dir = working_dir.display().to_string();
        let expand = |s: &str| {
            s.replace("{output_dir}", &dir)
                .replace("{step}", &step.to_string())
                .replace("{run}", run)
        };
        ToolInvocation {
            program: expand(&tool.program),
            args: tool.args.iter().map(|a| expand(a)).collect(),
            working_dir: working_dir.to_path_buf(),
            timeout: tool.timeout(),
        }
    }

    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn failure(&self, reason: impl Into<String>) -> PipelineError {
        PipelineError::ExternalToolFailure {
            command: self.command_line(),
            reason: reason.into(),
        }
    }

    /// Resolve the program to a file, either as given or via `PATH`.
    pub fn preflight(&self) -> Result<PathBuf> {
        let candidate = Path::new(&self.program);
        if candidate.components().count() > 1 {
            return if candidate.is_file() {
                Ok(candidate.to_path_buf())
            } else {
                Err(self.failure(format!("{} does not exist", candidate.display())))
            };
        }
        let search: Vec<PathBuf> = std::env::var_os("PATH")
            .map(|paths| std::env::split_paths(&paths).collect())
            .unwrap_or_default();
        search
            .into_iter()
            .map(|dir| dir.join(&self.program))
            .find(|p| p.is_file())
            .ok_or_else(|| self.failure(format!("`{}` not found on PATH", self.program)))
    }

    /// Run to completion, writing stdout/stderr to the given files.
    ///
    /// Blocks until the tool exits or the timeout elapses; on timeout the child
    /// is killed.
    pub fn execute(&self, stdout_log: &Path, stderr_log: &Path) -> Result<()> {
        let stdout = File::create(stdout_log).map_err(|e| PipelineError::io(stdout_log, e))?;
        let stderr = File::create(stderr_log).map_err(|e| PipelineError::io(stderr_log, e))?;

        info!("Running: {}", self.command_line());
        info!("Working directory: {}", self.working_dir.display());
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .spawn()
            .map_err(|e| self.failure(format!("could not start: {e}")))?;

        let started = Instant::now();
        let status: ExitStatus = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {
                    let elapsed = started.elapsed();
                    if elapsed >= self.timeout {
                        let _ = child.kill();
                        let _ = child.wait();
                        log_tail("stderr", stderr_log);
                        return Err(self.failure(format!(
                            "timed out after {}s",
                            self.timeout.as_secs_f64()
                        )));
                    }
                    thread::sleep(POLL_INTERVAL.min(self.timeout - elapsed));
                }
                Err(e) => return Err(self.failure(format!("waiting for process: {e}"))),
            }
        };
        debug!("tool finished in {:.1}s", started.elapsed().as_secs_f64());

        log_tail("stdout", stdout_log);
        log_tail("stderr", stderr_log);
        if status.success() {
            Ok(())
        } else {
            Err(self.failure(match status.code() {
                Some(code) => format!("exited with code {code}"),
                None => "terminated by signal".to_string(),
            }))
        }
    }
}

fn log_tail(stream: &str, path: &Path) {
    for line in tail_lines(path) {
        if stream == "stderr" {
            warn!("[tool {stream}] {line}");
        } else {
            info!("[tool {stream}] {line}");
        }
    }
}

/// Last [`LOG_TAIL_LINES`] lines of a tool log; invalid UTF-8 is replaced.
fn tail_lines(path: &Path) -> Vec<String> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!("cannot read {}: {e}", path.display());
            return Vec::new();
        }
    };
    let text = String::from_utf8_lossy(&bytes);
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(LOG_TAIL_LINES);
    lines[start..].iter().map(|l| l.to_string()).collect()
}

// ---------------------------------------------------------------------------
// Stage entry-point
// ---------------------------------------------------------------------------

/// Stage 2: hand the persisted bundle to the external decomposition tool.
pub fn run(config: &PipelineConfig) -> Result<Vec<PathBuf>> {
    let artifacts = Artifacts::new(config);
    for q in Quantity::ALL {
        let path = artifacts.field(q);
        if !path.is_file() {
            return Err(PipelineError::io(
                &path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "stage-1 output missing"),
            ));
        }
    }

    let working_dir = std::fs::canonicalize(artifacts.dir())
        .map_err(|e| PipelineError::io(artifacts.dir(), e))?;
    let invocation = ToolInvocation::new(&config.tool, &working_dir, config.step, &config.run_name);
    let resolved = invocation.preflight()?;
    debug!("resolved tool: {}", resolved.display());

    info!("Applying BEMD decomposition to field components...");
    let stdout_log = artifacts.tool_log("stdout");
    let stderr_log = artifacts.tool_log("stderr");
    invocation.execute(&stdout_log, &stderr_log)?;

    let mut files = vec![stdout_log, stderr_log];
    for q in Quantity::ALL {
        let path = artifacts.modes(q);
        if path.is_file() {
            info!("- {}", file_name(&path));
            files.push(path);
        } else if q == Quantity::Intensity {
            debug!("optional {} not produced", file_name(&path));
        } else {
            warn!("tool did not produce {}", file_name(&path));
        }
    }
    Ok(files)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn shell(script: &str, timeout_secs: u64, dir: &Path) -> ToolInvocation {
        let tool = ToolConfig {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            timeout_secs,
        };
        ToolInvocation::new(&tool, dir, 1005, "loam1")
    }

    fn logs(dir: &Path) -> (PathBuf, PathBuf) {
        (dir.join("out.log"), dir.join("err.log"))
    }

    #[test]
    fn placeholders_are_expanded() {
        let inv = ToolInvocation::new(&ToolConfig::default(), Path::new("/data/out"), 1005, "loam1");
        assert_eq!(inv.program, "matlab");
        assert_eq!(inv.args[1], "cd('/data/out'); step2_bemd_processing");

        let tool = ToolConfig {
            program: "bemd".into(),
            args: vec!["--step={step}".into(), "{run}".into()],
            timeout_secs: 1,
        };
        let inv = ToolInvocation::new(&tool, Path::new("."), 7, "r1");
        assert_eq!(inv.command_line(), "bemd --step=7 r1");
    }

    #[test]
    fn tail_survives_invalid_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("err.log");
        let mut bytes = Vec::new();
        for i in 0..25 {
            bytes.extend_from_slice(format!("line {i}\n").as_bytes());
        }
        bytes.extend_from_slice(b"bad \xff\xfe byte\n");
        std::fs::write(&path, bytes).unwrap();

        let tail = tail_lines(&path);
        assert_eq!(tail.len(), LOG_TAIL_LINES);
        assert_eq!(tail[0], "line 6");
        assert_eq!(tail[LOG_TAIL_LINES - 1], "bad \u{FFFD}\u{FFFD} byte");
        assert!(tail_lines(&dir.path().join("absent.log")).is_empty());
    }

    #[test]
    fn successful_tool_output_is_captured() {
        let dir = tempfile::tempdir().unwrap();
        let (out, err) = logs(dir.path());
        shell("echo decomposing; touch marker", 10, dir.path())
            .execute(&out, &err)
            .unwrap();
        assert!(std::fs::read_to_string(&out).unwrap().contains("decomposing"));
        assert!(dir.path().join("marker").exists());
    }

    #[test]
    fn nonzero_exit_is_tool_failure() {
        let dir = tempfile::tempdir().unwrap();
        let (out, err) = logs(dir.path());
        let e = shell("exit 3", 10, dir.path()).execute(&out, &err).unwrap_err();
        match e {
            PipelineError::ExternalToolFailure { reason, .. } => assert!(reason.contains("code 3")),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn timeout_kills_the_tool() {
        let dir = tempfile::tempdir().unwrap();
        let (out, err) = logs(dir.path());
        let started = Instant::now();
        let e = shell("sleep 30", 1, dir.path()).execute(&out, &err).unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(10));
        match e {
            PipelineError::ExternalToolFailure { reason, .. } => assert!(reason.contains("timed out")),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn unknown_program_fails_preflight() {
        let tool = ToolConfig {
            program: "no-such-bemd-tool-xyz".into(),
            args: Vec::new(),
            timeout_secs: 1,
        };
        let inv = ToolInvocation::new(&tool, Path::new("."), 1, "r");
        assert!(matches!(inv.preflight(), Err(PipelineError::ExternalToolFailure { .. })));
        assert!(shell("true", 1, Path::new(".")).preflight().is_ok());
    }

    #[test]
    fn stage_requires_ingest_output() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig {
            output_dir: dir.path().to_path_buf(),
            ..PipelineConfig::default()
        };
        assert!(matches!(run(&config), Err(PipelineError::Io { .. })));
    }
}
