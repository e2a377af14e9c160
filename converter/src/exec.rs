//! Launching external engines with a bounded run time.

use std::{
    io::{ErrorKind, Read},
    process::{Child, Command, Stdio},
    sync::mpsc,
    thread,
    time::{Duration, Instant},
};

use pcd_pipeline::ToolInvocation;

use crate::ConvertError;

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const DRAIN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `None` when the process was ended by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

pub trait ProcessRunner: Send + Sync {
    /// Runs to completion. A missing executable is reported as
    /// `ExternalEngineUnavailable`, an overrun as `Timeout`.
    fn run(&self, invocation: &ToolInvocation) -> Result<ProcessOutput, ConvertError>;
}

/// Runs `invocation` and requires both a zero exit code and, when the
/// invocation names one, an output artifact on disk.
pub fn run_checked(
    runner: &dyn ProcessRunner,
    invocation: &ToolInvocation,
) -> Result<ProcessOutput, ConvertError> {
    log::info!("running: {}", invocation.display());
    let started = Instant::now();
    let output = runner.run(invocation)?;
    if !output.success() {
        log::warn!(
            "{} exited with {:?} after {:?}",
            invocation.program,
            output.exit_code,
            started.elapsed()
        );
        return Err(ConvertError::engine_failure(
            &invocation.program,
            output.exit_code,
            &output.stderr,
        ));
    }
    if let Some(artifact) = &invocation.output {
        if !artifact.exists() {
            return Err(ConvertError::OutputArtifactMissing(artifact.clone()));
        }
    }
    log::info!("{} finished in {:?}", invocation.program, started.elapsed());
    Ok(output)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

/// Reads a pipe to its end on a helper thread; the text arrives on the
/// returned channel.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut text = String::new();
        if let Some(mut pipe) = pipe {
            let mut bytes = Vec::new();
            if pipe.read_to_end(&mut bytes).is_ok() {
                text = String::from_utf8_lossy(&bytes).into_owned();
            }
        }
        let _ = tx.send(text);
    });
    rx
}

/// Output collected after the engine exited. A pipe still held open by a
/// process the engine left behind is abandoned after `DRAIN_GRACE`.
fn collect(pipe: &mpsc::Receiver<String>, program: &str, name: &str) -> String {
    match pipe.recv_timeout(DRAIN_GRACE) {
        Ok(text) => text,
        Err(_) => {
            log::warn!("{program} {name} still open after exit, not waiting for it");
            String::new()
        }
    }
}

/// Kills the engine and everything it started: the engine leads its own
/// process group.
#[cfg(unix)]
fn kill_tree(child: &mut Child) -> std::io::Result<()> {
    let Ok(pgid) = libc::pid_t::try_from(child.id()) else {
        return child.kill();
    };
    // SAFETY: killpg only sends a signal; the group was created at spawn.
    if unsafe { libc::killpg(pgid, libc::SIGKILL) } == 0 {
        return Ok(());
    }
    child.kill()
}

#[cfg(not(unix))]
fn kill_tree(child: &mut Child) -> std::io::Result<()> {
    child.kill()
}

fn wait_with_deadline(child: &mut Child, timeout: Duration) -> std::io::Result<Option<i32>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(status.code());
        }
        if Instant::now() >= deadline {
            kill_tree(child)?;
            child.wait()?;
            return Err(std::io::Error::new(ErrorKind::TimedOut, "deadline exceeded"));
        }
        thread::sleep(POLL_INTERVAL);
    }
}

impl ProcessRunner for SystemRunner {
    fn run(&self, invocation: &ToolInvocation) -> Result<ProcessOutput, ConvertError> {
        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(cwd) = &invocation.cwd {
            command.current_dir(cwd);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt as _;
            command.process_group(0);
        }

        let mut child = command.spawn().map_err(|e| match e.kind() {
            ErrorKind::NotFound => ConvertError::ExternalEngineUnavailable(invocation.program.clone()),
            _ => ConvertError::Io(e),
        })?;

        // Pipes are drained concurrently so a chatty engine cannot block on a
        // full pipe buffer.
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let exit_code = match wait_with_deadline(&mut child, invocation.timeout) {
            Ok(code) => code,
            Err(e) if e.kind() == ErrorKind::TimedOut => {
                log::warn!("{} timed out after {:?}", invocation.program, invocation.timeout);
                return Err(ConvertError::Timeout {
                    engine: invocation.program.clone(),
                    seconds: invocation.timeout.as_secs(),
                });
            }
            Err(e) => return Err(ConvertError::Io(e)),
        };

        Ok(ProcessOutput {
            exit_code,
            stdout: collect(&stdout, &invocation.program, "stdout"),
            stderr: collect(&stderr, &invocation.program, "stderr"),
        })
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use std::path::Path;

    #[test]
    fn zero_exit_without_artifact_fails() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("scan.ply");
        let invocation =
            ToolInvocation::pdal_pipeline(Path::new("pipeline.json"), &output, Duration::from_secs(5));

        let liar = ScriptedRunner::new(|_| {
            Ok(ProcessOutput {
                exit_code: Some(0),
                ..Default::default()
            })
        });
        assert!(matches!(
            run_checked(&liar, &invocation),
            Err(ConvertError::OutputArtifactMissing(p)) if p == output
        ));

        let honest = ScriptedRunner::new(succeed);
        assert!(run_checked(&honest, &invocation).is_ok());
    }

    #[test]
    fn non_zero_exit_is_engine_failure() {
        let runner = ScriptedRunner::new(fail);
        let invocation = ToolInvocation::pdal_summary(Path::new("x.las"), Duration::from_secs(5));
        let err = run_checked(&runner, &invocation).unwrap_err();
        assert!(matches!(
            err,
            ConvertError::ExternalEngineFailure { exit_code: Some(1), ref stderr_excerpt, .. }
                if stderr_excerpt == "engine error"
        ));
    }

    #[test]
    fn system_runner_reports_missing_program() {
        let invocation = ToolInvocation::obj2gltf(
            Path::new("/nonexistent/a.obj"),
            Path::new("/nonexistent/a.glb"),
            Duration::from_secs(5),
        );
        let invocation = ToolInvocation {
            program: "definitely-not-an-installed-engine".to_string(),
            cwd: None,
            ..invocation
        };
        assert!(matches!(
            SystemRunner.run(&invocation),
            Err(ConvertError::ExternalEngineUnavailable(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn system_runner_captures_output_and_times_out() {
        let echo = ToolInvocation {
            program: "sh".to_string(),
            args: vec!["-c".into(), "echo out; echo err 1>&2; exit 3".into()],
            cwd: None,
            timeout: Duration::from_secs(10),
            output: None,
        };
        let output = SystemRunner.run(&echo).unwrap();
        assert_eq!(output.exit_code, Some(3));
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "err");

        let sleeper = ToolInvocation {
            args: vec!["-c".into(), "sleep 5".into()],
            timeout: Duration::from_millis(200),
            ..echo
        };
        assert!(matches!(
            SystemRunner.run(&sleeper),
            Err(ConvertError::Timeout { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn leftover_background_process_does_not_hold_the_runner() {
        let started = Instant::now();
        let detached = ToolInvocation {
            program: "sh".to_string(),
            args: vec!["-c".into(), "sleep 30 & echo started".into()],
            cwd: None,
            timeout: Duration::from_secs(20),
            output: None,
        };
        let output = SystemRunner.run(&detached).unwrap();
        assert_eq!(output.exit_code, Some(0));
        assert!(started.elapsed() < Duration::from_secs(10));

        let started = Instant::now();
        let nested = ToolInvocation {
            args: vec!["-c".into(), "sleep 30 & sleep 30".into()],
            timeout: Duration::from_millis(200),
            ..detached
        };
        assert!(matches!(
            SystemRunner.run(&nested),
            Err(ConvertError::Timeout { .. })
        ));
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
