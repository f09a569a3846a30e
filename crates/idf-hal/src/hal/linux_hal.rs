//! Real HAL backed by child processes and the local filesystem.

use super::{CommandOutput, FsOps, ProcessOps, ProcessSpec};
use crate::{HalError, HalResult};
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::fs;
use std::io::Read;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use wait_timeout::ChildExt;

/// Real HAL implementation for Linux systems.
#[derive(Debug, Clone, Default)]
pub struct LinuxHal;

impl LinuxHal {
    pub fn new() -> Self {
        Self
    }
}

const CANCEL_POLL: Duration = Duration::from_millis(100);

fn map_command_err(program: &str, err: std::io::Error) -> HalError {
    if err.kind() == std::io::ErrorKind::NotFound {
        return HalError::CommandNotFound(program.to_string());
    }
    HalError::Io(err)
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

/// Kills the child's whole process group so grandchildren (ninja, compilers)
/// release the output pipes too.
fn kill_and_reap(child: &mut Child) {
    if let Err(err) = killpg(Pid::from_raw(child.id() as i32), Signal::SIGKILL) {
        log::debug!("killpg {} failed: {}", child.id(), err);
    }
    let _ = child.kill();
    let _ = child.wait();
}

impl ProcessOps for LinuxHal {
    fn command_output_cancellable(
        &self,
        spec: &ProcessSpec,
        cancelled: &dyn Fn() -> bool,
    ) -> HalResult<CommandOutput> {
        if cancelled() {
            return Err(HalError::Cancelled {
                program: spec.program.clone(),
            });
        }

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0);
        if let Some(cwd) = &spec.cwd {
            cmd.current_dir(cwd);
        }
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }

        log::debug!("spawning: {}", spec);
        let mut child = cmd.spawn().map_err(|e| map_command_err(&spec.program, e))?;

        // Drain pipes concurrently to avoid deadlocks on large output.
        let stdout_handle = drain(child.stdout.take());
        let stderr_handle = drain(child.stderr.take());

        let started = Instant::now();
        let status = loop {
            if let Some(status) = child.wait_timeout(CANCEL_POLL).map_err(HalError::Io)? {
                break status;
            }
            if cancelled() {
                kill_and_reap(&mut child);
                let _ = stdout_handle.join();
                let _ = stderr_handle.join();
                return Err(HalError::Cancelled {
                    program: spec.program.clone(),
                });
            }
            if started.elapsed() >= spec.timeout {
                kill_and_reap(&mut child);
                let _ = stdout_handle.join();
                let _ = stderr_handle.join();
                return Err(HalError::CommandTimeout {
                    program: spec.program.clone(),
                    timeout_secs: spec.timeout.as_secs(),
                });
            }
        };

        let stdout = stdout_handle.join().unwrap_or_default();
        let stderr = stderr_handle.join().unwrap_or_default();
        let stdout = String::from_utf8_lossy(&stdout).into_owned();
        let stderr = String::from_utf8_lossy(&stderr).into_owned();

        if !status.success() {
            return Err(HalError::CommandFailed {
                program: spec.program.clone(),
                code: status.code(),
                stderr: stderr.trim().to_string(),
            });
        }
        Ok(CommandOutput { stdout, stderr })
    }
}

impl FsOps for LinuxHal {
    fn path_exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn read_to_string(&self, path: &Path) -> HalResult<String> {
        Ok(fs::read_to_string(path)?)
    }

    fn create_dir_all(&self, path: &Path) -> HalResult<()> {
        Ok(fs::create_dir_all(path)?)
    }
}
