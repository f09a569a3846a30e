//! Fake HAL implementation for testing.
//!
//! This implementation records all operations without executing them,
//! allowing for CI-safe testing without an ESP-IDF toolchain.

use super::{CommandOutput, FsOps, ProcessOps, ProcessSpec};
use crate::{HalError, HalResult};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Operation records for testing and verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Command {
        program: String,
        args: Vec<String>,
        cwd: Option<PathBuf>,
    },
    PathExists {
        path: PathBuf,
    },
    ReadFile {
        path: PathBuf,
    },
    CreateDir {
        path: PathBuf,
    },
}

/// Scripted reply for commands matched by a rule.
#[derive(Debug, Clone)]
pub enum FakeResponse {
    Output(String),
    Fail { code: i32, stderr: String },
    /// Blocks until cancelled or the [`ProcessSpec`] timeout elapses.
    Hang,
}

type Matcher = Box<dyn Fn(&ProcessSpec) -> bool + Send + Sync>;
type Hook = Box<dyn Fn() + Send + Sync>;

struct Rule {
    matcher: Matcher,
    response: FakeResponse,
    hook: Option<Hook>,
}

/// Shared state for FakeHal operations.
#[derive(Default)]
struct FakeHalState {
    /// All operations that were recorded
    operations: Vec<Operation>,
    existing_paths: HashSet<PathBuf>,
    files: HashMap<PathBuf, String>,
    rules: Vec<Rule>,
}

/// Fake HAL implementation that records operations without executing them.
///
/// Commands without a matching rule succeed with empty output. When several
/// rules match, the most recently registered one wins.
#[derive(Clone, Default)]
pub struct FakeHal {
    state: Arc<Mutex<FakeHalState>>,
}

impl fmt::Debug for FakeHal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FakeHal")
            .field("operations", &self.operation_count())
            .finish()
    }
}

const HANG_POLL: Duration = Duration::from_millis(5);

impl FakeHal {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, FakeHalState> {
        match self.state.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Get all recorded operations.
    pub fn operations(&self) -> Vec<Operation> {
        self.state().operations.clone()
    }

    /// Get the number of operations recorded.
    pub fn operation_count(&self) -> usize {
        self.state().operations.len()
    }

    pub fn has_operation<F>(&self, check: F) -> bool
    where
        F: Fn(&Operation) -> bool,
    {
        self.state().operations.iter().any(check)
    }

    /// Command lines that were run, in order, as `program arg...` strings.
    pub fn commands(&self) -> Vec<String> {
        self.state()
            .operations
            .iter()
            .filter_map(|op| match op {
                Operation::Command { program, args, .. } => {
                    let mut line = program.clone();
                    for arg in args {
                        line.push(' ');
                        line.push_str(arg);
                    }
                    Some(line)
                }
                _ => None,
            })
            .collect()
    }

    /// Mark a path as existing without file contents.
    pub fn add_path(&self, path: impl Into<PathBuf>) {
        self.state().existing_paths.insert(path.into());
    }

    /// Provide file contents; the path also counts as existing.
    pub fn add_file(&self, path: impl Into<PathBuf>, contents: impl Into<String>) {
        let path = path.into();
        let mut state = self.state();
        state.existing_paths.insert(path.clone());
        state.files.insert(path, contents.into());
    }

    pub fn on_command<M>(&self, matcher: M, response: FakeResponse)
    where
        M: Fn(&ProcessSpec) -> bool + Send + Sync + 'static,
    {
        self.state().rules.push(Rule {
            matcher: Box::new(matcher),
            response,
            hook: None,
        });
    }

    /// Like [`FakeHal::on_command`], additionally running `hook` before replying.
    pub fn on_command_with_hook<M, H>(&self, matcher: M, response: FakeResponse, hook: H)
    where
        M: Fn(&ProcessSpec) -> bool + Send + Sync + 'static,
        H: Fn() + Send + Sync + 'static,
    {
        self.state().rules.push(Rule {
            matcher: Box::new(matcher),
            response,
            hook: Some(Box::new(hook)),
        });
    }

    fn record(&self, op: Operation) {
        self.state().operations.push(op);
    }
}

impl ProcessOps for FakeHal {
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
        self.record(Operation::Command {
            program: spec.program.clone(),
            args: spec.args.clone(),
            cwd: spec.cwd.clone(),
        });

        // Hooks run without the state lock held so they may call back into the fake.
        let matched = {
            let state = self.state();
            state
                .rules
                .iter()
                .rposition(|rule| (rule.matcher)(spec))
                .map(|idx| (idx, state.rules[idx].response.clone()))
        };
        let Some((idx, response)) = matched else {
            return Ok(CommandOutput::default());
        };
        let hook = self.state().rules[idx].hook.take();
        if let Some(hook) = &hook {
            hook();
        }
        if let Some(hook) = hook {
            self.state().rules[idx].hook = Some(hook);
        }

        match response {
            FakeResponse::Output(stdout) => Ok(CommandOutput {
                stdout,
                stderr: String::new(),
            }),
            FakeResponse::Fail { code, stderr } => Err(HalError::CommandFailed {
                program: spec.program.clone(),
                code: Some(code),
                stderr,
            }),
            FakeResponse::Hang => {
                let started = Instant::now();
                loop {
                    if cancelled() {
                        return Err(HalError::Cancelled {
                            program: spec.program.clone(),
                        });
                    }
                    if started.elapsed() >= spec.timeout {
                        return Err(HalError::CommandTimeout {
                            program: spec.program.clone(),
                            timeout_secs: spec.timeout.as_secs(),
                        });
                    }
                    std::thread::sleep(HANG_POLL);
                }
            }
        }
    }
}

impl FsOps for FakeHal {
    fn path_exists(&self, path: &Path) -> bool {
        let mut state = self.state();
        state.operations.push(Operation::PathExists {
            path: path.to_path_buf(),
        });
        state.existing_paths.contains(path)
    }

    fn read_to_string(&self, path: &Path) -> HalResult<String> {
        let mut state = self.state();
        state.operations.push(Operation::ReadFile {
            path: path.to_path_buf(),
        });
        state.files.get(path).cloned().ok_or_else(|| {
            HalError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} not found", path.display()),
            ))
        })
    }

    fn create_dir_all(&self, path: &Path) -> HalResult<()> {
        let mut state = self.state();
        state.operations.push(Operation::CreateDir {
            path: path.to_path_buf(),
        });
        state.existing_paths.insert(path.to_path_buf());
        Ok(())
    }
}
