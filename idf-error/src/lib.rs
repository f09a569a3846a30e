use std::fmt;
use std::io;
use thiserror::Error;

pub type HalResult<T> = Result<T, HalError>;
pub type BuildResult<T> = Result<T, BuildError>;

#[derive(Error, Debug)]
pub enum HalError {
    #[error("Command not found: {0}")]
    CommandNotFound(String),

    #[error("Command failed: {program} (exit={code:?}): {stderr}")]
    CommandFailed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Command timed out: {program} after {timeout_secs}s")]
    CommandTimeout { program: String, timeout_secs: u64 },

    #[error("Command cancelled: {program}")]
    Cancelled { program: String },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("{0}")]
    Other(String),
}

/// Discriminant for build failures.
///
/// The coordinator maps `AlreadyBuilding` and `Terminated` to dedicated
/// notifications; every other kind is reported as a generic failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildErrorKind {
    /// The task runner is already executing a batch.
    AlreadyBuilding,
    /// Cancellation was observed, or a task was killed on request.
    Terminated,
    /// `flasher_args.json` is absent from the build directory.
    MissingFlasherArgs,
    /// A queued task exited unsuccessfully.
    Task,
    /// Size information could not be produced.
    Size,
    /// Settings could not be read or are invalid.
    Config,
    Hal,
    Io,
}

impl BuildErrorKind {
    /// Stable tag used in logs.
    pub const fn tag(self) -> &'static str {
        match self {
            BuildErrorKind::AlreadyBuilding => "ALREADY_BUILDING",
            BuildErrorKind::Terminated => "BUILD_TERMINATED",
            BuildErrorKind::MissingFlasherArgs => "MISSING_FLASHER_ARGS",
            BuildErrorKind::Task => "TASK_FAILED",
            BuildErrorKind::Size => "SIZE_FAILED",
            BuildErrorKind::Config => "CONFIG",
            BuildErrorKind::Hal => "HAL",
            BuildErrorKind::Io => "IO",
        }
    }
}

impl fmt::Display for BuildErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[derive(Error, Debug)]
#[error("{message}")]
pub struct BuildError {
    kind: BuildErrorKind,
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl BuildError {
    pub fn new(kind: BuildErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        kind: BuildErrorKind,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn already_building() -> Self {
        Self::new(BuildErrorKind::AlreadyBuilding, "a task batch is already running")
    }

    pub fn terminated() -> Self {
        Self::new(BuildErrorKind::Terminated, "build terminated")
    }

    pub fn kind(&self) -> BuildErrorKind {
        self.kind
    }
}

impl From<HalError> for BuildError {
    fn from(err: HalError) -> Self {
        match err {
            HalError::Cancelled { program } => Self::new(
                BuildErrorKind::Terminated,
                format!("{} was terminated", program),
            ),
            HalError::CommandFailed {
                ref program, code, ..
            } => {
                let message = format!("{} exited with {:?}", program, code);
                Self::with_source(BuildErrorKind::Task, message, err)
            }
            other => Self::with_source(BuildErrorKind::Hal, other.to_string(), other),
        }
    }
}

impl From<io::Error> for BuildError {
    fn from(err: io::Error) -> Self {
        Self::with_source(BuildErrorKind::Io, err.to_string(), err)
    }
}
