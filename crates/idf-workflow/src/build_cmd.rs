//! Build command coordinator.
//!
//! Runs one build of a workspace: pre-build hook, CMake build, size report,
//! post-build hook and, when requested, the DFU image. A single build or flash
//! may run at a time; failures are reported through the [`Notifier`] and never
//! propagate to the caller.

use crate::activity::{Activity, ActivityGuard};
use crate::build_task::BuildTask;
use crate::cancel::CancelToken;
use crate::components::{ProjectComponentsView, WorkspaceView};
use crate::custom_task::{CustomTask, CustomTaskPhase};
use crate::notify::Notifier;
use crate::settings::{read_parameter, Workspace};
use crate::size_task::SizeTask;
use crate::task_queue::TaskQueue;
use idf_error::{BuildError, BuildErrorKind, BuildResult};
use idf_hal::ToolHal;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

pub const BUILD_TAG: &str = "Build";

const FLASHER_ARGS: &str = "flasher_args.json";
const DFU_TARGETS: [&str; 2] = ["esp32s2", "esp32s3"];

const MSG_WAIT_FOR_TASK: &str = "Wait for ESP-IDF build or flash to finish";
const MSG_SUCCESS: &str = "Build Successfully";
const MSG_ALREADY_BUILDING: &str = "Already a build is running!";
const MSG_TERMINATED: &str = "Build is Terminated";
const MSG_FAILED: &str = "Something went wrong while trying to build the project";
const MSG_MISSING_FLASHER_ARGS: &str =
    "flasher_args.json file is missing from the build directory, can't proceed, please build properly!!";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlashType {
    #[default]
    Uart,
    Jtag,
    Dfu,
}

impl fmt::Display for FlashType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlashType::Uart => write!(f, "UART"),
            FlashType::Jtag => write!(f, "JTAG"),
            FlashType::Dfu => write!(f, "DFU"),
        }
    }
}

/// How a build command ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    Succeeded,
    /// DFU image requested for a target without DFU support; the build itself succeeded.
    DfuUnsupported { target: String },
    /// Another build or flash held the guard; nothing ran.
    Rejected,
    /// Cancellation arrived after the last step had already finished. Nothing
    /// was reported and the success block was skipped.
    CancelledAfterCompletion,
    Terminated,
    Failed(BuildErrorKind),
}

impl BuildOutcome {
    /// Whether the caller may continue with follow-up work (e.g. flashing).
    pub fn continue_flag(&self) -> bool {
        matches!(
            self,
            BuildOutcome::Succeeded
                | BuildOutcome::DfuUnsupported { .. }
                | BuildOutcome::CancelledAfterCompletion
        )
    }
}

/// Where the step sequence stopped without raising an error.
enum StepsEnd {
    Completed,
    MissingFlasherArgs(PathBuf),
    DfuUnsupported(String),
}

pub struct BuildCoordinator {
    hal: Arc<dyn ToolHal>,
    activity: Arc<ActivityGuard>,
    tasks: TaskQueue,
    notifier: Arc<dyn Notifier>,
    view: Arc<dyn WorkspaceView>,
    reconfigure: bool,
}

fn checkpoint(cancel: &CancelToken) -> BuildResult<()> {
    if cancel.is_cancelled() {
        return Err(BuildError::terminated());
    }
    Ok(())
}

impl BuildCoordinator {
    /// Coordinator sharing the process-wide activity guard.
    pub fn new(hal: Arc<dyn ToolHal>, notifier: Arc<dyn Notifier>) -> Self {
        let tasks = TaskQueue::new(Arc::clone(&hal));
        let view = Arc::new(ProjectComponentsView::new(Arc::clone(&hal)));
        Self {
            hal,
            activity: ActivityGuard::global(),
            tasks,
            notifier,
            view,
            reconfigure: false,
        }
    }

    pub fn with_activity(mut self, activity: Arc<ActivityGuard>) -> Self {
        self.activity = activity;
        self
    }

    pub fn with_view(mut self, view: Arc<dyn WorkspaceView>) -> Self {
        self.view = view;
        self
    }

    pub fn with_reconfigure(mut self, reconfigure: bool) -> Self {
        self.reconfigure = reconfigure;
        self
    }

    pub fn activity(&self) -> &Arc<ActivityGuard> {
        &self.activity
    }

    pub fn tasks(&self) -> &TaskQueue {
        &self.tasks
    }

    pub fn build_command(
        &self,
        workspace: &Workspace,
        cancel: &CancelToken,
        flash_type: FlashType,
    ) -> BuildOutcome {
        let lease = match self.activity.try_acquire(Activity::Build) {
            Ok(lease) => lease,
            Err(busy) => {
                self.notifier
                    .error_notify(MSG_WAIT_FOR_TASK, &busy, &[BUILD_TAG]);
                return BuildOutcome::Rejected;
            }
        };
        log::info!(
            "🔨 Building {} (flash type {})",
            workspace.root().display(),
            flash_type
        );
        self.tasks.reset();

        let _registration = {
            let tasks = self.tasks.clone();
            let activity = Arc::clone(&self.activity);
            let generation = lease.generation();
            cancel.on_cancel(move || {
                tasks.cancel_tasks();
                tasks.dispose_listeners();
                activity.release(generation);
            })
        };

        let outcome = match self.run_steps(workspace, cancel, flash_type) {
            Ok(StepsEnd::Completed) => {
                if cancel.is_cancelled() {
                    log::info!("build finished after cancellation; skipping success report");
                    BuildOutcome::CancelledAfterCompletion
                } else {
                    self.view.refresh_components(workspace);
                    self.notifier.info_notify(MSG_SUCCESS, &[BUILD_TAG]);
                    self.tasks.dispose_listeners();
                    BuildOutcome::Succeeded
                }
            }
            Ok(StepsEnd::MissingFlasherArgs(path)) => {
                let err = BuildError::new(
                    BuildErrorKind::MissingFlasherArgs,
                    format!("{} not found", path.display()),
                );
                self.notifier
                    .error_notify(MSG_MISSING_FLASHER_ARGS, &err, &[BUILD_TAG]);
                BuildOutcome::Failed(BuildErrorKind::MissingFlasherArgs)
            }
            Ok(StepsEnd::DfuUnsupported(target)) => {
                self.notifier.warn_notify(
                    &format!(
                        "The selected device target \"{}\" is not compatible for DFU, as a result the DFU.bin was not created.",
                        target
                    ),
                    &[BUILD_TAG],
                );
                BuildOutcome::DfuUnsupported { target }
            }
            Err(err) => self.report_failure(err),
        };

        drop(lease);
        outcome
    }

    fn run_steps(
        &self,
        workspace: &Workspace,
        cancel: &CancelToken,
        flash_type: FlashType,
    ) -> BuildResult<StepsEnd> {
        let hal = self.hal.as_ref();
        let build_task = BuildTask::new(workspace, hal, &self.tasks).reconfigure(self.reconfigure);
        let size_task = SizeTask::new(workspace, hal);
        let custom_task = CustomTask::new(workspace, &self.tasks);

        checkpoint(cancel)?;
        custom_task.add_custom_task(CustomTaskPhase::PreBuild);
        self.tasks.run_tasks(cancel)?;

        checkpoint(cancel)?;
        build_task.build(cancel)?;

        checkpoint(cancel)?;
        self.tasks.run_tasks(cancel)?;

        checkpoint(cancel)?;
        size_task.size_info(cancel)?;

        checkpoint(cancel)?;
        custom_task.add_custom_task(CustomTaskPhase::PostBuild);
        self.tasks.run_tasks(cancel)?;

        if flash_type == FlashType::Dfu {
            checkpoint(cancel)?;
            let build_path = read_parameter("idf.buildPath", workspace)
                .map(PathBuf::from)
                .unwrap_or_else(|| workspace.build_path().to_path_buf());
            let flasher_args = build_path.join(FLASHER_ARGS);
            if !hal.path_exists(&flasher_args) {
                return Ok(StepsEnd::MissingFlasherArgs(flasher_args));
            }
            let target = read_parameter("idf.adapterTargetName", workspace).unwrap_or_default();
            if !DFU_TARGETS.contains(&target.as_str()) {
                return Ok(StepsEnd::DfuUnsupported(target));
            }
            build_task.build_dfu(cancel)?;
            self.tasks.run_tasks(cancel)?;
        }

        Ok(StepsEnd::Completed)
    }

    fn report_failure(&self, err: BuildError) -> BuildOutcome {
        match err.kind() {
            BuildErrorKind::AlreadyBuilding => {
                self.notifier
                    .error_notify(MSG_ALREADY_BUILDING, &err, &[BUILD_TAG]);
                BuildOutcome::Failed(BuildErrorKind::AlreadyBuilding)
            }
            BuildErrorKind::Terminated => {
                self.notifier.warn_notify(MSG_TERMINATED, &[BUILD_TAG]);
                BuildOutcome::Terminated
            }
            kind => {
                self.notifier.error_notify(MSG_FAILED, &err, &[BUILD_TAG]);
                BuildOutcome::Failed(kind)
            }
        }
    }
}
