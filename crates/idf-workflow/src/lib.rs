//! idf-build workflow orchestration.
//!
//! This crate holds the build coordinator and the collaborators it sequences:
//! the task queue that executes external commands, the build, size and custom
//! tasks that feed it, and the activity guard that keeps a single build or
//! flash running at a time. World-touching operations go through `idf-hal`.

pub mod activity;
pub mod build_cmd;
pub mod build_task;
pub mod cancel;
pub mod components;
pub mod custom_task;
pub mod notify;
pub mod project;
pub mod settings;
pub mod size_task;
pub mod task_queue;

#[cfg(test)]
pub(crate) mod test_env;

pub use activity::{Activity, ActivityBusy, ActivityGuard, ActivityLease};
pub use build_cmd::{BuildCoordinator, BuildOutcome, FlashType, BUILD_TAG};
pub use build_task::BuildTask;
pub use cancel::{CancelRegistration, CancelToken};
pub use components::{ProjectComponentsView, WorkspaceView};
pub use custom_task::{CustomTask, CustomTaskPhase};
pub use notify::{LogNotifier, Notification, NotifyLevel, Notifier, RecordingNotifier};
pub use settings::{read_parameter, Settings, Workspace};
pub use size_task::{SizeReport, SizeTask};
pub use task_queue::{TaskEvent, TaskQueue, TaskStatus};
