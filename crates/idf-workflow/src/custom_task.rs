//! User-configured pre/post build hooks.

use crate::settings::Workspace;
use crate::task_queue::TaskQueue;
use idf_hal::ProcessSpec;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CustomTaskPhase {
    PreBuild,
    PostBuild,
}

impl fmt::Display for CustomTaskPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CustomTaskPhase::PreBuild => write!(f, "pre-build"),
            CustomTaskPhase::PostBuild => write!(f, "post-build"),
        }
    }
}

pub struct CustomTask<'a> {
    workspace: &'a Workspace,
    tasks: &'a TaskQueue,
}

impl<'a> CustomTask<'a> {
    pub fn new(workspace: &'a Workspace, tasks: &'a TaskQueue) -> Self {
        Self { workspace, tasks }
    }

    fn command(&self, phase: CustomTaskPhase) -> Option<&str> {
        let settings = self.workspace.settings();
        match phase {
            CustomTaskPhase::PreBuild => settings.pre_build_task.as_deref(),
            CustomTaskPhase::PostBuild => settings.post_build_task.as_deref(),
        }
    }

    /// Queues the hook for `phase` if one is configured. Returns whether it did.
    pub fn add_custom_task(&self, phase: CustomTaskPhase) -> bool {
        let Some(command) = self.command(phase) else {
            return false;
        };
        let mut spec = ProcessSpec::new("sh")
            .args(["-c", command])
            .cwd(self.workspace.root())
            .timeout(self.workspace.settings().task_timeout);
        for (key, value) in self.workspace.task_env() {
            spec = spec.env(key, value);
        }
        self.tasks.add_task(phase.to_string(), spec);
        true
    }
}
