//! CMake/Ninja build of an ESP-IDF project.
//!
//! Both entry points only queue work; the coordinator flushes the queue.

use crate::cancel::CancelToken;
use crate::settings::Workspace;
use crate::task_queue::TaskQueue;
use idf_error::{BuildError, BuildResult};
use idf_hal::{ProcessSpec, ToolHal};

const CMAKE: &str = "cmake";
const CMAKE_CACHE: &str = "CMakeCache.txt";

pub struct BuildTask<'a> {
    workspace: &'a Workspace,
    hal: &'a dyn ToolHal,
    tasks: &'a TaskQueue,
    reconfigure: bool,
}

impl<'a> BuildTask<'a> {
    pub fn new(workspace: &'a Workspace, hal: &'a dyn ToolHal, tasks: &'a TaskQueue) -> Self {
        Self {
            workspace,
            hal,
            tasks,
            reconfigure: false,
        }
    }

    /// Always run the CMake configure step, even with an existing cache.
    pub fn reconfigure(mut self, reconfigure: bool) -> Self {
        self.reconfigure = reconfigure;
        self
    }

    fn spec(&self) -> ProcessSpec {
        let mut spec = ProcessSpec::new(CMAKE)
            .cwd(self.workspace.root())
            .timeout(self.workspace.settings().task_timeout);
        for (key, value) in self.workspace.task_env() {
            spec = spec.env(key, value);
        }
        spec
    }

    fn build_dir_arg(&self) -> String {
        self.workspace.build_path().display().to_string()
    }

    pub fn build(&self, cancel: &CancelToken) -> BuildResult<()> {
        if cancel.is_cancelled() {
            return Err(BuildError::terminated());
        }
        let settings = self.workspace.settings();
        let build_path = self.workspace.build_path();
        self.hal.create_dir_all(build_path)?;

        if self.reconfigure || !self.hal.path_exists(&build_path.join(CMAKE_CACHE)) {
            let configure = self
                .spec()
                .args(["-G", "Ninja", "-S"])
                .arg(self.workspace.root().display().to_string())
                .arg("-B")
                .arg(self.build_dir_arg())
                .arg(format!("-DIDF_TARGET={}", settings.target))
                .args(["-DPYTHON_DEPS_CHECKED=1", "-DESP_PLATFORM=1"])
                .args(settings.cmake_args.iter().cloned());
            self.tasks.add_task("configure", configure);
        }

        let mut build = self.spec().arg("--build").arg(self.build_dir_arg());
        if !settings.ninja_args.is_empty() {
            build = build.arg("--").args(settings.ninja_args.iter().cloned());
        }
        self.tasks.add_task("build", build);
        Ok(())
    }

    pub fn build_dfu(&self, cancel: &CancelToken) -> BuildResult<()> {
        if cancel.is_cancelled() {
            return Err(BuildError::terminated());
        }
        let dfu = self
            .spec()
            .arg("--build")
            .arg(self.build_dir_arg())
            .args(["--target", "dfu"]);
        self.tasks.add_task("dfu", dfu);
        Ok(())
    }
}
