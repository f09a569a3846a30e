//! Component view of a built workspace.

use crate::project::ProjectDescription;
use crate::settings::Workspace;
use idf_error::BuildResult;
use idf_hal::ToolHal;
use std::sync::Arc;

pub trait WorkspaceView: Send + Sync {
    /// Refreshes the component listing after a successful build.
    ///
    /// Never fails the build; implementations log their own problems.
    fn refresh_components(&self, workspace: &Workspace);
}

/// Lists `build_components` from `project_description.json`.
pub struct ProjectComponentsView {
    hal: Arc<dyn ToolHal>,
}

impl ProjectComponentsView {
    pub fn new(hal: Arc<dyn ToolHal>) -> Self {
        Self { hal }
    }

    pub fn components(&self, workspace: &Workspace) -> BuildResult<Vec<String>> {
        let desc = ProjectDescription::load(self.hal.as_ref(), workspace.build_path())?;
        let mut components = desc.build_components;
        components.sort();
        Ok(components)
    }
}

impl WorkspaceView for ProjectComponentsView {
    fn refresh_components(&self, workspace: &Workspace) {
        match self.components(workspace) {
            Ok(components) => {
                log::info!("🧩 {} components", components.len());
                for name in &components {
                    log::debug!("  {}", name);
                }
            }
            Err(err) => log::warn!("could not refresh components view: {}", err),
        }
    }
}
