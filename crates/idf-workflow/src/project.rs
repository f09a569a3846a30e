//! `project_description.json`, written by the ESP-IDF CMake configure step.

use idf_error::{BuildError, BuildErrorKind, BuildResult};
use idf_hal::FsOps;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const PROJECT_DESCRIPTION: &str = "project_description.json";

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProjectDescription {
    pub project_name: String,
    pub target: Option<String>,
    pub app_elf: Option<String>,
    pub build_dir: Option<PathBuf>,
    pub build_components: Vec<String>,
}

impl ProjectDescription {
    pub fn parse(text: &str) -> BuildResult<Self> {
        serde_json::from_str(text).map_err(|e| {
            BuildError::with_source(
                BuildErrorKind::Config,
                format!("malformed {}", PROJECT_DESCRIPTION),
                e,
            )
        })
    }

    pub fn load<F: FsOps + ?Sized>(fs: &F, build_path: &Path) -> BuildResult<Self> {
        let path = build_path.join(PROJECT_DESCRIPTION);
        let text = fs.read_to_string(&path)?;
        Self::parse(&text)
    }

    /// Linker map of the application image, relative to `build_path`.
    pub fn map_file(&self, build_path: &Path) -> PathBuf {
        let stem = self
            .app_elf
            .as_deref()
            .and_then(|elf| elf.strip_suffix(".elf"))
            .map(str::to_string)
            .unwrap_or_else(|| self.project_name.clone());
        build_path.join(format!("{}.map", stem))
    }
}
