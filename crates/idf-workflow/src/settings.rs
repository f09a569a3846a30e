//! Workspace settings.
//!
//! Settings live in an optional `.idf-build.toml` at the workspace root, under an
//! `[idf]` table whose keys mirror the editor setting names (`buildPath`,
//! `adapterTargetName`, ...). Missing keys fall back to ESP-IDF defaults.

use anyhow::{Context, Result};
use idf_hal::DEFAULT_TIMEOUT;
use serde::Deserialize;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const SETTINGS_FILE: &str = ".idf-build.toml";
const WORKSPACE_FOLDER: &str = "${workspaceFolder}";
const DEFAULT_TARGET: &str = "esp32";
const DEFAULT_PYTHON: &str = "python3";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawIdfSettings {
    build_path: Option<String>,
    adapter_target_name: Option<String>,
    esp_idf_path: Option<String>,
    python_bin_path: Option<String>,
    cmake_compiler_args: Vec<String>,
    ninja_args: Vec<String>,
    pre_build_task: Option<String>,
    post_build_task: Option<String>,
    extra_paths: Vec<String>,
    task_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawSettingsFile {
    #[serde(default)]
    idf: RawIdfSettings,
}

/// Resolved settings for one workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub build_path: PathBuf,
    pub target: String,
    pub idf_path: Option<PathBuf>,
    pub python: String,
    pub cmake_args: Vec<String>,
    pub ninja_args: Vec<String>,
    pub pre_build_task: Option<String>,
    pub post_build_task: Option<String>,
    pub extra_paths: Vec<PathBuf>,
    pub task_timeout: Duration,
}

fn substitute(root: &Path, value: &str) -> String {
    value.replace(WORKSPACE_FOLDER, &root.to_string_lossy())
}

fn resolve_path(root: &Path, value: &str) -> PathBuf {
    let path = PathBuf::from(substitute(root, value));
    if path.is_absolute() {
        path
    } else {
        root.join(path)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl Settings {
    /// Defaults for a workspace with no settings file.
    pub fn defaults(root: &Path) -> Self {
        Self::resolve(root, RawIdfSettings::default(), std::env::var_os("IDF_PATH"))
    }

    /// Parses settings TOML for the workspace at `root`.
    pub fn from_toml_str(root: &Path, text: &str) -> Result<Self> {
        let raw: RawSettingsFile = toml::from_str(text).context("Failed to parse settings TOML")?;
        Ok(Self::resolve(root, raw.idf, std::env::var_os("IDF_PATH")))
    }

    /// Loads `path`, or `<root>/.idf-build.toml` when `path` is `None`.
    ///
    /// A missing default settings file yields [`Settings::defaults`]; a missing
    /// explicit file is an error.
    pub fn load(root: &Path, path: Option<&Path>) -> Result<Self> {
        let (file, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (root.join(SETTINGS_FILE), false),
        };
        if !explicit && !file.exists() {
            log::debug!("no {} in {}, using defaults", SETTINGS_FILE, root.display());
            return Ok(Self::defaults(root));
        }
        let text = fs::read_to_string(&file)
            .with_context(|| format!("Failed to read settings file {}", file.display()))?;
        Self::from_toml_str(root, &text)
            .with_context(|| format!("Invalid settings file {}", file.display()))
    }

    fn resolve(root: &Path, raw: RawIdfSettings, idf_env: Option<OsString>) -> Self {
        let build_path = raw
            .build_path
            .as_deref()
            .map(|p| resolve_path(root, p))
            .unwrap_or_else(|| root.join("build"));
        let idf_path = non_empty(raw.esp_idf_path)
            .map(|p| resolve_path(root, &p))
            .or_else(|| idf_env.filter(|v| !v.is_empty()).map(PathBuf::from));
        Self {
            build_path,
            target: non_empty(raw.adapter_target_name).unwrap_or_else(|| DEFAULT_TARGET.to_string()),
            idf_path,
            python: non_empty(raw.python_bin_path).unwrap_or_else(|| DEFAULT_PYTHON.to_string()),
            cmake_args: raw.cmake_compiler_args.iter().map(|a| substitute(root, a)).collect(),
            ninja_args: raw.ninja_args.iter().map(|a| substitute(root, a)).collect(),
            pre_build_task: non_empty(raw.pre_build_task).map(|t| substitute(root, &t)),
            post_build_task: non_empty(raw.post_build_task).map(|t| substitute(root, &t)),
            extra_paths: raw.extra_paths.iter().map(|p| resolve_path(root, p)).collect(),
            task_timeout: raw
                .task_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_TIMEOUT),
        }
    }

    /// String form of a setting addressed by its editor key (e.g. `idf.buildPath`).
    pub fn parameter(&self, key: &str) -> Option<String> {
        let join = |v: &[String]| v.join(" ");
        match key {
            "idf.buildPath" => Some(self.build_path.display().to_string()),
            "idf.adapterTargetName" => Some(self.target.clone()),
            "idf.espIdfPath" => self.idf_path.as_ref().map(|p| p.display().to_string()),
            "idf.pythonBinPath" => Some(self.python.clone()),
            "idf.cmakeCompilerArgs" => Some(join(&self.cmake_args)),
            "idf.ninjaArgs" => Some(join(&self.ninja_args)),
            "idf.preBuildTask" => self.pre_build_task.clone(),
            "idf.postBuildTask" => self.post_build_task.clone(),
            "idf.extraPaths" => std::env::join_paths(&self.extra_paths)
                .ok()
                .map(|p| p.to_string_lossy().into_owned()),
            "idf.taskTimeoutSecs" => Some(self.task_timeout.as_secs().to_string()),
            _ => None,
        }
    }
}

/// A project directory together with its resolved settings.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    settings: Settings,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>, settings: Settings) -> Self {
        Self {
            root: root.into(),
            settings,
        }
    }

    pub fn open(root: impl Into<PathBuf>, settings_path: Option<&Path>) -> Result<Self> {
        let root = root.into();
        let settings = Settings::load(&root, settings_path)?;
        Ok(Self { root, settings })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn build_path(&self) -> &Path {
        &self.settings.build_path
    }

    /// Environment applied to every external task started for this workspace.
    pub fn task_env(&self) -> Vec<(String, String)> {
        let mut env = Vec::new();
        if let Some(idf) = &self.settings.idf_path {
            env.push(("IDF_PATH".to_string(), idf.display().to_string()));
        }
        if !self.settings.extra_paths.is_empty() {
            let mut paths = self.settings.extra_paths.clone();
            if let Some(existing) = std::env::var_os("PATH") {
                paths.extend(std::env::split_paths(&existing));
            }
            match std::env::join_paths(paths) {
                Ok(joined) => env.push(("PATH".to_string(), joined.to_string_lossy().into_owned())),
                Err(err) => log::warn!("ignoring idf.extraPaths: {}", err),
            }
        }
        env
    }
}

/// Reads a setting for `workspace` by its editor key.
pub fn read_parameter(key: &str, workspace: &Workspace) -> Option<String> {
    workspace.settings.parameter(key)
}
