//! Static memory usage of the built application (`idf_size.py`).

use crate::cancel::CancelToken;
use crate::project::ProjectDescription;
use crate::settings::Workspace;
use idf_error::{BuildError, BuildErrorKind, BuildResult};
use idf_hal::{ProcessSpec, ToolHal};
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;

/// Totals reported by `idf_size.py --format json`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct SizeReport {
    #[serde(default)]
    pub dram_data: u64,
    #[serde(default)]
    pub dram_bss: u64,
    #[serde(default)]
    pub used_dram: u64,
    #[serde(default)]
    pub available_dram: u64,
    #[serde(default)]
    pub used_iram: u64,
    #[serde(default)]
    pub available_iram: u64,
    #[serde(default)]
    pub flash_code: u64,
    #[serde(default)]
    pub flash_rodata: u64,
    pub total_size: u64,
}

fn percent(used: u64, available: u64) -> f64 {
    let total = used.saturating_add(available);
    if total == 0 {
        return 0.0;
    }
    used as f64 * 100.0 / total as f64
}

impl SizeReport {
    pub fn parse(json: &str) -> BuildResult<Self> {
        serde_json::from_str(json).map_err(|e| {
            BuildError::with_source(BuildErrorKind::Size, "malformed idf_size output", e)
        })
    }

    pub fn dram_usage_percent(&self) -> f64 {
        percent(self.used_dram, self.available_dram)
    }

    pub fn iram_usage_percent(&self) -> f64 {
        percent(self.used_iram, self.available_iram)
    }
}

impl fmt::Display for SizeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total sizes:")?;
        writeln!(
            f,
            "  DRAM .data  {:>9} bytes    DRAM .bss     {:>9} bytes",
            self.dram_data, self.dram_bss
        )?;
        writeln!(
            f,
            "  Used DRAM   {:>9} bytes    ({:.1}% of {})",
            self.used_dram,
            self.dram_usage_percent(),
            self.used_dram.saturating_add(self.available_dram)
        )?;
        writeln!(
            f,
            "  Used IRAM   {:>9} bytes    ({:.1}% of {})",
            self.used_iram,
            self.iram_usage_percent(),
            self.used_iram.saturating_add(self.available_iram)
        )?;
        writeln!(
            f,
            "  Flash code  {:>9} bytes    Flash rodata  {:>9} bytes",
            self.flash_code, self.flash_rodata
        )?;
        write!(f, "  Total image size: {} bytes", self.total_size)
    }
}

pub struct SizeTask<'a> {
    workspace: &'a Workspace,
    hal: &'a dyn ToolHal,
}

impl<'a> SizeTask<'a> {
    pub fn new(workspace: &'a Workspace, hal: &'a dyn ToolHal) -> Self {
        Self { workspace, hal }
    }

    fn idf_size_script(&self) -> BuildResult<PathBuf> {
        let idf = self.workspace.settings().idf_path.as_ref().ok_or_else(|| {
            BuildError::new(
                BuildErrorKind::Config,
                "idf.espIdfPath is not set and IDF_PATH is unset",
            )
        })?;
        Ok(idf.join("tools").join("idf_size.py"))
    }

    pub fn size_info(&self, cancel: &CancelToken) -> BuildResult<SizeReport> {
        if cancel.is_cancelled() {
            return Err(BuildError::terminated());
        }
        let build_path = self.workspace.build_path();
        let description = ProjectDescription::load(self.hal, build_path)?;
        let map_file = description.map_file(build_path);
        if !self.hal.path_exists(&map_file) {
            return Err(BuildError::new(
                BuildErrorKind::Size,
                format!("map file {} not found", map_file.display()),
            ));
        }

        let settings = self.workspace.settings();
        let mut spec = ProcessSpec::new(settings.python.clone())
            .arg(self.idf_size_script()?.display().to_string())
            .arg(map_file.display().to_string())
            .args(["--format", "json"])
            .cwd(self.workspace.root())
            .timeout(settings.task_timeout);
        for (key, value) in self.workspace.task_env() {
            spec = spec.env(key, value);
        }

        let output = self
            .hal
            .command_output_cancellable(&spec, &|| cancel.is_cancelled())?;
        let report = SizeReport::parse(&output.stdout)?;
        log::info!("{}\n{}", description.project_name, report);
        Ok(report)
    }
}
