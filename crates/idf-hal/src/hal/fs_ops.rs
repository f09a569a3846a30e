//! Filesystem checks for build artifacts.

use crate::HalResult;
use std::path::Path;

pub trait FsOps {
    fn path_exists(&self, path: &Path) -> bool;

    fn read_to_string(&self, path: &Path) -> HalResult<String>;

    fn create_dir_all(&self, path: &Path) -> HalResult<()>;
}
