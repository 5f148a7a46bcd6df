use std::path::{Path, PathBuf};

use super::{Platform, resolve_data_dir};

pub struct NativePlatform;

impl Platform for NativePlatform {
    fn data_dir() -> PathBuf {
        let base = dirs::config_dir().unwrap_or_else(std::env::temp_dir);
        resolve_data_dir(base.join("creatorflow"))
    }

    fn restrict_dir_permissions(_path: &Path) {}

    fn restrict_file_permissions(_path: &Path) {}
}
