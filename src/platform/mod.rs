use std::path::{Path, PathBuf};

/// Platform-specific filesystem operations behind a common interface so
/// call sites stay free of `#[cfg]` blocks.
pub trait Platform {
    /// Root data directory for creatorflow.
    /// Unix: `~/.creatorflow`, Windows: `%APPDATA%\creatorflow`.
    fn data_dir() -> PathBuf;

    /// Set restrictive *directory* permissions (0o700 on Unix, no-op on Windows).
    fn restrict_dir_permissions(path: &Path);

    /// Set restrictive *file* permissions (0o600 on Unix, no-op on Windows).
    fn restrict_file_permissions(path: &Path);
}

/// Environment override for the data directory, used by tests and
/// side-by-side installs.
pub const DATA_DIR_ENV: &str = "CREATORFLOW_DATA_DIR";

pub(crate) fn resolve_data_dir(default: PathBuf) -> PathBuf {
    match std::env::var_os(DATA_DIR_ENV) {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => default,
    }
}

#[cfg(unix)]
mod unix;
#[cfg(unix)]
pub use unix::NativePlatform;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub use windows::NativePlatform;
