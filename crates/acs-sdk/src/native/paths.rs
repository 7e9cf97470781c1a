//! Native library search path resolution
//!
//! Order: explicit configuration, then `ACS_SDK_LIB_DIR`, then directories
//! relative to the running executable. The gateway computes the list once and
//! keeps it for its lifetime.

use std::env;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use crate::config::LIB_DIR_ENV;

/// `<os>-<arch>` of the running process
pub fn platform() -> String {
    format!("{}-{}", env::consts::OS, env::consts::ARCH)
}

/// Default vendor library file name for the current OS
pub fn default_library_name() -> &'static str {
    if cfg!(target_os = "windows") {
        "HCNetSDK.dll"
    } else if cfg!(target_os = "macos") {
        "libhcnetsdk.dylib"
    } else {
        "libhcnetsdk.so"
    }
}

/// Search directories from the process environment
pub fn search_dirs(config_dir: Option<&Path>) -> Vec<PathBuf> {
    let env_value = env::var_os(LIB_DIR_ENV);
    let exe_dir = env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf));
    resolve_search_dirs(config_dir, env_value.as_deref(), exe_dir.as_deref())
}

/// Ordered, de-duplicated candidate directories
pub fn resolve_search_dirs(
    config_dir: Option<&Path>,
    env_value: Option<&OsStr>,
    exe_dir: Option<&Path>,
) -> Vec<PathBuf> {
    let mut dirs = Vec::new();

    if let Some(dir) = config_dir {
        dirs.push(dir.to_path_buf());
    }

    if let Some(value) = env_value {
        dirs.extend(env::split_paths(value).filter(|p| !p.as_os_str().is_empty()));
    }

    if let Some(exe) = exe_dir {
        dirs.push(exe.join("sdk").join(platform()));
        dirs.push(exe.join("sdk"));
        dirs.push(exe.join("lib"));
        dirs.push(exe.to_path_buf());
        if cfg!(target_os = "linux") {
            if let Some(parent) = exe.parent() {
                dirs.push(parent.join("lib"));
            }
        }
    }

    let mut unique = Vec::with_capacity(dirs.len());
    for dir in dirs {
        if !unique.contains(&dir) {
            unique.push(dir);
        }
    }
    unique
}

/// First directory containing `library_name`
pub fn locate_library(dirs: &[PathBuf], library_name: &str) -> Option<PathBuf> {
    dirs.iter()
        .map(|dir| dir.join(library_name))
        .find(|candidate| candidate.is_file())
}
