//! Host environment utility functions

use std::path::PathBuf;

/// Name of the environment variable pointing at the software root directory.
///
/// The root holds the `params` directory and the `sessions` directory, and is
/// where taught station geometry is persisted.
pub const SW_ROOT_ENV_VAR: &str = "HANDLER_SW_ROOT";

/// Get the software root directory from the environment.
pub fn get_handler_sw_root() -> Result<PathBuf, std::env::VarError> {
    std::env::var(SW_ROOT_ENV_VAR).map(PathBuf::from)
}
