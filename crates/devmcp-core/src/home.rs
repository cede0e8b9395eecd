//! Canonical home directory resolution for devmcp binaries.
//!
//! # Precedence
//!
//! 1. `DEVMCP_HOME` environment variable (if set and non-empty)
//! 2. `dirs::home_dir()` platform default

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Resolve the home directory used for auth files and the structured event log.
///
/// # Errors
///
/// Returns an error if `DEVMCP_HOME` is unset and the platform home directory
/// cannot be determined.
pub fn get_home_dir() -> Result<PathBuf> {
    if let Ok(home) = std::env::var("DEVMCP_HOME") {
        let trimmed = home.trim();
        if !trimmed.is_empty() {
            return Ok(PathBuf::from(trimmed));
        }
    }
    dirs::home_dir().context("could not determine home directory")
}

/// `<HOME>/.config/devmcp` — base directory for auth files (§6).
pub fn config_dir() -> Result<PathBuf> {
    Ok(get_home_dir()?.join(".config/devmcp"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    #[test]
    #[serial]
    fn devmcp_home_override_wins() {
        let original = env::var("DEVMCP_HOME").ok();
        unsafe { env::set_var("DEVMCP_HOME", "/custom/home") };
        assert_eq!(get_home_dir().unwrap(), PathBuf::from("/custom/home"));
        unsafe {
            match original {
                Some(v) => env::set_var("DEVMCP_HOME", v),
                None => env::remove_var("DEVMCP_HOME"),
            }
        }
    }

    #[test]
    #[serial]
    fn empty_devmcp_home_falls_back_to_platform_default() {
        let original = env::var("DEVMCP_HOME").ok();
        unsafe { env::set_var("DEVMCP_HOME", "   ") };
        assert_eq!(get_home_dir().unwrap(), dirs::home_dir().unwrap());
        unsafe {
            match original {
                Some(v) => env::set_var("DEVMCP_HOME", v),
                None => env::remove_var("DEVMCP_HOME"),
            }
        }
    }
}
