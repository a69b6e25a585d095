//! Default paths for tether components
//!
//! Channel sockets live in a per-user runtime directory:
//! `$XDG_RUNTIME_DIR/tether` or `/tmp/tether-$USER` as a fallback.

use std::path::PathBuf;

/// Environment variable for overriding the runtime directory
pub const TETHER_RUNTIME_DIR_ENV: &str = "TETHER_RUNTIME_DIR";

/// Application subdirectory name
const APP_DIR: &str = "tether";

/// Get the default runtime directory.
///
/// Order of precedence:
/// 1. `$TETHER_RUNTIME_DIR` environment variable (if set)
/// 2. `$XDG_RUNTIME_DIR/tether` (if XDG_RUNTIME_DIR is set)
/// 3. `/tmp/tether-$USER` (fallback)
pub fn default_runtime_dir() -> PathBuf {
    if let Ok(path) = std::env::var(TETHER_RUNTIME_DIR_ENV) {
        return PathBuf::from(path);
    }

    runtime_dir_without_env()
}

/// Get the runtime directory without checking TETHER_RUNTIME_DIR.
/// Used for default values in configs where the env var is checked separately.
pub fn runtime_dir_without_env() -> PathBuf {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        return PathBuf::from(runtime_dir).join(APP_DIR);
    }

    let username = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
    PathBuf::from(format!("/tmp/{}-{}", APP_DIR, username))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_dir_contains_tether() {
        let path = runtime_dir_without_env();
        assert!(path.to_string_lossy().contains("tether"));
    }
}
