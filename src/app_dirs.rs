use directories::ProjectDirs;
use std::path::PathBuf;

const APP_NAME: &str = "vessel";

/// Centralized application directory resolution
pub struct AppDirs;

impl AppDirs {
    /// `$HOME/.local/state/vessel`, or the platform data dir without `$HOME`
    pub fn state_dir() -> Option<PathBuf> {
        if let Ok(home) = std::env::var("HOME") {
            Some(
                PathBuf::from(home)
                    .join(".local")
                    .join("state")
                    .join(APP_NAME),
            )
        } else {
            ProjectDirs::from("", "", APP_NAME)
                .map(|proj_dirs| proj_dirs.data_local_dir().to_path_buf())
        }
    }

    pub fn vault_path() -> Option<PathBuf> {
        Self::state_dir().map(|dir| dir.join("vault.db"))
    }

    pub fn log_path() -> Option<PathBuf> {
        Self::state_dir().map(|dir| dir.join("vessel.log"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn files_live_in_the_state_dir() {
        let Some(state) = AppDirs::state_dir() else {
            return;
        };
        assert!(state.ends_with(APP_NAME));
        assert_eq!(AppDirs::vault_path().unwrap(), state.join("vault.db"));
        assert_eq!(AppDirs::log_path().unwrap(), state.join("vessel.log"));
    }
}
