// Application state module
// Immutable state shared by every connection

use std::path::{Path, PathBuf};

use super::types::Config;
use crate::error::ServerError;

/// Application state, built once at startup and shared behind `Arc`
#[derive(Debug)]
pub struct AppState {
    pub config: Config,
    /// Canonical serving root; every resolved path must stay below it
    pub root: PathBuf,
    pub access_log: bool,
}

impl AppState {
    /// Create `AppState`, validating the serving root
    pub fn new(config: Config) -> Result<Self, ServerError> {
        let root = canonical_root(Path::new(&config.serve.root))?;
        let access_log = config.logging.access_log;

        Ok(Self {
            config,
            root,
            access_log,
        })
    }
}

fn canonical_root(path: &Path) -> Result<PathBuf, ServerError> {
    let root = path.canonicalize().map_err(|source| ServerError::Root {
        path: path.display().to_string(),
        source,
    })?;

    if !root.is_dir() {
        return Err(ServerError::NotADirectory(root.display().to_string()));
    }
    Ok(root)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_is_canonicalised() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("site")).unwrap();

        let mut config = Config::from_defaults().unwrap();
        config.serve.root = format!("{}/site/../site", dir.path().display());

        let state = AppState::new(config).unwrap();
        assert_eq!(state.root, dir.path().join("site").canonicalize().unwrap());
        assert!(state.access_log);
    }

    #[test]
    fn test_missing_root() {
        let mut config = Config::from_defaults().unwrap();
        config.serve.root = "/nonexistent/nocache-root".to_string();
        assert!(matches!(
            AppState::new(config),
            Err(ServerError::Root { .. })
        ));
    }

    #[test]
    fn test_root_is_a_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut config = Config::from_defaults().unwrap();
        config.serve.root = file.path().display().to_string();
        assert!(matches!(
            AppState::new(config),
            Err(ServerError::NotADirectory(_))
        ));
    }
}
