use std::fs;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use super::core::CeConfig;
use super::validation::validate_config_result;
use crate::errors::{CeError, Result};

pub const CONFIG_FILE_NAME: &str = ".compute-engine.toml";

/// Pure function to read config file contents
pub(crate) fn read_config_file(path: &Path) -> std::result::Result<String, std::io::Error> {
    let file = fs::File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut contents = String::new();
    reader.read_to_string(&mut contents)?;
    Ok(contents)
}

/// Pure function to parse and validate config from TOML string
pub fn parse_and_validate_config(contents: &str) -> Result<CeConfig> {
    let config = toml::from_str::<CeConfig>(contents)?;
    validate_config_result(&config)?;
    Ok(config)
}

/// Load an explicitly requested configuration file; every failure is an error.
pub fn load_config_from(path: &Path) -> Result<CeConfig> {
    let contents = read_config_file(path).map_err(|e| CeError::ConfigurationFile {
        message: e.to_string(),
        path: path.to_path_buf(),
    })?;
    parse_and_validate_config(&contents).map_err(|e| CeError::ConfigurationFile {
        message: e.to_string(),
        path: path.to_path_buf(),
    })
}

/// Try loading a discovered config file; failures log and yield `None`.
pub(crate) fn try_load_config_from_path(config_path: &Path) -> Option<CeConfig> {
    let contents = match read_config_file(config_path) {
        Ok(contents) => contents,
        Err(e) => {
            handle_read_error(config_path, &e);
            return None;
        }
    };

    match parse_and_validate_config(&contents) {
        Ok(config) => {
            log::debug!("Loaded config from {}", config_path.display());
            Some(config)
        }
        Err(e) => {
            log::warn!(
                "Invalid config file {}: {}. Using defaults.",
                config_path.display(),
                e
            );
            None
        }
    }
}

/// Handle file read errors with appropriate logging
pub(crate) fn handle_read_error(config_path: &Path, error: &std::io::Error) {
    // Only log actual errors, not "file not found"
    if error.kind() != std::io::ErrorKind::NotFound {
        log::warn!(
            "Failed to read config file {}: {}",
            config_path.display(),
            error
        );
    }
}

/// Pure function to generate directory ancestors up to a depth limit
pub fn directory_ancestors(start: PathBuf, max_depth: usize) -> impl Iterator<Item = PathBuf> {
    std::iter::successors(Some(start), |dir| {
        let mut parent = dir.clone();
        if parent.pop() {
            Some(parent)
        } else {
            None
        }
    })
    .take(max_depth)
}

/// Discover `.compute-engine.toml` from `start` upwards.
pub fn discover_config(start: PathBuf) -> CeConfig {
    const MAX_TRAVERSAL_DEPTH: usize = 10;

    directory_ancestors(start, MAX_TRAVERSAL_DEPTH)
        .map(|dir| dir.join(CONFIG_FILE_NAME))
        .find_map(|path| try_load_config_from_path(&path))
        .unwrap_or_else(|| {
            log::debug!(
                "No config found after checking {} directories. Using default config.",
                MAX_TRAVERSAL_DEPTH
            );
            CeConfig::default()
        })
}

/// Discover the configuration from the current directory.
pub fn load_config() -> CeConfig {
    match std::env::current_dir() {
        Ok(dir) => discover_config(dir),
        Err(e) => {
            log::warn!(
                "Failed to get current directory: {}. Using default config.",
                e
            );
            CeConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use tempfile::TempDir;

    #[test]
    fn test_directory_ancestors_is_bounded() {
        let dirs: Vec<PathBuf> = directory_ancestors(PathBuf::from("/a/b/c/d"), 2).collect();
        assert_eq!(dirs, vec![PathBuf::from("/a/b/c/d"), PathBuf::from("/a/b/c")]);
    }

    #[test]
    fn test_discover_config_in_parent_directory() {
        let root = TempDir::new().unwrap();
        fs::write(
            root.path().join(CONFIG_FILE_NAME),
            indoc! {r#"
                [workers]
                count = 3
            "#},
        )
        .unwrap();
        let nested = root.path().join("a").join("b");
        fs::create_dir_all(&nested).unwrap();

        let config = discover_config(nested);
        assert_eq!(config.workers.count, 3);
    }

    #[test]
    fn test_invalid_discovered_config_falls_back_to_defaults() {
        let root = TempDir::new().unwrap();
        fs::write(root.path().join(CONFIG_FILE_NAME), "[workers]\ncount = 0\n").unwrap();
        let config = discover_config(root.path().to_path_buf());
        assert_eq!(config.workers.count, 1);
    }

    #[test]
    fn test_explicit_invalid_config_is_an_error() {
        let root = TempDir::new().unwrap();
        let path = root.path().join("ce.toml");
        fs::write(&path, "[workers]\ncount = 0\n").unwrap();
        let err = load_config_from(&path).unwrap_err();
        assert!(matches!(err, CeError::ConfigurationFile { .. }));
        assert!(load_config_from(&root.path().join("missing.toml")).is_err());
    }
}
