//! # Configuration Loading
//!
//! Resolves the [`DscConfig`] for a CLI run: the YAML file given with
//! `--config` (or defaults), then `DSC_*` environment overrides.

use std::path::Path;

use anyhow::{Context, Result};

use dsc_core::DscConfig;

/// Load configuration from `path`, or defaults, then apply env overrides.
pub fn load_config(path: Option<&Path>) -> Result<DscConfig> {
    let config = match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            DscConfig::from_yaml_str(&content)
                .with_context(|| format!("invalid config {}", path.display()))?
        }
        None => DscConfig::default(),
    };
    let config = config
        .with_env_overrides()
        .context("invalid DSC_* environment override")?;

    tracing::debug!(?config, "configuration resolved");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "debug_tracking: true\nop_timeout_ms: 250").unwrap();
        let config = load_config(Some(file.path())).unwrap();
        assert!(config.debug_tracking);
        assert_eq!(config.op_timeout_ms, 250);
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(Some(&dir.path().join("absent.yaml"))).unwrap_err();
        assert!(format!("{err:#}").contains("failed to read config"));
    }

    #[test]
    fn invalid_yaml_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "wait_timeout_ms: 0").unwrap();
        let err = load_config(Some(file.path())).unwrap_err();
        assert!(format!("{err:#}").contains("invalid config"));
    }
}
