use std::path::PathBuf;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Root configuration, parsed from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QuiverConfig {
    /// Which engine backs the marshaling layer.
    #[serde(default)]
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    #[serde(default)]
    pub kind: EngineKind,
    /// Path to the engine shared library. Required for `kind = "library"`.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Fail engine start-up when the engine reports a different chunk capacity.
    #[serde(default)]
    pub expected_vector_size: Option<usize>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// Built-in in-process engine.
    #[default]
    Memory,
    /// Engine loaded from a shared library exporting the `qv_*` symbols.
    Library,
}

impl QuiverConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| Error::Config(format!("{path}: {e}")))?;
        Self::parse(&content).map_err(|e| e.with_context(path))
    }

    /// Parse configuration from a TOML string.
    pub fn parse(toml_str: &str) -> Result<Self> {
        let config: Self = toml::from_str(toml_str).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.engine.kind == EngineKind::Library && self.engine.path.is_none() {
            return Err(Error::Config(
                "engine.path is required when engine.kind = \"library\"".into(),
            ));
        }
        if self.engine.expected_vector_size == Some(0) {
            return Err(Error::Config("engine.expected_vector_size must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_memory_engine() {
        let config = QuiverConfig::parse("").unwrap();
        assert_eq!(config.engine.kind, EngineKind::Memory);
        assert!(config.engine.path.is_none());
        assert!(config.engine.expected_vector_size.is_none());
    }

    #[test]
    fn library_engine_with_path() {
        let config = QuiverConfig::parse(
            r#"
            [engine]
            kind = "library"
            path = "/opt/engine/libengine.so"
            expected_vector_size = 2048
            "#,
        )
        .unwrap();
        assert_eq!(config.engine.kind, EngineKind::Library);
        assert_eq!(
            config.engine.path.as_deref(),
            Some(std::path::Path::new("/opt/engine/libengine.so"))
        );
        assert_eq!(config.engine.expected_vector_size, Some(2048));
    }

    #[test]
    fn library_engine_requires_path() {
        let err = QuiverConfig::parse("[engine]\nkind = \"library\"\n").unwrap_err();
        assert!(matches!(err, Error::Config(ref msg) if msg.contains("engine.path")));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(QuiverConfig::parse("[engine]\nflavor = \"duck\"\n").is_err());
        assert!(QuiverConfig::parse("[engine]\nkind = \"remote\"\n").is_err());
    }

    #[test]
    fn missing_file_is_config_error() {
        let err = QuiverConfig::load("/nonexistent/quiver.toml").unwrap_err();
        assert!(matches!(err, Error::Config(ref msg) if msg.starts_with("/nonexistent/quiver.toml")));
    }
}
