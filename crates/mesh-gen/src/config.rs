//! Generator configuration files.
//!
//! A [`GeneratorConfig`] bundles the generation parameters with the engine
//! settings and can be stored as TOML or JSON.
//!
//! # Example TOML
//!
//! ```toml
//! [generate]
//! optimize = true
//! num_quad_lloyd_steps = 10
//! num_lloyd_steps = 500
//!
//! [engine]
//! executable = "/opt/gmsh/bin/gmsh"
//! timeout_secs = 120.0
//! ```
//!
//! Missing keys take their defaults.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::engine::EngineConfig;
use crate::error::{MeshError, MeshResult};
use crate::pipeline::GenerateParams;
use crate::tracing_ext::log_io_operation;

/// How to find and run the engine. Unset fields fall back to detection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Engine executable; detected when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executable: Option<PathBuf>,

    /// Kill the engine after this many seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<f64>,

    /// Directory for scratch files.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scratch_dir: Option<PathBuf>,
}

impl EngineSettings {
    /// Resolve into an [`EngineConfig`].
    ///
    /// Timeouts that are not positive or not representable as a
    /// [`Duration`] are ignored.
    pub fn to_engine_config(&self) -> EngineConfig {
        let mut config = match &self.executable {
            Some(path) => EngineConfig::new(path),
            None => EngineConfig::detect(),
        };
        let timeout = self
            .timeout_secs
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            .filter(|limit| !limit.is_zero());
        match timeout {
            Some(limit) => config = config.with_timeout(limit),
            None if self.timeout_secs.is_some() => warn!(
                timeout_secs = ?self.timeout_secs,
                "Ignoring invalid engine timeout"
            ),
            None => {}
        }
        if let Some(dir) = &self.scratch_dir {
            config = config.with_scratch_dir(dir);
        }
        config
    }
}

/// A serializable generator configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Optional name for this configuration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub generate: GenerateParams,
    pub engine: EngineSettings,
}

impl GeneratorConfig {
    /// Load configuration from a TOML string.
    pub fn from_toml(text: &str) -> MeshResult<Self> {
        parse_toml(text, Path::new("<string>"))
    }

    /// Load configuration from a TOML or JSON file, chosen by extension
    /// (anything but `.json` is read as TOML).
    pub fn load(path: impl AsRef<Path>) -> MeshResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            log_io_operation("read config", path, false);
            MeshError::io_read(path, e)
        })?;
        let config = if is_json(path) {
            parse_json(&text, path)?
        } else {
            parse_toml(&text, path)?
        };
        log_io_operation("read config", path, true);
        Ok(config)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Load configuration from a JSON string.
    pub fn from_json(text: &str) -> MeshResult<Self> {
        parse_json(text, Path::new("<string>"))
    }

    /// Serialize to a JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Save to a TOML or JSON file, chosen by extension.
    pub fn save(&self, path: impl AsRef<Path>) -> MeshResult<()> {
        let path = path.as_ref();
        let text = if is_json(path) {
            self.to_json().map_err(io::Error::other)
        } else {
            self.to_toml().map_err(io::Error::other)
        };
        text.and_then(|text| fs::write(path, text))
            .map_err(|e| MeshError::io_write(path, e))?;
        log_io_operation("write config", path, true);
        Ok(())
    }
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"))
}

fn parse_toml(text: &str, path: &Path) -> MeshResult<GeneratorConfig> {
    toml::from_str(text).map_err(|e| {
        let line = e
            .span()
            .map(|span| text[..span.start.min(text.len())].matches('\n').count() + 1);
        MeshError::decode_failure(path, line, e.message().to_string())
    })
}

fn parse_json(text: &str, path: &Path) -> MeshResult<GeneratorConfig> {
    serde_json::from_str(text)
        .map_err(|e| MeshError::decode_failure(path, Some(e.line()), e.to_string()))
}
