//! Configuration loading from TOML files.
//!
//! Lookup order:
//! 1. `$CALQ_CONFIG` environment variable
//! 2. `~/.config/calq/config.toml`
//! 3. Built-in defaults (everything is optional)

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;

use calq_engine::graph::{DEFAULT_DIVISIONS, DEFAULT_SAMPLES};
use calq_engine::Sampler;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub display: DisplayConfig,
    pub graph: GraphConfig,
    pub solver: SolverConfig,
}

/// Database storage settings.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database path. Default: platform-specific data dir.
    pub path: Option<String>,
}

/// How results are printed.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Fractional digits kept when printing results.
    pub decimal_places: usize,
    pub show_steps: bool,
}

/// Graph sampling resolution.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Steps across a 2D domain.
    pub samples: usize,
    /// Steps along each axis of a 3D mesh.
    pub surface_divisions: usize,
}

/// Remote problem-solving service.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Base URL; `calq ask` is disabled without one.
    pub endpoint: Option<String>,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

// --- Defaults ---

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            decimal_places: 8,
            show_steps: true,
        }
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            samples: DEFAULT_SAMPLES,
            surface_divisions: DEFAULT_DIVISIONS,
        }
    }
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            max_tokens: 4000,
            timeout_secs: 60,
        }
    }
}

impl GraphConfig {
    pub fn sampler(&self) -> Sampler {
        Sampler {
            samples: self.samples.max(1),
            divisions: self.surface_divisions.max(1),
        }
    }
}

/// Load config from disk. Returns defaults if no config file exists.
pub fn load_config() -> Result<Config> {
    let path = config_path();

    if let Some(p) = &path {
        if p.exists() {
            let content =
                std::fs::read_to_string(p).with_context(|| format!("reading {}", p.display()))?;
            let config: Config =
                toml::from_str(&content).with_context(|| format!("parsing {}", p.display()))?;
            return Ok(config);
        }
    }

    Ok(Config::default())
}

/// Resolve the config file path.
fn config_path() -> Option<PathBuf> {
    if let Ok(p) = std::env::var("CALQ_CONFIG") {
        return Some(PathBuf::from(p));
    }

    directories::BaseDirs::new().map(|dirs| {
        dirs.home_dir()
            .join(".config")
            .join("calq")
            .join("config.toml")
    })
}

/// Show the active config path (for `calq config`).
pub fn show_config_path() -> String {
    match config_path() {
        Some(p) if p.exists() => format!("{} (loaded)", p.display()),
        Some(p) => format!("{} (not found, using defaults)", p.display()),
        None => "no config path resolved (using defaults)".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.display.decimal_places, 8);
        assert!(config.display.show_steps);
        assert_eq!(config.graph.samples, 200);
        assert_eq!(config.graph.surface_divisions, 30);
        assert_eq!(config.solver.max_tokens, 4000);
        assert!(config.solver.endpoint.is_none());
    }

    #[test]
    fn test_parse_minimal_toml() {
        let toml_str = r#"
[display]
decimal_places = 3
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.display.decimal_places, 3);
        // Other fields should be defaults
        assert!(config.display.show_steps);
        assert_eq!(config.graph.samples, 200);
    }

    #[test]
    fn test_parse_full_toml() {
        let toml_str = r#"
[store]
path = "/tmp/calq.db"

[display]
decimal_places = 4
show_steps = false

[graph]
samples = 400
surface_divisions = 10

[solver]
endpoint = "http://localhost:8787/api/solve"
max_tokens = 1000
timeout_secs = 5
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.store.path.as_deref(), Some("/tmp/calq.db"));
        assert!(!config.display.show_steps);
        assert_eq!(config.graph.sampler(), Sampler { samples: 400, divisions: 10 });
        assert_eq!(config.solver.timeout_secs, 5);
        assert!(config.solver.endpoint.is_some());
    }

    #[test]
    fn test_zero_resolution_is_clamped() {
        let config: Config = toml::from_str("[graph]\nsamples = 0\n").unwrap();
        assert_eq!(config.graph.sampler().samples, 1);
    }
}
