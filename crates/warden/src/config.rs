//! Configuration file loading.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use warden_registry::RegistryConfig;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "WARDEN_CONFIG";

/// Errors that can occur when loading the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// The file exists but could not be read.
	#[error("I/O error reading {path}: {error}")]
	Io {
		/// Path to the file that failed to read.
		path: PathBuf,
		/// The underlying I/O error.
		error: std::io::Error,
	},

	/// The file is not valid TOML for [`WardenConfig`].
	#[error("TOML parse error in {path}: {error}")]
	Toml {
		/// Path to the file that failed to parse.
		path: PathBuf,
		/// The underlying parse error.
		error: toml::de::Error,
	},

	/// The registry section failed validation.
	#[error("invalid [registry] section: {0}")]
	Registry(#[from] warden_registry::ConfigError),
}

/// Root of `warden.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WardenConfig {
	/// `[logging]`
	pub logging: LoggingConfig,
	/// `[registry]`
	pub registry: RegistryConfig,
	/// `[control]`
	pub control: ControlConfig,
	/// `[spawner]`
	pub spawner: SpawnerConfig,
	/// `[unit]`
	pub unit: UnitConfig,
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
	/// Default filter when `RUST_LOG` is unset.
	pub level: String,
}

impl Default for LoggingConfig {
	fn default() -> Self {
		Self { level: "info".into() }
	}
}

/// `[control]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
	/// Control socket path.
	pub socket: Option<PathBuf>,
}

/// `[spawner]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnerConfig {
	/// Worker unit executable. Defaults to the running `warden` binary.
	pub program: Option<PathBuf>,
	/// Arguments placed before the tenant id and ports.
	pub args: Vec<String>,
}

impl Default for SpawnerConfig {
	fn default() -> Self {
		Self {
			program: None,
			args: vec!["unit".into()],
		}
	}
}

/// `[unit]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnitConfig {
	/// How long a stopping worker unit waits for in-flight connections.
	pub drain_timeout_secs: u64,
}

impl Default for UnitConfig {
	fn default() -> Self {
		Self { drain_timeout_secs: 10 }
	}
}

impl WardenConfig {
	/// Loads and validates `path`. No path or a missing file yields the defaults.
	///
	/// # Errors
	///
	/// Returns [`ConfigError`] for unreadable, malformed or invalid files.
	pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
		let config = match path {
			Some(path) => match std::fs::read_to_string(path) {
				Ok(text) => Self::parse(&text, path)?,
				Err(error) if error.kind() == std::io::ErrorKind::NotFound => Self::default(),
				Err(error) => {
					return Err(ConfigError::Io {
						path: path.to_path_buf(),
						error,
					});
				}
			},
			None => Self::default(),
		};
		config.registry.validate()?;
		Ok(config)
	}

	fn parse(text: &str, path: &Path) -> Result<Self, ConfigError> {
		toml::from_str(text).map_err(|error| ConfigError::Toml {
			path: path.to_path_buf(),
			error,
		})
	}
}

/// Picks the control socket: command line, then environment, then config file.
///
/// `None` means the platform default applies.
pub fn pick_socket(cli: Option<PathBuf>, env: Option<PathBuf>, configured: Option<&Path>) -> Option<PathBuf> {
	cli.or(env).or_else(|| configured.map(Path::to_path_buf))
}
