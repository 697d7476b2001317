//! Backend-selection configuration.
//!
//! A `Config` is passed to every function factory. `Config::from_env` gives the
//! process-wide default without relying on hidden global state.

use std::env;
use std::fmt;
use std::str::FromStr;

#[cfg(feature = "serialization")]
use serde::{Deserialize, Serialize};
#[cfg(feature = "serialization")]
use std::path::Path;

use crate::error::Error;

/// Environment variable holding an [`AccelPreference`].
pub const ACCEL_ENV: &str = "RUST_TENSOR_ACCEL";
/// Environment variable overriding [`Config::accel_min_elements`].
pub const ACCEL_MIN_ELEMENTS_ENV: &str = "RUST_TENSOR_ACCEL_MIN_ELEMENTS";

/// Default size threshold for `Auto`: none, so any supported input may use the engine.
pub const DEFAULT_ACCEL_MIN_ELEMENTS: usize = 0;

/// Whether the accelerated engine may be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "serialization",
    derive(Serialize, Deserialize),
    serde(rename_all = "lowercase")
)]
pub enum AccelPreference {
    /// Use the engine, fail if it cannot take the inputs.
    Always,
    /// Never use the engine.
    Never,
    /// Use the engine whenever it is built in and can take the inputs.
    #[default]
    Auto,
}

impl FromStr for AccelPreference {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "always" => Ok(AccelPreference::Always),
            "never" => Ok(AccelPreference::Never),
            "auto" => Ok(AccelPreference::Auto),
            other => Err(Error::InvalidConfig(format!(
                "unknown accelerator preference '{}', expected always, never or auto",
                other
            ))),
        }
    }
}

impl fmt::Display for AccelPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccelPreference::Always => write!(f, "always"),
            AccelPreference::Never => write!(f, "never"),
            AccelPreference::Auto => write!(f, "auto"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize), serde(default))]
pub struct Config {
    pub accel: AccelPreference,
    /// Opt-in size threshold: total input elements needed before `Auto` picks
    /// the engine for host-only inputs. 0 disables it.
    pub accel_min_elements: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            accel: AccelPreference::Auto,
            accel_min_elements: DEFAULT_ACCEL_MIN_ELEMENTS,
        }
    }
}

impl Config {
    pub fn with_accel(mut self, accel: AccelPreference) -> Self {
        self.accel = accel;
        self
    }

    pub fn with_accel_min_elements(mut self, accel_min_elements: usize) -> Self {
        self.accel_min_elements = accel_min_elements;
        self
    }

    /// Reads `RUST_TENSOR_ACCEL` and `RUST_TENSOR_ACCEL_MIN_ELEMENTS`; unset
    /// variables keep their defaults.
    pub fn from_env() -> Result<Self, Error> {
        let mut config = Config::default();
        if let Ok(value) = env::var(ACCEL_ENV) {
            config.accel = value.parse()?;
        }
        if let Ok(value) = env::var(ACCEL_MIN_ELEMENTS_ENV) {
            config.accel_min_elements = value.trim().parse().map_err(|e| {
                Error::InvalidConfig(format!("{}='{}': {}", ACCEL_MIN_ELEMENTS_ENV, value, e))
            })?;
        }
        crate::debug_println!("Config from environment: {:?}", config);
        Ok(config)
    }

    #[cfg(feature = "serialization")]
    pub fn from_json_str(json: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(json)?)
    }

    #[cfg(feature = "serialization")]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    #[cfg(feature = "serialization")]
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), Error> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
