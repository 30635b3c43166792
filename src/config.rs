//! Configuration for los-libros-cfi

use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    pub locations: LocationsConfig,
    pub cfi: CfiConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocationsConfig {
    /// Characters per location
    pub chunk_size: usize,
    /// Pause between documents, in milliseconds
    pub pause_ms: u64,
    /// Text nodes shorter than this that are only whitespace are skipped
    /// when counting words
    pub word_threshold: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CfiConfig {
    /// Require the `epubcfi(...)` wrapper
    pub strict: bool,
    /// Fail on id assertion mismatches instead of recovering
    pub strict_assertions: bool,
    /// Emit `;s=a` / `;s=b` on generated boundary offsets
    pub side_bias: bool,
}

impl Default for LocationsConfig {
    fn default() -> Self {
        LocationsConfig {
            chunk_size: 150,
            pause_ms: 100,
            word_threshold: 10,
        }
    }
}

impl Default for CfiConfig {
    fn default() -> Self {
        CfiConfig {
            strict: true,
            strict_assertions: false,
            side_bias: false,
        }
    }
}

impl LocationsConfig {
    pub fn pause(&self) -> Duration {
        Duration::from_millis(self.pause_ms)
    }
}

/// Read `key`, falling back to `default` when unset
fn var_or<T: FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(value) => value.trim().parse().map_err(|_| Error::InvalidConfig {
            key: key.to_string(),
            value,
        }),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let defaults = Config::default();

        let config = Config {
            locations: LocationsConfig {
                chunk_size: var_or("LOCATIONS_CHUNK_SIZE", defaults.locations.chunk_size)?,
                pause_ms: var_or("LOCATIONS_PAUSE_MS", defaults.locations.pause_ms)?,
                word_threshold: var_or(
                    "LOCATIONS_WORD_THRESHOLD",
                    defaults.locations.word_threshold,
                )?,
            },
            cfi: CfiConfig {
                strict: var_or("CFI_STRICT", defaults.cfi.strict)?,
                strict_assertions: var_or("CFI_STRICT_ASSERTIONS", defaults.cfi.strict_assertions)?,
                side_bias: var_or("CFI_SIDE_BIAS", defaults.cfi.side_bias)?,
            },
        };

        if config.locations.chunk_size == 0 {
            return Err(Error::InvalidConfig {
                key: "LOCATIONS_CHUNK_SIZE".to_string(),
                value: "0".to_string(),
            });
        }

        Ok(config)
    }
}
