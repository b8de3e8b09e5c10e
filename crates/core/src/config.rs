//! Application configuration.
//!
//! Defaults can be overridden through `ACCELE_*` environment variables.

use crate::error::{Error, Result};

/// Runtime configuration for the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Initial window width in pixels.
    pub width: u32,
    /// Initial window height in pixels.
    pub height: u32,
    /// Window title.
    pub title: String,
    /// Whether to request the Khronos validation layer.
    pub validation: bool,
    /// Log filter used when `RUST_LOG` is not set.
    pub log_filter: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            title: "Accele".to_string(),
            validation: cfg!(debug_assertions),
            log_filter: None,
        }
    }
}

impl Config {
    /// Loads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a variable is set but malformed.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads the configuration using `lookup` to resolve variables.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup("ACCELE_WIDTH") {
            config.width = parse_dimension("ACCELE_WIDTH", &value)?;
        }
        if let Some(value) = lookup("ACCELE_HEIGHT") {
            config.height = parse_dimension("ACCELE_HEIGHT", &value)?;
        }
        if let Some(value) = lookup("ACCELE_TITLE") {
            config.title = value;
        }
        if let Some(value) = lookup("ACCELE_VALIDATION") {
            config.validation = parse_flag("ACCELE_VALIDATION", &value)?;
        }
        if let Some(value) = lookup("ACCELE_LOG")
            && !value.trim().is_empty()
        {
            config.log_filter = Some(value);
        }

        Ok(config)
    }
}

fn parse_dimension(key: &str, value: &str) -> Result<u32> {
    let parsed: u32 = value
        .trim()
        .parse()
        .map_err(|e| Error::Config(format!("{key}={value:?}: {e}")))?;
    if parsed == 0 {
        return Err(Error::Config(format!("{key} must be non-zero")));
    }
    Ok(parsed)
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::Config(format!("{key}={value:?} is not a boolean"))),
    }
}
