#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Layered option lookup for s3pub.
//!
//! Options come from an ordered list of [`OptionSource`]s, highest
//! precedence first: command-line flags, then the TOML config file, then
//! `S3PUB_*` environment variables. [`cascade`] asks each source in turn and
//! keeps the first non-empty value per name.
//!
//! # Config file
//!
//! ```toml
//! aws-access-key = "AKIA..."
//! aws-secret-key = "..."
//! region = "eu-west-1"
//! endpoint-url = "https://example.r2.cloudflarestorage.com"
//! ```

use std::path::{Path, PathBuf};

use s3pub_models::Credentials;
use serde::Deserialize;

/// Option name for the access key ID.
pub const AWS_ACCESS_KEY: &str = "aws-access-key";
/// Option name for the secret access key.
pub const AWS_SECRET_KEY: &str = "aws-secret-key";
/// Option name for the signing region.
pub const REGION: &str = "region";
/// Option name for a custom S3 endpoint.
pub const ENDPOINT_URL: &str = "endpoint-url";

/// File name of the config file in the home directory.
pub const DEFAULT_CONFIG_FILE: &str = ".s3pub.toml";

/// Errors from loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// One or both halves of the key pair were not provided anywhere.
    #[error(
        "Missing at least one of AWS access key or AWS secret key; use \
         --aws-access-key/--aws-secret-key, the `aws-access-key`/`aws-secret-key` \
         config file entries, or S3PUB_AWS_ACCESS_KEY/S3PUB_AWS_SECRET_KEY"
    )]
    MissingCredentials,

    /// The config file exists but is not valid TOML.
    #[error("Configuration file {} is improperly formatted: {source}", path.display())]
    Parse {
        /// Config file path.
        path: PathBuf,
        /// Underlying parse error.
        source: toml::de::Error,
    },

    /// The config file exists but could not be read.
    #[error("Failed to read configuration file {}: {source}", path.display())]
    Io {
        /// Config file path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Something that may hold a value for a named option.
///
/// Names use dashes (`aws-access-key`); sources map them to their own
/// conventions.
pub trait OptionSource {
    /// Returns the value for `name`, if this source has one.
    fn lookup(&self, name: &str) -> Option<String>;
}

/// Returns the first non-empty value for `name` across `sources`.
#[must_use]
pub fn find_first(name: &str, sources: &[&dyn OptionSource]) -> Option<String> {
    sources
        .iter()
        .find_map(|source| source.lookup(name).filter(|value| !value.is_empty()))
}

/// Looks up every name in `names`, respecting source precedence. The result
/// is index-aligned with `names`.
#[must_use]
pub fn cascade(sources: &[&dyn OptionSource], names: &[&str]) -> Vec<Option<String>> {
    names.iter().map(|name| find_first(name, sources)).collect()
}

/// Contents of the TOML config file.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ConfigFile {
    /// Access key ID.
    #[serde(alias = "aws_access_key")]
    pub aws_access_key: Option<String>,
    /// Secret access key.
    #[serde(alias = "aws_secret_key")]
    pub aws_secret_key: Option<String>,
    /// Signing region.
    pub region: Option<String>,
    /// Custom S3 endpoint.
    #[serde(alias = "endpoint_url")]
    pub endpoint_url: Option<String>,
}

impl ConfigFile {
    /// Loads the config file at `path`. A missing file is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file exists but cannot be read and
    /// [`ConfigError::Parse`] if it is not valid TOML.
    pub fn load(path: &Path) -> Result<Option<Self>, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("no config file at {}", path.display());
                return Ok(None);
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        toml::from_str(&text)
            .map(Some)
            .map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })
    }
}

impl OptionSource for ConfigFile {
    fn lookup(&self, name: &str) -> Option<String> {
        match name {
            AWS_ACCESS_KEY => self.aws_access_key.clone(),
            AWS_SECRET_KEY => self.aws_secret_key.clone(),
            REGION => self.region.clone(),
            ENDPOINT_URL => self.endpoint_url.clone(),
            _ => None,
        }
    }
}

/// Reads options from environment variables named `<PREFIX>_<NAME>`, with
/// the name upper-cased and dashes turned into underscores.
pub struct EnvSource {
    prefix: &'static str,
}

impl EnvSource {
    /// Environment source using the `S3PUB_` prefix.
    #[must_use]
    pub const fn new() -> Self {
        Self::with_prefix("S3PUB")
    }

    /// Environment source reading `<prefix>_<NAME>` variables.
    #[must_use]
    pub const fn with_prefix(prefix: &'static str) -> Self {
        Self { prefix }
    }

    /// Variable consulted for `name`.
    #[must_use]
    pub fn var_name(&self, name: &str) -> String {
        format!("{}_{}", self.prefix, name.to_uppercase().replace('-', "_"))
    }
}

impl Default for EnvSource {
    fn default() -> Self {
        Self::new()
    }
}

impl OptionSource for EnvSource {
    fn lookup(&self, name: &str) -> Option<String> {
        std::env::var(self.var_name(name)).ok()
    }
}

/// Connection settings resolved from all sources.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Key pair for both clients.
    pub credentials: Credentials,
    /// Signing region, if configured.
    pub region: Option<String>,
    /// Custom S3 endpoint, if configured.
    pub endpoint_url: Option<String>,
}

/// Resolves [`Settings`] from `sources`, highest precedence first.
///
/// # Errors
///
/// Returns [`ConfigError::MissingCredentials`] unless both halves of the key
/// pair are found.
pub fn resolve(sources: &[&dyn OptionSource]) -> Result<Settings, ConfigError> {
    let mut values = cascade(sources, &[AWS_ACCESS_KEY, AWS_SECRET_KEY, REGION, ENDPOINT_URL])
        .into_iter();
    let mut next = || values.next().flatten();

    let (Some(access_key), Some(secret_key)) = (next(), next()) else {
        return Err(ConfigError::MissingCredentials);
    };

    Ok(Settings {
        credentials: Credentials::new(access_key, secret_key),
        region: next(),
        endpoint_url: next(),
    })
}

/// Default config file location: `~/.s3pub.toml`.
#[must_use]
pub fn default_config_path() -> PathBuf {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map_or_else(
            || PathBuf::from(DEFAULT_CONFIG_FILE),
            |home| PathBuf::from(home).join(DEFAULT_CONFIG_FILE),
        )
}
