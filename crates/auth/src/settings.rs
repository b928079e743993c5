use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Duration;
use config::{Config, Environment, File, FileFormat};
use error_stack::{Report, ResultExt};
use serde::Deserialize;
use url::Url;
use validator::{Validate, ValidationError};

use crate::error::AuthError;
use crate::key_store::{
    is_valid_prefix, FileSystemKeyRepository, KeyRepository, ObjectStoreKeyRepository,
};

/// Environment variables with this prefix override TOML values, e.g.
/// `INKWELL__KEY_STORE__PREFIX=session`.
pub const ENVIRONMENT_PREFIX: &str = "INKWELL";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStoreBackend {
    Filesystem,
    ObjectStorage,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct KeyStoreSettings {
    pub backend: KeyStoreBackend,
    #[validate(custom(function = "validate_prefix"))]
    pub prefix: String,
    /// Directory for the filesystem backend.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Store URL for the object storage backend.
    #[serde(default)]
    pub url: Option<String>,
    /// Provider options for the object storage backend.
    #[serde(default)]
    pub options: HashMap<String, String>,
}

impl KeyStoreSettings {
    /// Builds the configured repository.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] if the backend's location is
    /// missing or cannot be parsed.
    pub fn open_repository(&self) -> Result<Arc<dyn KeyRepository>, Report<AuthError>> {
        match self.backend {
            KeyStoreBackend::Filesystem => {
                let path = self.path.as_ref().ok_or_else(|| {
                    Report::new(AuthError::Configuration {
                        message: "key_store.path is required for the filesystem backend".into(),
                    })
                })?;
                let repository = FileSystemKeyRepository::new(path, self.prefix.as_str())?;
                Ok(Arc::new(repository))
            }
            KeyStoreBackend::ObjectStorage => {
                let url = self.url.as_deref().ok_or_else(|| {
                    Report::new(AuthError::Configuration {
                        message: "key_store.url is required for the object_storage backend"
                            .into(),
                    })
                })?;
                let url = Url::parse(url).change_context_lazy(|| AuthError::Configuration {
                    message: format!("invalid key_store.url '{url}'"),
                })?;
                let repository =
                    ObjectStoreKeyRepository::from_url(&url, &self.options, self.prefix.as_str())?;
                Ok(Arc::new(repository))
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SessionSettings {
    #[validate(range(min = 1, max = MAX_TTL_SECONDS))]
    pub ttl_seconds: i64,
    /// Number of most recent keys accepted when verifying tokens.
    #[validate(range(min = 1))]
    #[serde(default = "default_trusted_window")]
    pub trusted_window: usize,
}

impl SessionSettings {
    /// Token lifetime.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] if `ttl_seconds` is not positive
    /// or does not fit in a [`Duration`].
    pub fn ttl(&self) -> Result<Duration, Report<AuthError>> {
        ttl_from_seconds(self.ttl_seconds)
    }
}

/// Largest accepted `ttl_seconds`; larger values do not fit in a [`Duration`].
pub const MAX_TTL_SECONDS: i64 = i64::MAX / 1_000;

/// Converts a token lifetime in seconds to a [`Duration`].
///
/// # Errors
///
/// Returns [`AuthError::Configuration`] if `seconds` is not positive or does
/// not fit in a [`Duration`].
pub fn ttl_from_seconds(seconds: i64) -> Result<Duration, Report<AuthError>> {
    Duration::try_seconds(seconds)
        .filter(|ttl| *ttl > Duration::zero())
        .ok_or_else(|| {
            Report::new(AuthError::Configuration {
                message: format!("token lifetime of {seconds} seconds is out of range"),
            })
        })
}

fn validate_prefix(prefix: &str) -> Result<(), ValidationError> {
    if !is_valid_prefix(prefix) {
        return Err(ValidationError::new(
            "prefix must be non-empty and contain no '-', path separator or '..'",
        ));
    }
    Ok(())
}

fn default_trusted_window() -> usize {
    2
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct Settings {
    #[validate(nested)]
    pub key_store: KeyStoreSettings,
    #[validate(nested)]
    pub session: SessionSettings,
}

impl Settings {
    /// Parses settings from TOML, applying `INKWELL__` environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] if the TOML is invalid, required
    /// fields are missing or validation fails.
    pub fn from_toml(toml_str: &str) -> Result<Self, Report<AuthError>> {
        Self::build(File::from_str(toml_str, FileFormat::Toml))
    }

    /// Loads settings from a TOML file, applying `INKWELL__` environment
    /// overrides.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] if the file cannot be read or the
    /// settings are invalid.
    pub fn from_file(path: &Path) -> Result<Self, Report<AuthError>> {
        Self::build(File::from(path).format(FileFormat::Toml))
            .attach(format!("while loading {}", path.display()))
    }

    fn build<S>(source: S) -> Result<Self, Report<AuthError>>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let environment = Environment::default()
            .prefix(ENVIRONMENT_PREFIX)
            .separator("__")
            .try_parsing(true);

        let settings: Self = Config::builder()
            .add_source(source)
            .add_source(environment)
            .build()
            .and_then(|config| config.try_deserialize())
            .change_context(AuthError::Configuration {
                message: "failed to load settings".into(),
            })?;

        settings
            .validate()
            .change_context(AuthError::Configuration {
                message: "settings validation failed".into(),
            })?;

        Ok(settings)
    }
}
