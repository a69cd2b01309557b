//! Configuration for the configurator
//!
//! A flat map of `configurator.*` keys to string values. The map is loaded once
//! from a Java-style properties file, overlaid with `CONFIGURATOR_*` environment
//! variables and `-D key=value` definitions, and then handed to each component
//! by reference. Values discovered at runtime (the install directory, a
//! generated keystore password) are written back through [`Configuration::set`].

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::ConfiguratorError;
use crate::secure_password::KeystorePassword;

pub const DEFAULT_CONFIG_FILE: &str = "configurator.properties";

/// Prefix shared by every recognized key
pub const KEY_PREFIX: &str = "configurator.";
/// Prefix of environment variables that override keys
pub const ENV_PREFIX: &str = "CONFIGURATOR_";

pub const TARGET_DIRECTORY: &str = "configurator.target.directory";
pub const TOMCAT_IMAGE_DIRECTORY: &str = "configurator.tomcat.image.directory";
pub const TOMCAT_IMAGE_ZIP_FILE: &str = "configurator.tomcat.image.zip.file";
pub const TOMCAT_IMAGE_ZIP_STRIPDIRECTORIES: &str =
    "configurator.tomcat.image.zip.stripdirectories";
pub const TOMCAT_FILE_SERVERXML: &str = "configurator.tomcat.file.serverxml";
pub const TOMCAT_FILE_CATALINAPROPERTIES: &str = "configurator.tomcat.file.catalinaproperties";
pub const TOMCAT_CONNECTOR_PORT: &str = "configurator.tomcat.connector.port";
pub const TOMCAT_CONNECTOR_PORT_SSL: &str = "configurator.tomcat.connector.port.ssl";
pub const CERTIFICATE_SSL_KEYSTORE: &str = "configurator.certificate.ssl.keystore";
pub const CERTIFICATE_SSL_SOURCE_KEYSTORE: &str = "configurator.certificate.ssl.source.keystore";
pub const CERTIFICATE_SSL_PASSWORD: &str = "configurator.certificate.ssl.password";
pub const CERTIFICATE_SSL_PROTOCOL: &str = "configurator.certificate.ssl.protocol";
pub const CERTIFICATE_SSL_ALGORITHM: &str = "configurator.certificate.ssl.algorithm";
pub const CERTIFICATE_SSL_OWNER: &str = "configurator.certificate.ssl.owner";
pub const CERTIFICATE_SSL_VALIDITY_DAYS: &str = "configurator.certificate.ssl.validity.days";
pub const CERTIFICATE_SSL_KEYSIZE: &str = "configurator.certificate.ssl.keysize";
pub const CERTIFICATE_SSL_STORETYPE: &str = "configurator.certificate.ssl.storetype";

/// Set when the configuration is loaded
pub const TIME_START_MILLISECONDS: &str = "time.start.milliseconds";

#[derive(Clone, Default)]
pub struct Configuration {
    properties: BTreeMap<String, String>,
}

impl Configuration {
    /// Build a configuration from explicit pairs, without touching the
    /// filesystem or the environment.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            properties: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Load the base properties file only
    pub fn from_file(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                anyhow::Error::new(ConfiguratorError::NotFound {
                    what: "Configuration file",
                    path: path.to_path_buf(),
                })
            } else {
                anyhow::Error::new(e)
                    .context(format!("Failed to open config file: {}", path.display()))
            }
        })?;
        let properties = java_properties::read(BufReader::new(file))
            .context(format!("Failed to parse config file: {}", path.display()))?;
        Ok(Self::from_pairs(properties))
    }

    /// Load the base file, then overlay the process environment and the
    /// command-line definitions, in that order of precedence.
    pub fn load(path: &Path, defines: &[(String, String)]) -> Result<Self> {
        tracing::info!("Loading configuration from {}", path.display());
        let mut config = Self::from_file(path)?;
        config.apply_environment(std::env::vars());
        config.apply_overrides(defines.iter().cloned());
        config.set(TIME_START_MILLISECONDS, now_millis().to_string());
        Ok(config)
    }

    /// Overlay `CONFIGURATOR_*` variables: `CONFIGURATOR_TOMCAT_CONNECTOR_PORT`
    /// becomes `configurator.tomcat.connector.port`.
    pub fn apply_environment<I>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mapped = vars.into_iter().filter_map(|(name, value)| {
            name.starts_with(ENV_PREFIX)
                .then(|| (name.to_ascii_lowercase().replace('_', "."), value))
        });
        self.apply_overrides(mapped);
    }

    /// Overlay explicit key/value pairs. Keys outside the `configurator.`
    /// namespace are ignored.
    pub fn apply_overrides<I>(&mut self, pairs: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in pairs {
            if key.starts_with(KEY_PREFIX) {
                tracing::debug!("Override {}", key);
                self.properties.insert(key, value);
            }
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.properties.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.properties.insert(key.to_string(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.properties.remove(key)
    }

    /// Value of a key that must be present
    pub fn require(&self, key: &'static str) -> Result<&str> {
        self.get(key).ok_or_else(|| {
            ConfiguratorError::MissingConfiguration {
                component: "Configuration",
                keys: vec![key],
            }
            .into()
        })
    }

    /// Parse an optional key, falling back to `default` when absent
    pub fn parse_or<T>(&self, key: &'static str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match self.get(key) {
            None => Ok(default),
            Some(raw) => raw.trim().parse::<T>().map_err(|e| {
                ConfiguratorError::InvalidConfiguration {
                    key,
                    value: raw.to_string(),
                    reason: e.to_string(),
                }
                .into()
            }),
        }
    }

    pub fn target_directory(&self) -> Result<PathBuf> {
        Ok(PathBuf::from(self.require(TARGET_DIRECTORY)?))
    }

    /// The recorded keystore password, wrapped so it does not leak into logs
    pub fn keystore_password(&self) -> Option<KeystorePassword> {
        self.get(CERTIFICATE_SSL_PASSWORD)
            .map(|p| KeystorePassword::from(p.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.properties
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (key, value) in &self.properties {
            if key == CERTIFICATE_SSL_PASSWORD {
                map.entry(key, &"<redacted>");
            } else {
                map.entry(key, value);
            }
        }
        map.finish()
    }
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}

/// Parse a `KEY=VALUE` command-line definition
pub fn parse_define(raw: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got {:?}", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in {:?}", raw));
    }
    Ok((key.to_string(), value.to_string()))
}

// ================= Component validation =================

/// Implemented by every component that reads configuration. The orchestrator
/// composes the validators; each component also checks itself on construction.
pub trait ConfigValidator {
    const COMPONENT: &'static str;
    const REQUIRED_KEYS: &'static [&'static str];

    fn validate(config: &Configuration) -> bool {
        Self::REQUIRED_KEYS.iter().all(|k| config.contains_key(k))
    }

    fn missing_keys(config: &Configuration) -> Vec<&'static str> {
        Self::REQUIRED_KEYS
            .iter()
            .copied()
            .filter(|k| !config.contains_key(k))
            .collect()
    }
}

/// Fail with a configuration error naming every missing key
pub fn require<V: ConfigValidator>(config: &Configuration) -> Result<()> {
    if V::validate(config) {
        return Ok(());
    }
    Err(ConfiguratorError::MissingConfiguration {
        component: V::COMPONENT,
        keys: V::missing_keys(config),
    }
    .into())
}
