//! `catalina.properties` password propagation
//!
//! `server.xml` refers to the keystore password as
//! `${configurator.certificate.ssl.password}`; Tomcat resolves that from
//! `catalina.properties` at boot, so the current password is written there.

use anyhow::{Context, Result};
use java_properties::PropertiesWriter;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use crate::configs::{self, ConfigValidator, Configuration};
use crate::error::ConfiguratorError;

#[derive(Debug)]
pub struct CatalinaProperties {
    path: PathBuf,
}

impl ConfigValidator for CatalinaProperties {
    const COMPONENT: &'static str = "CatalinaProperties";
    const REQUIRED_KEYS: &'static [&'static str] = &[
        configs::TARGET_DIRECTORY,
        configs::TOMCAT_FILE_CATALINAPROPERTIES,
    ];
}

impl CatalinaProperties {
    pub fn new(config: &Configuration) -> Result<Self> {
        configs::require::<Self>(config)?;
        let path = config
            .target_directory()?
            .join(config.require(configs::TOMCAT_FILE_CATALINAPROPERTIES)?);
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Store the configured keystore password and rewrite the file
    pub fn update_password(&self, config: &Configuration) -> Result<&Path> {
        let password = config.keystore_password().ok_or_else(|| {
            ConfiguratorError::MissingConfiguration {
                component: Self::COMPONENT,
                keys: vec![configs::CERTIFICATE_SSL_PASSWORD],
            }
        })?;

        let mut properties = self.read()?;
        properties.insert(
            configs::CERTIFICATE_SSL_PASSWORD.to_string(),
            password.expose().to_string(),
        );
        self.write(&properties)?;

        tracing::info!("Stored keystore password in {}", self.path.display());
        Ok(&self.path)
    }

    fn read(&self) -> Result<BTreeMap<String, String>> {
        let file = File::open(&self.path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                anyhow::Error::new(ConfiguratorError::NotFound {
                    what: "Catalina properties",
                    path: self.path.clone(),
                })
            } else {
                anyhow::Error::new(e).context(format!("Failed to open {}", self.path.display()))
            }
        })?;
        let properties = java_properties::read(BufReader::new(file))
            .with_context(|| format!("Failed to parse {}", self.path.display()))?;
        Ok(properties.into_iter().collect())
    }

    fn write(&self, properties: &BTreeMap<String, String>) -> Result<()> {
        let file = File::create(&self.path)
            .with_context(|| format!("Failed to create {}", self.path.display()))?;
        let mut writer = PropertiesWriter::new(BufWriter::new(file));
        for (key, value) in properties {
            writer
                .write(key, value)
                .with_context(|| format!("Failed to write {} to {}", key, self.path.display()))?;
        }
        writer
            .finish()
            .with_context(|| format!("Failed to flush {}", self.path.display()))?;
        Ok(())
    }
}
