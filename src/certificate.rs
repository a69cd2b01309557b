//! TLS certificate lifecycle for the Tomcat install
//!
//! Makes sure `<install>/conf/<keystore>` exists and that its password is
//! known. In order of preference the keystore is:
//!
//! 1. reused, when the file exists and a password is configured,
//! 2. copied from a staged keystore, when a source path and password are
//!    configured,
//! 3. generated, with a random password when none is configured.
//!
//! The password is never checked against the keystore, for either a reused
//! or a staged file.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::configs::{self, ConfigValidator, Configuration};
use crate::error::{remove_file_if_exists, ConfiguratorError};
use crate::generate_self_signed::{
    CertificateBundle, RsaSelfSignedBuilder, RSA_KEY_SIZE_DEFAULT, VALIDITY_DAYS_DEFAULT,
};
use crate::keystore::{self, KeystoreType};
use crate::secure_password::KeystorePassword;

/// Directory under the install root that holds Tomcat's configuration
pub const CONF_DIRECTORY: &str = "conf";

/// How the keystore came to be in place
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertificateSource {
    Existing,
    Staged,
    Generated,
}

#[derive(Debug)]
pub struct CertificateManager {
    target_file: PathBuf,
}

impl ConfigValidator for CertificateManager {
    const COMPONENT: &'static str = "CertificateManager";
    const REQUIRED_KEYS: &'static [&'static str] =
        &[configs::TARGET_DIRECTORY, configs::CERTIFICATE_SSL_KEYSTORE];
}

impl CertificateManager {
    pub fn new(config: &Configuration) -> Result<Self> {
        configs::require::<Self>(config)?;
        let target_file = config
            .target_directory()?
            .join(CONF_DIRECTORY)
            .join(config.require(configs::CERTIFICATE_SSL_KEYSTORE)?);
        tracing::info!(
            "Expected location for the keystore file will be: {}",
            target_file.display()
        );
        Ok(Self { target_file })
    }

    pub fn keystore_path(&self) -> &Path {
        &self.target_file
    }

    /// True when the keystore file exists and a password is on file. The
    /// password itself is not tried against the keystore.
    pub fn check_certificate(&self, config: &Configuration) -> bool {
        self.target_file.exists() && config.contains_key(configs::CERTIFICATE_SSL_PASSWORD)
    }

    /// Open the installed keystore with the configured password. Unlike
    /// [`Self::check_certificate`] this does verify the password.
    pub fn load_installed(&self, config: &Configuration) -> Result<CertificateBundle> {
        let password = config.keystore_password().ok_or_else(|| {
            ConfiguratorError::MissingConfiguration {
                component: Self::COMPONENT,
                keys: vec![configs::CERTIFICATE_SSL_PASSWORD],
            }
        })?;
        if !self.target_file.exists() {
            return Err(ConfiguratorError::NotFound {
                what: "Keystore",
                path: self.target_file.clone(),
            }
            .into());
        }
        keystore::load_keystore(&self.target_file, &password)
    }

    /// Reuse, stage or generate the keystore. A generated password is
    /// recorded in `config`.
    pub fn install_certificate(&self, config: &mut Configuration) -> Result<CertificateSource> {
        if self.check_certificate(config) {
            tracing::info!("Certificate installed, password available");
            return Ok(CertificateSource::Existing);
        }

        if let (Some(source), true) = (
            config.get(configs::CERTIFICATE_SSL_SOURCE_KEYSTORE),
            config.contains_key(configs::CERTIFICATE_SSL_PASSWORD),
        ) {
            self.copy_staged_keystore(Path::new(source))?;
            if self.check_certificate(config) {
                tracing::info!("Certificate installed from staged keystore, password available");
                return Ok(CertificateSource::Staged);
            }
        }

        self.generate_new_certificate(config)?;
        tracing::info!("Certificate installed: {}", self.check_certificate(config));
        Ok(CertificateSource::Generated)
    }

    fn copy_staged_keystore(&self, source: &Path) -> Result<()> {
        tracing::info!("Using pre-staged certificate {}", source.display());
        if !source.exists() {
            return Err(ConfiguratorError::NotFound {
                what: "Source certificate",
                path: source.to_path_buf(),
            }
            .into());
        }
        remove_file_if_exists(&self.target_file).with_context(|| {
            format!("Failed to remove old keystore {}", self.target_file.display())
        })?;
        if let Some(parent) = self.target_file.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        fs::copy(source, &self.target_file).with_context(|| {
            format!(
                "Failed to copy {} to {}",
                source.display(),
                self.target_file.display()
            )
        })?;
        Ok(())
    }

    /// Generate a key pair, self-signed certificate and keystore. When no
    /// password is configured a random one is created and saved.
    fn generate_new_certificate(&self, config: &mut Configuration) -> Result<()> {
        let subject = config
            .get(configs::CERTIFICATE_SSL_OWNER)
            .ok_or_else(|| ConfiguratorError::MissingConfiguration {
                component: Self::COMPONENT,
                keys: vec![configs::CERTIFICATE_SSL_OWNER],
            })?
            .to_string();
        let key_size = config.parse_or(configs::CERTIFICATE_SSL_KEYSIZE, RSA_KEY_SIZE_DEFAULT)?;
        let validity_days =
            config.parse_or(configs::CERTIFICATE_SSL_VALIDITY_DAYS, VALIDITY_DAYS_DEFAULT)?;
        let store_type = match config.get(configs::CERTIFICATE_SSL_STORETYPE) {
            Some(raw) => raw.parse::<KeystoreType>()?,
            None => KeystoreType::default(),
        };

        let password = match config.keystore_password() {
            Some(password) => password,
            None => {
                let password = KeystorePassword::generate();
                config.set(configs::CERTIFICATE_SSL_PASSWORD, password.expose());
                tracing::info!("Randomly generated password for certificate");
                password
            }
        };

        tracing::info!(
            "Generating {}-bit RSA key and self-signed certificate for {:?}",
            key_size,
            subject
        );
        let bundle = RsaSelfSignedBuilder::new()
            .subject(subject)
            .key_size(key_size)
            .validity_days(validity_days)
            .build()?;

        let store = keystore::create_keystore(store_type, &bundle, &password)?;
        keystore::save_keystore(&store, &self.target_file)?;

        tracing::info!(
            "Generated {} key store: {}",
            store_type,
            self.target_file.display()
        );
        Ok(())
    }
}
