//! The configuration workflow: install → certificate → server.xml →
//! catalina.properties, strictly in that order.

use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::catalina_properties::CatalinaProperties;
use crate::certificate::{CertificateManager, CertificateSource};
use crate::configs::{self, ConfigValidator, Configuration};
use crate::error::ConfiguratorError;
use crate::generate_self_signed::CertificateBundle;
use crate::installer::TomcatInstaller;
use crate::server_config::{ReconcileOutcome, ServerConfig};

/// What a full run did
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub install_directory: PathBuf,
    pub freshly_installed: bool,
    pub keystore: PathBuf,
    pub certificate_source: CertificateSource,
    pub connector: ReconcileOutcome,
    pub catalina_properties: PathBuf,
}

/// Every component's required keys, checked before anything touches disk
pub fn validate_configuration(config: &Configuration) -> Result<()> {
    let mut missing = Vec::new();
    missing.extend(TomcatInstaller::missing_keys(config));
    missing.extend(CertificateManager::missing_keys(config));
    missing.extend(ServerConfig::missing_keys(config));
    missing.extend(CatalinaProperties::missing_keys(config));
    missing.sort_unstable();
    missing.dedup();
    if missing.is_empty() {
        return Ok(());
    }
    Err(ConfiguratorError::MissingConfiguration {
        component: "Process",
        keys: missing,
    }
    .into())
}

/// Install Tomcat when needed and record the absolute install directory.
/// Returns the directory and whether an install happened.
pub fn ensure_installed(config: &mut Configuration) -> Result<(PathBuf, bool)> {
    let tomcat = TomcatInstaller::new(config)?;
    let (install_directory, installed) = if tomcat.is_installed() {
        (tomcat.install_directory()?, false)
    } else {
        (tomcat.install(config).context("Failed to install Tomcat")?, true)
    };
    config.set(
        configs::TARGET_DIRECTORY,
        install_directory.to_string_lossy().to_string(),
    );
    Ok((install_directory, installed))
}

/// Run the whole workflow
pub fn run(config: &mut Configuration) -> Result<RunSummary> {
    validate_configuration(config)?;
    tracing::info!("Starting processing");

    let (install_directory, freshly_installed) = ensure_installed(config)?;

    let certificate = CertificateManager::new(config)?;
    let certificate_source = certificate
        .install_certificate(config)
        .context("Failed to install certificate")?;

    let connector = ServerConfig::new(config)?
        .configure_ssl_connection()
        .context("Failed to configure the TLS connector")?;

    let catalina = CatalinaProperties::new(config)?;
    let catalina_properties = catalina
        .update_password(config)
        .context("Failed to update catalina.properties")?
        .to_path_buf();

    tracing::info!("Processing complete for {}", install_directory.display());
    Ok(RunSummary {
        install_directory,
        freshly_installed,
        keystore: certificate.keystore_path().to_path_buf(),
        certificate_source,
        connector,
        catalina_properties,
    })
}

/// Open the installed keystore with the configured password
pub fn inspect(config: &Configuration) -> Result<(PathBuf, CertificateBundle)> {
    let certificate = CertificateManager::new(config)?;
    let bundle = certificate
        .load_installed(config)
        .context("Failed to inspect keystore")?;
    Ok((certificate.keystore_path().to_path_buf(), bundle))
}

/// Delete the install directory
pub fn remove(config: &Configuration) -> Result<bool> {
    TomcatInstaller::new(config)?.remove()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{error_kind, ErrorKind};

    #[test]
    fn test_validation_collects_all_missing_keys() {
        let config = Configuration::from_pairs([(configs::TARGET_DIRECTORY, "/tmp/tomcat")]);
        let err = validate_configuration(&config).unwrap_err();
        assert_eq!(error_kind(&err), Some(ErrorKind::Configuration));
        let message = err.to_string();
        for key in [
            configs::TOMCAT_FILE_SERVERXML,
            configs::TOMCAT_FILE_CATALINAPROPERTIES,
            configs::CERTIFICATE_SSL_KEYSTORE,
            configs::TOMCAT_CONNECTOR_PORT_SSL,
        ] {
            assert!(message.contains(key), "{key} missing from {message}");
        }
        assert_eq!(message.matches(configs::CERTIFICATE_SSL_KEYSTORE).count(), 1);
    }

    #[test]
    fn test_inspect_missing_keystore() {
        let dir = tempfile::tempdir().unwrap();
        let config = Configuration::from_pairs([
            (configs::TARGET_DIRECTORY, dir.path().to_string_lossy().to_string()),
            (configs::CERTIFICATE_SSL_KEYSTORE, "localhost.p12".to_string()),
            (configs::CERTIFICATE_SSL_PASSWORD, "defaultPassword".to_string()),
        ]);
        let err = inspect(&config).unwrap_err();
        assert_eq!(error_kind(&err), Some(ErrorKind::Io));
    }

    #[test]
    fn test_run_without_target_fails_before_touching_disk() {
        let mut config = Configuration::default();
        let err = run(&mut config).unwrap_err();
        assert_eq!(error_kind(&err), Some(ErrorKind::Configuration));
    }
}
