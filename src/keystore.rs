//! PKCS#12 keystore creation and loading
//!
//! Tomcat reads the TLS key and certificate from a keystore file. The
//! configurator writes exactly one entry, under the alias [`KEYSTORE_ALIAS`].

use anyhow::{anyhow, Context, Result};
use openssl::pkcs12::Pkcs12;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::error::{remove_file_if_exists, ConfiguratorError};
use crate::generate_self_signed::CertificateBundle;
use crate::secure_password::KeystorePassword;

pub const KEYSTORE_ALIAS: &str = "main";

/// Keystore formats this tool can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeystoreType {
    #[default]
    Pkcs12,
}

impl FromStr for KeystoreType {
    type Err = ConfiguratorError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PKCS12" | "P12" | "PFX" => Ok(KeystoreType::Pkcs12),
            _ => Err(ConfiguratorError::UnsupportedStoreType(s.to_string())),
        }
    }
}

impl fmt::Display for KeystoreType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeystoreType::Pkcs12 => f.write_str("PKCS12"),
        }
    }
}

/// Serialize the bundle into a keystore protected by `password`
pub fn create_keystore(
    store_type: KeystoreType,
    bundle: &CertificateBundle,
    password: &KeystorePassword,
) -> Result<Vec<u8>> {
    match store_type {
        KeystoreType::Pkcs12 => {
            let pkcs12 = Pkcs12::builder()
                .name(KEYSTORE_ALIAS)
                .pkey(&bundle.private_key)
                .cert(&bundle.certificate)
                .build2(password.expose())
                .context("Failed to build PKCS#12 keystore")?;
            Ok(pkcs12
                .to_der()
                .context("Failed to encode PKCS#12 keystore")?)
        }
    }
}

/// Write a keystore as a new file, replacing any existing one
pub fn save_keystore<P: AsRef<Path>>(keystore: &[u8], path: P) -> Result<()> {
    let path = path.as_ref();
    remove_file_if_exists(path)
        .with_context(|| format!("Failed to remove old keystore {}", path.display()))?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    fs::write(path, keystore)
        .with_context(|| format!("Failed to write keystore {}", path.display()))?;
    Ok(())
}

/// Open a keystore file and return its key and certificate
pub fn load_keystore<P: AsRef<Path>>(
    path: P,
    password: &KeystorePassword,
) -> Result<CertificateBundle> {
    let path = path.as_ref();
    let der =
        fs::read(path).with_context(|| format!("Failed to read keystore {}", path.display()))?;
    let parsed = Pkcs12::from_der(&der)
        .context("Failed to decode PKCS#12 keystore")?
        .parse2(password.expose())
        .context("Failed to open PKCS#12 keystore (wrong password?)")?;

    let private_key = parsed
        .pkey
        .ok_or_else(|| anyhow!("Keystore {} has no private key", path.display()))?;
    let certificate = parsed
        .cert
        .ok_or_else(|| anyhow!("Keystore {} has no certificate", path.display()))?;
    Ok(CertificateBundle {
        private_key,
        certificate,
    })
}
