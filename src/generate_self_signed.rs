//! Self-Signed TLS Certificate Generation Module
//!
//! Generates the RSA key pair and self-signed X.509 certificate that Tomcat
//! serves on its TLS connector. The certificate is its own trust anchor: the
//! issuer and subject are the same distinguished name and it is signed with
//! its own private key.
//!
//! # Certificate Properties
//! - **Self-signed**: Issuer and subject are the same
//! - **Default Key Size**: RSA 4096-bit (2048-bit minimum)
//! - **Signature Algorithm**: SHA-256 with RSA
//! - **Default Validity**: 365 days, starting now
//! - **Serial Number**: Random positive 64-bit number
//! - **Version**: X.509v3
//!
//! # Example
//! ```rust,no_run
//! # use anyhow::Result;
//! # fn example() -> Result<()> {
//! use tomcat_tls_configurator::generate_self_signed::RsaSelfSignedBuilder;
//!
//! let bundle = RsaSelfSignedBuilder::new()
//!     .subject("CN=localhost, OU=Web, O=Example, C=US".to_string())
//!     .validity_days(365)
//!     .build()?;
//! assert!(bundle.verify()?);
//! # Ok(())
//! # }
//! ```

use anyhow::{Context, Result};
use openssl::asn1::{Asn1Time, Asn1TimeRef};
use openssl::bn::{BigNum, MsbOption};
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private, Public};
use openssl::x509::{X509Name, X509};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::ConfiguratorError;

const X509_VERSION_3: i32 = 2; // X509 version 3 is represented by 2
pub const RSA_KEY_SIZE_DEFAULT: u32 = 4096;
pub const RSA_KEY_SIZE_MINIMUM: u32 = 2048;
pub const VALIDITY_DAYS_DEFAULT: u32 = 365;
const SERIAL_NUMBER_BITS: i32 = 64;
const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

/// A freshly generated key pair together with its self-signed certificate
pub struct CertificateBundle {
    pub private_key: PKey<Private>,
    pub certificate: X509,
}

impl fmt::Debug for CertificateBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateBundle")
            .field("private_key", &"<redacted>")
            .field("certificate", &self.certificate)
            .finish()
    }
}

impl CertificateBundle {
    /// Public half of the key pair, taken from the private key
    pub fn public_key(&self) -> Result<PKey<Public>> {
        let der = self.private_key.public_key_to_der()?;
        Ok(PKey::public_key_from_der(&der)?)
    }

    pub fn not_before(&self) -> &Asn1TimeRef {
        self.certificate.not_before()
    }

    pub fn not_after(&self) -> &Asn1TimeRef {
        self.certificate.not_after()
    }

    pub fn serial_number(&self) -> Result<BigNum> {
        Ok(self.certificate.serial_number().to_bn()?)
    }

    /// Subject rendered back as `CN=host, O=Org` in certificate order
    pub fn subject_text(&self) -> Result<String> {
        let mut parts = Vec::new();
        for entry in self.certificate.subject_name().entries() {
            let field = entry
                .object()
                .nid()
                .short_name()
                .context("Unknown subject field")?;
            let value = entry.data().as_utf8().context("Failed to decode subject")?;
            parts.push(format!("{}={}", field, value.replace(',', "\\,")));
        }
        Ok(parts.join(", "))
    }

    /// The certificate carries this bundle's public key and its signature
    /// verifies with it.
    pub fn verify(&self) -> Result<bool> {
        let cert_key = self.certificate.public_key()?;
        Ok(cert_key.public_eq(&self.private_key) && self.certificate.verify(&self.private_key)?)
    }
}

// ================= RSA Key and Self-Signed Certificate Builder =================

/// Builder for generating an RSA key pair and a self-signed server certificate
///
/// # Required Fields
/// - `subject` - distinguished name in `KEY=value, KEY=value` form, for example
///   `CN=localhost, OU=Web, O=Example, L=Springfield, ST=IL, C=US`
///
/// # Examples
/// ```rust,no_run
/// use tomcat_tls_configurator::generate_self_signed::RsaSelfSignedBuilder;
/// # use anyhow::Result;
/// # fn example() -> Result<()> {
///
/// let bundle = RsaSelfSignedBuilder::new()
///     .subject("CN=tomcat.example.com, O=Example".to_string())
///     .key_size(2048)
///     .validity_days(90)
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct RsaSelfSignedBuilder {
    subject: String,
    key_size: u32,
    validity_days: u32,
}

impl Default for RsaSelfSignedBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RsaSelfSignedBuilder {
    /// Create a new builder with default key size and validity
    pub fn new() -> Self {
        Self {
            subject: String::new(),
            key_size: RSA_KEY_SIZE_DEFAULT,
            validity_days: VALIDITY_DAYS_DEFAULT,
        }
    }

    /// Set the subject (and therefore issuer) distinguished name
    pub fn subject(mut self, subject: String) -> Self {
        self.subject = subject;
        self
    }

    /// Set the RSA modulus size in bits
    pub fn key_size(mut self, bits: u32) -> Self {
        self.key_size = bits;
        self
    }

    /// Set validity period in days
    pub fn validity_days(mut self, days: u32) -> Self {
        self.validity_days = days;
        self
    }

    /// Build the RSA key pair and self-signed certificate
    ///
    /// # Errors
    /// Returns error if:
    /// - the subject is empty or not a valid distinguished name
    /// - the key size is below 2048 bits
    /// - RSA key generation or certificate signing fails
    pub fn build(self) -> Result<CertificateBundle> {
        if self.key_size < RSA_KEY_SIZE_MINIMUM {
            return Err(ConfiguratorError::InvalidConfiguration {
                key: crate::configs::CERTIFICATE_SSL_KEYSIZE,
                value: self.key_size.to_string(),
                reason: format!("RSA keys must be at least {} bits", RSA_KEY_SIZE_MINIMUM),
            }
            .into());
        }
        let name = parse_distinguished_name(&self.subject)?;

        // Generate RSA key pair
        let rsa = openssl::rsa::Rsa::generate(self.key_size)
            .context("Failed to generate RSA keypair")?;
        let private_key = PKey::from_rsa(rsa).context("Failed to create private key")?;

        // Build X509 certificate
        let mut builder = X509::builder().context("Failed to create X509 builder")?;

        builder.set_version(X509_VERSION_3).context("Failed to set version")?;

        // Random positive serial, top bit set so it is always a full 64 bits
        let mut serial = BigNum::new()?;
        serial.rand(SERIAL_NUMBER_BITS, MsbOption::ONE, false)?;
        let asn1_serial = serial.to_asn1_integer()?;
        builder.set_serial_number(&asn1_serial)?;

        builder.set_subject_name(&name).context("Failed to set subject")?;
        builder.set_issuer_name(&name).context("Failed to set issuer")?;

        // Both ends of the window come from one clock read
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .context("System clock is before the Unix epoch")?
            .as_secs() as i64;
        let expires = now + i64::from(self.validity_days) * SECONDS_PER_DAY;

        let not_before = Asn1Time::from_unix(now as libc::time_t)
            .context("Failed to create not_before")?;
        builder
            .set_not_before(&not_before)
            .context("Failed to set not_before")?;

        let not_after = Asn1Time::from_unix(expires as libc::time_t)
            .context("Failed to create not_after")?;
        builder
            .set_not_after(&not_after)
            .context("Failed to set not_after")?;

        builder
            .set_pubkey(&private_key)
            .context("Failed to set public key")?;

        builder
            .sign(&private_key, MessageDigest::sha256())
            .context("Failed to sign certificate")?;

        let certificate = builder.build();
        Ok(CertificateBundle {
            private_key,
            certificate,
        })
    }
}

/// Parse `CN=host, O=Org, C=US` into an X.509 name. A backslash escapes the
/// next character, so `O=Acme\, Inc.` keeps its comma.
pub fn parse_distinguished_name(subject: &str) -> Result<X509Name> {
    let mut name_builder = X509Name::builder().context("Failed to create name builder")?;

    let mut entries = 0;
    for component in split_unescaped(subject) {
        let component = component.trim();
        if component.is_empty() {
            continue;
        }
        let (field, value) = component.split_once('=').ok_or_else(|| {
            ConfiguratorError::InvalidConfiguration {
                key: crate::configs::CERTIFICATE_SSL_OWNER,
                value: subject.to_string(),
                reason: format!("{:?} is not a KEY=value pair", component),
            }
        })?;
        name_builder
            .append_entry_by_text(field.trim(), value.trim())
            .map_err(|e| ConfiguratorError::InvalidConfiguration {
                key: crate::configs::CERTIFICATE_SSL_OWNER,
                value: subject.to_string(),
                reason: format!("{:?} is not a known name field ({})", field.trim(), e),
            })?;
        entries += 1;
    }

    if entries == 0 {
        return Err(ConfiguratorError::InvalidConfiguration {
            key: crate::configs::CERTIFICATE_SSL_OWNER,
            value: subject.to_string(),
            reason: "subject has no entries".to_string(),
        }
        .into());
    }
    Ok(name_builder.build())
}

fn split_unescaped(input: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = input.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            ',' => parts.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    parts.push(current);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{error_kind, ErrorKind};
    use openssl::nid::Nid;

    fn entry(name: &openssl::x509::X509NameRef, nid: Nid) -> String {
        name.entries_by_nid(nid)
            .next()
            .map(|e| e.data().as_utf8().unwrap().to_string())
            .unwrap_or_default()
    }

    #[test]
    fn test_self_signed_certificate_verifies() {
        let bundle = RsaSelfSignedBuilder::new()
            .subject("CN=localhost, OU=Web, O=Acme\\, Inc., C=US".to_string())
            .key_size(2048)
            .build()
            .unwrap();

        assert!(bundle.verify().unwrap());
        assert!(bundle
            .certificate
            .public_key()
            .unwrap()
            .public_eq(&bundle.public_key().unwrap()));
        assert_eq!(bundle.certificate.version(), X509_VERSION_3);
        assert_eq!(
            bundle.certificate.signature_algorithm().object().nid(),
            Nid::SHA256WITHRSAENCRYPTION
        );
        assert_eq!(bundle.private_key.bits(), 2048);

        let subject = bundle.certificate.subject_name();
        let issuer = bundle.certificate.issuer_name();
        assert_eq!(entry(subject, Nid::COMMONNAME), "localhost");
        assert_eq!(entry(subject, Nid::ORGANIZATIONNAME), "Acme, Inc.");
        assert_eq!(
            subject.to_der().unwrap(),
            issuer.to_der().unwrap(),
            "issuer must equal subject"
        );
        assert_eq!(
            bundle.subject_text().unwrap(),
            "CN=localhost, OU=Web, O=Acme\\, Inc., C=US"
        );
    }

    #[test]
    fn test_validity_window_and_serial() {
        let before = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64;
        let bundle = RsaSelfSignedBuilder::new()
            .subject("CN=localhost".to_string())
            .key_size(2048)
            .validity_days(30)
            .build()
            .unwrap();

        let diff = bundle.not_before().diff(bundle.not_after()).unwrap();
        assert_eq!(diff.days, 30);
        assert_eq!(diff.secs, 0);

        let reference = Asn1Time::from_unix(before as libc::time_t).unwrap();
        let skew = reference.diff(bundle.not_before()).unwrap();
        assert_eq!(skew.days, 0);
        assert!(skew.secs >= 0 && skew.secs < 60);

        let serial = bundle.serial_number().unwrap();
        assert_eq!(serial.num_bits(), SERIAL_NUMBER_BITS);
        assert!(!serial.is_negative());
    }

    #[test]
    fn test_small_keys_rejected() {
        let err = RsaSelfSignedBuilder::new()
            .subject("CN=localhost".to_string())
            .key_size(1024)
            .build()
            .err()
            .unwrap();
        assert_eq!(error_kind(&err), Some(ErrorKind::Configuration));
    }

    #[test]
    fn test_bad_subjects_rejected() {
        for subject in ["", " , ", "localhost"] {
            let err = parse_distinguished_name(subject).err().unwrap();
            assert_eq!(error_kind(&err), Some(ErrorKind::Configuration), "{subject:?}");
        }
        let err = parse_distinguished_name("NOTAFIELD=x").err().unwrap();
        assert_eq!(error_kind(&err), Some(ErrorKind::Configuration));
        assert!(err.to_string().contains("NOTAFIELD"));
    }
}
