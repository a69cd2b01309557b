//! Tomcat TLS Configurator - local install and TLS hardening for Apache Tomcat
//!
//! Takes a Tomcat distribution zip and a small properties file, and leaves
//! behind an installed Tomcat whose HTTPS connector is enabled and backed by a
//! PKCS#12 keystore.
//!
//! # Overview
//!
//! A run is a single sequential batch:
//!
//! ```text
//! install (unzip, strip N)  →  keystore (reuse | stage | generate)
//!     →  server.xml (TLS connector + redirect)  →  catalina.properties (password)
//! ```
//!
//! Every step is idempotent: a second run over the same directory reuses the
//! install and keystore and rewrites `server.xml` to the same bytes.
//!
//! # Quick Start
//!
//! ```bash
//! cat > configurator.properties <<EOF
//! configurator.target.directory=target/tomcat
//! configurator.tomcat.image.directory=images
//! configurator.tomcat.image.zip.file=apache-tomcat-10.1.28.zip
//! configurator.tomcat.image.zip.stripdirectories=1
//! configurator.tomcat.file.serverxml=conf/server.xml
//! configurator.tomcat.file.catalinaproperties=conf/catalina.properties
//! configurator.tomcat.connector.port=8080
//! configurator.tomcat.connector.port.ssl=8443
//! configurator.certificate.ssl.keystore=localhost.p12
//! configurator.certificate.ssl.protocol=org.apache.coyote.http11.Http11NioProtocol
//! configurator.certificate.ssl.algorithm=RSA
//! configurator.certificate.ssl.owner=CN=localhost, O=Example, C=US
//! EOF
//!
//! cargo run --release
//! ```
//!
//! Any key can be overridden from the environment
//! (`CONFIGURATOR_TOMCAT_CONNECTOR_PORT_SSL=9443`) or the command line
//! (`-D configurator.tomcat.connector.port.ssl=9443`).
//!
//! # As a Library
//!
//! ```no_run
//! use std::path::Path;
//! use tomcat_tls_configurator::configs::Configuration;
//! use tomcat_tls_configurator::process;
//!
//! fn main() -> anyhow::Result<()> {
//!     let mut config = Configuration::load(Path::new("configurator.properties"), &[])?;
//!     let summary = process::run(&mut config)?;
//!     println!("keystore at {}", summary.keystore.display());
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`configs`]: key constants, loading, overrides and the [`configs::ConfigValidator`] trait
//! - [`installer`]: zip unpacking and install detection
//! - [`certificate`]: keystore reuse / staging / generation
//! - [`generate_self_signed`]: RSA key pair and self-signed X.509 certificate
//! - [`keystore`]: PKCS#12 encoding and file handling
//! - [`server_config`]: `server.xml` connector reconciliation
//! - [`catalina_properties`]: password propagation
//! - [`process`]: the workflow
//!
//! # Error Handling
//!
//! All public APIs return `anyhow::Result<T>`. Failures worth telling apart
//! carry an [`error::ConfiguratorError`]; use [`error::error_kind`] to classify:
//!
//! ```no_run
//! use tomcat_tls_configurator::configs::Configuration;
//! use tomcat_tls_configurator::error::{error_kind, ErrorKind};
//! use tomcat_tls_configurator::process;
//!
//! let mut config = Configuration::default();
//! let err = process::run(&mut config).unwrap_err();
//! assert_eq!(error_kind(&err), Some(ErrorKind::Configuration));
//! ```

pub mod catalina_properties;
pub mod certificate;
pub mod configs;
pub mod error;
pub mod generate_self_signed;
pub mod installer;
pub mod keystore;
pub mod process;
pub mod secure_password;
pub mod server_config;
pub mod xml_tree;
