//! `server.xml` connector reconciliation
//!
//! Turns on TLS for the connector listening on the configured TLS port and
//! points the plaintext connector's `redirectPort` at it. When the document
//! has no TLS connector (the stock Tomcat file ships it commented out) one is
//! synthesized and appended to the single `Service` element.
//!
//! The file is first copied to `<file>.backup`; the backup is parsed and the
//! result overwrites the original, pretty-printed. Running the reconciliation
//! again on its own output changes nothing.

use anyhow::{anyhow, Context, Result};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use xmltree::{Element, EmitterConfig, XMLNode};

use crate::certificate::CONF_DIRECTORY;
use crate::configs::{self, ConfigValidator, Configuration};
use crate::error::{remove_file_if_exists, ConfiguratorError};
use crate::xml_tree;

const ELEMENT_SERVICE: &str = "Service";
const ELEMENT_CONNECTOR: &str = "Connector";
const ELEMENT_SSLHOSTCONFIG: &str = "SSLHostConfig";
const ELEMENT_CERTIFICATE: &str = "Certificate";
const ELEMENT_UPGRADEPROTOCOL: &str = "UpgradeProtocol";
const ATTRIBUTE_PORT: &str = "port";
const ATTRIBUTE_PROTOCOL: &str = "protocol";
const ATTRIBUTE_REDIRECTPORT: &str = "redirectPort";
const ATTRIBUTE_SSLENABLED: &str = "SSLEnabled";
const ATTRIBUTE_MAXTHREADS: &str = "maxThreads";
const ATTRIBUTE_MAXPARAMETERCOUNT: &str = "maxParameterCount";
const ATTRIBUTE_CLASSNAME: &str = "className";
const ATTRIBUTE_KEYSTORE: &str = "certificateKeystoreFile";
const ATTRIBUTE_KEYPASS: &str = "certificateKeystorePassword";
const ATTRIBUTE_KEYTYPE: &str = "type";

// Fixed until they become configurable
const HTTP2_UPGRADE_PROTOCOL: &str = "org.apache.coyote.http2.Http2Protocol";
const DEFAULT_MAXTHREADS: &str = "150";
const DEFAULT_MAXPARAMETERCOUNT: &str = "1000";

const BACKUP_SUFFIX: &str = ".backup";

/// Values written into the document
#[derive(Debug, Clone)]
pub struct ConnectorSettings {
    pub tls_port: String,
    pub plain_port: Option<String>,
    pub protocol: String,
    pub key_algorithm: String,
    pub keystore_file: String,
}

impl ConnectorSettings {
    pub fn from_config(config: &Configuration) -> Result<Self> {
        Ok(Self {
            tls_port: config.require(configs::TOMCAT_CONNECTOR_PORT_SSL)?.trim().to_string(),
            plain_port: config
                .get(configs::TOMCAT_CONNECTOR_PORT)
                .map(|p| p.trim().to_string()),
            protocol: config.require(configs::CERTIFICATE_SSL_PROTOCOL)?.to_string(),
            key_algorithm: config.require(configs::CERTIFICATE_SSL_ALGORITHM)?.to_string(),
            keystore_file: config.require(configs::CERTIFICATE_SSL_KEYSTORE)?.to_string(),
        })
    }

    /// Keystore location as Tomcat resolves it, relative to the install root
    fn keystore_attribute(&self) -> String {
        format!("{}/{}", CONF_DIRECTORY, self.keystore_file)
    }

    /// Placeholder Tomcat substitutes from `catalina.properties` at boot
    fn password_reference() -> String {
        format!("${{{}}}", configs::CERTIFICATE_SSL_PASSWORD)
    }

    fn apply_to_certificate(&self, certificate: &mut Element) {
        set_attribute(certificate, ATTRIBUTE_KEYTYPE, &self.key_algorithm);
        set_attribute(certificate, ATTRIBUTE_KEYSTORE, &self.keystore_attribute());
        set_attribute(certificate, ATTRIBUTE_KEYPASS, &Self::password_reference());
    }
}

/// What the reconciliation did to the document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsConnectorChange {
    Updated,
    Created,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub tls_connector: TlsConnectorChange,
    pub redirects_set: usize,
}

#[derive(Debug)]
pub struct ServerConfig {
    server_file: PathBuf,
    backup_server_file: PathBuf,
    settings: ConnectorSettings,
}

impl ConfigValidator for ServerConfig {
    const COMPONENT: &'static str = "ServerConfig";
    const REQUIRED_KEYS: &'static [&'static str] = &[
        configs::TARGET_DIRECTORY,
        configs::TOMCAT_FILE_SERVERXML,
        configs::CERTIFICATE_SSL_ALGORITHM,
        configs::CERTIFICATE_SSL_KEYSTORE,
        configs::CERTIFICATE_SSL_PROTOCOL,
        configs::TOMCAT_CONNECTOR_PORT_SSL,
    ];
}

impl ServerConfig {
    pub fn new(config: &Configuration) -> Result<Self> {
        configs::require::<Self>(config)?;
        let target = config.target_directory()?;
        let file_name = config.require(configs::TOMCAT_FILE_SERVERXML)?;
        let server_file = target.join(file_name);
        let backup_server_file = target.join(format!("{}{}", file_name, BACKUP_SUFFIX));
        tracing::info!(
            "Server configuration file located at: {}",
            server_file.display()
        );
        Ok(Self {
            server_file,
            backup_server_file,
            settings: ConnectorSettings::from_config(config)?,
        })
    }

    pub fn server_config_file(&self) -> &Path {
        &self.server_file
    }

    pub fn backup_file(&self) -> &Path {
        &self.backup_server_file
    }

    /// Back up, read, reconcile and rewrite `server.xml` in one step
    pub fn configure_ssl_connection(&self) -> Result<ReconcileOutcome> {
        if !self.server_file.exists() {
            return Err(ConfiguratorError::NotFound {
                what: "Server configuration",
                path: self.server_file.clone(),
            }
            .into());
        }
        remove_file_if_exists(&self.backup_server_file).with_context(|| {
            format!("Failed to remove {}", self.backup_server_file.display())
        })?;
        fs::copy(&self.server_file, &self.backup_server_file).with_context(|| {
            format!(
                "Failed to back up {} to {}",
                self.server_file.display(),
                self.backup_server_file.display()
            )
        })?;

        let mut document = read_document(&self.backup_server_file)?;
        let outcome = reconcile(&mut document, &self.settings)?;

        remove_file_if_exists(&self.server_file)
            .with_context(|| format!("Failed to remove {}", self.server_file.display()))?;
        write_document(&document, &self.server_file)?;

        tracing::info!(
            "TLS connector on port {} {:?}, {} redirect(s) set",
            self.settings.tls_port,
            outcome.tls_connector,
            outcome.redirects_set
        );
        Ok(outcome)
    }
}

/// Apply the TLS settings to an in-memory document
pub fn reconcile(root: &mut Element, settings: &ConnectorSettings) -> Result<ReconcileOutcome> {
    let services = xml_tree::paths_by_name(root, ELEMENT_SERVICE);
    if services.len() != 1 {
        return Err(ConfiguratorError::MalformedServerConfig(format!(
            "this utility requires one, and only one, {} element (found {})",
            ELEMENT_SERVICE,
            services.len()
        ))
        .into());
    }

    let mut found_tls_connector = false;
    let mut redirects_set = 0;
    for path in xml_tree::paths_by_name(root, ELEMENT_CONNECTOR) {
        let connector = xml_tree::element_at_mut(root, &path)
            .ok_or_else(|| anyhow!("Connector moved during reconciliation"))?;

        if port_matches(connector, &settings.tls_port) {
            // first Certificate wins when there are several
            let certificate = xml_tree::first_by_name_mut(connector, ELEMENT_CERTIFICATE)
                .ok_or_else(|| {
                    ConfiguratorError::MalformedServerConfig(format!(
                        "{} on port {} does not have a {}",
                        ELEMENT_CONNECTOR, settings.tls_port, ELEMENT_CERTIFICATE
                    ))
                })?;
            settings.apply_to_certificate(certificate);

            set_attribute(connector, ATTRIBUTE_SSLENABLED, "true");
            set_attribute(connector, ATTRIBUTE_PROTOCOL, &settings.protocol);
            found_tls_connector = true;
        } else if settings
            .plain_port
            .as_deref()
            .is_some_and(|plain| port_matches(connector, plain))
        {
            set_attribute(connector, ATTRIBUTE_REDIRECTPORT, &settings.tls_port);
            redirects_set += 1;
        }
    }

    let tls_connector = if found_tls_connector {
        TlsConnectorChange::Updated
    } else {
        let service = xml_tree::element_at_mut(root, &services[0])
            .ok_or_else(|| anyhow!("Service element disappeared during reconciliation"))?;
        service
            .children
            .push(XMLNode::Element(create_ssl_connector_node(settings)));
        TlsConnectorChange::Created
    };

    Ok(ReconcileOutcome {
        tls_connector,
        redirects_set,
    })
}

/// Connector subtree for documents that have no TLS connector yet
fn create_ssl_connector_node(settings: &ConnectorSettings) -> Element {
    let mut certificate = Element::new(ELEMENT_CERTIFICATE);
    settings.apply_to_certificate(&mut certificate);

    let mut hostconfig = Element::new(ELEMENT_SSLHOSTCONFIG);
    hostconfig.children.push(XMLNode::Element(certificate));

    let upgrade = xml_tree::element_with_attributes(
        ELEMENT_UPGRADEPROTOCOL,
        &[(ATTRIBUTE_CLASSNAME, HTTP2_UPGRADE_PROTOCOL)],
    );

    let mut connector = xml_tree::element_with_attributes(
        ELEMENT_CONNECTOR,
        &[
            (ATTRIBUTE_PORT, settings.tls_port.as_str()),
            (ATTRIBUTE_PROTOCOL, settings.protocol.as_str()),
            (ATTRIBUTE_MAXTHREADS, DEFAULT_MAXTHREADS),
            (ATTRIBUTE_MAXPARAMETERCOUNT, DEFAULT_MAXPARAMETERCOUNT),
            (ATTRIBUTE_SSLENABLED, "true"),
        ],
    );
    connector.children.push(XMLNode::Element(upgrade));
    connector.children.push(XMLNode::Element(hostconfig));
    connector
}

fn port_matches(connector: &Element, port: &str) -> bool {
    connector
        .attributes
        .get(ATTRIBUTE_PORT)
        .is_some_and(|value| value.trim().eq_ignore_ascii_case(port))
}

fn set_attribute(element: &mut Element, name: &str, value: &str) {
    element
        .attributes
        .insert(name.to_string(), value.to_string());
}

fn read_document(path: &Path) -> Result<Element> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    Element::parse(BufReader::new(file))
        .with_context(|| format!("Failed to parse {}", path.display()))
}

fn write_document(document: &Element, path: &Path) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    document
        .write_with_config(&mut writer, EmitterConfig::new().perform_indent(true))
        .with_context(|| format!("Failed to write {}", path.display()))?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{error_kind, ErrorKind};

    const STOCK_SERVER_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Server port="8005" shutdown="SHUTDOWN">
  <Listener className="org.apache.catalina.startup.VersionLoggerListener" />
  <Service name="Catalina">
    <Connector port="8080" protocol="HTTP/1.1"
               connectionTimeout="20000"
               redirectPort="8443" />
    <!--
    <Connector port="8443" protocol="org.apache.coyote.http11.Http11NioProtocol"
               maxThreads="150" SSLEnabled="true">
    </Connector>
    -->
    <Engine name="Catalina" defaultHost="localhost">
      <Host name="localhost" appBase="webapps" />
    </Engine>
  </Service>
</Server>
"#;

    const CONFIGURED_SERVER_XML: &str = r#"<Server>
  <Service name="Catalina">
    <Connector port="8080" protocol="HTTP/1.1" redirectPort="9999" />
    <Connector port="8443" protocol="HTTP/1.1" SSLEnabled="false">
      <SSLHostConfig>
        <Certificate certificateKeystoreFile="conf/old.jks" type="EC" />
        <Certificate certificateKeystoreFile="conf/other.jks" type="EC" />
      </SSLHostConfig>
    </Connector>
  </Service>
</Server>
"#;

    fn settings() -> ConnectorSettings {
        ConnectorSettings {
            tls_port: "8443".to_string(),
            plain_port: Some("8080".to_string()),
            protocol: "org.apache.coyote.http11.Http11NioProtocol".to_string(),
            key_algorithm: "RSA".to_string(),
            keystore_file: "localhost.p12".to_string(),
        }
    }

    fn connector<'a>(root: &'a Element, port: &str) -> Vec<&'a Element> {
        xml_tree::elements_by_name(root, ELEMENT_CONNECTOR)
            .into_iter()
            .filter(|c| port_matches(c, port))
            .collect()
    }

    fn attr<'a>(element: &'a Element, name: &str) -> Option<&'a str> {
        element.attributes.get(name).map(String::as_str)
    }

    #[test]
    fn test_synthesizes_tls_connector() {
        let mut root = Element::parse(STOCK_SERVER_XML.as_bytes()).unwrap();
        let outcome = reconcile(&mut root, &settings()).unwrap();
        assert_eq!(outcome.tls_connector, TlsConnectorChange::Created);
        assert_eq!(outcome.redirects_set, 1);

        let tls = connector(&root, "8443");
        assert_eq!(tls.len(), 1);
        let tls = tls[0];
        assert_eq!(attr(tls, ATTRIBUTE_SSLENABLED), Some("true"));
        assert_eq!(attr(tls, ATTRIBUTE_MAXTHREADS), Some("150"));
        assert_eq!(
            attr(tls, ATTRIBUTE_PROTOCOL),
            Some("org.apache.coyote.http11.Http11NioProtocol")
        );

        let upgrades = xml_tree::elements_by_name(tls, ELEMENT_UPGRADEPROTOCOL);
        assert_eq!(attr(upgrades[0], ATTRIBUTE_CLASSNAME), Some(HTTP2_UPGRADE_PROTOCOL));
        let certs = xml_tree::elements_by_name(tls, ELEMENT_CERTIFICATE);
        assert_eq!(certs.len(), 1);
        assert_eq!(attr(certs[0], ATTRIBUTE_KEYSTORE), Some("conf/localhost.p12"));
        assert_eq!(attr(certs[0], ATTRIBUTE_KEYTYPE), Some("RSA"));
        assert_eq!(
            attr(certs[0], ATTRIBUTE_KEYPASS),
            Some("${configurator.certificate.ssl.password}")
        );

        let plain = connector(&root, "8080")[0];
        assert_eq!(attr(plain, ATTRIBUTE_REDIRECTPORT), Some("8443"));

        // appended to the Service, not the root
        let service = xml_tree::elements_by_name(&root, ELEMENT_SERVICE)[0];
        assert_eq!(connector(service, "8443").len(), 1);
    }

    #[test]
    fn test_updates_existing_tls_connector() {
        let mut root = Element::parse(CONFIGURED_SERVER_XML.as_bytes()).unwrap();
        let outcome = reconcile(&mut root, &settings()).unwrap();
        assert_eq!(outcome.tls_connector, TlsConnectorChange::Updated);

        assert_eq!(xml_tree::elements_by_name(&root, ELEMENT_CONNECTOR).len(), 2);
        let tls = connector(&root, "8443")[0];
        assert_eq!(attr(tls, ATTRIBUTE_SSLENABLED), Some("true"));

        let certs = xml_tree::elements_by_name(tls, ELEMENT_CERTIFICATE);
        assert_eq!(certs.len(), 2);
        assert_eq!(attr(certs[0], ATTRIBUTE_KEYSTORE), Some("conf/localhost.p12"));
        assert_eq!(attr(certs[0], ATTRIBUTE_KEYTYPE), Some("RSA"));
        assert_eq!(attr(certs[1], ATTRIBUTE_KEYSTORE), Some("conf/other.jks"));

        let plain = connector(&root, "8080")[0];
        assert_eq!(attr(plain, ATTRIBUTE_REDIRECTPORT), Some("8443"));
    }

    #[test]
    fn test_without_plain_port_leaves_redirects_alone() {
        let mut root = Element::parse(CONFIGURED_SERVER_XML.as_bytes()).unwrap();
        let mut settings = settings();
        settings.plain_port = None;
        let outcome = reconcile(&mut root, &settings).unwrap();
        assert_eq!(outcome.redirects_set, 0);
        let plain = connector(&root, "8080")[0];
        assert_eq!(attr(plain, ATTRIBUTE_REDIRECTPORT), Some("9999"));
    }

    #[test]
    fn test_tls_connector_without_certificate_is_malformed() {
        let xml = r#"<Server><Service><Connector port="8443"/></Service></Server>"#;
        let mut root = Element::parse(xml.as_bytes()).unwrap();
        let err = reconcile(&mut root, &settings()).unwrap_err();
        assert_eq!(error_kind(&err), Some(ErrorKind::Structural));
    }

    #[test]
    fn test_service_count_enforced() {
        for xml in [
            r#"<Server><Connector port="8080"/></Server>"#,
            r#"<Server><Service/><Service/></Server>"#,
        ] {
            let mut root = Element::parse(xml.as_bytes()).unwrap();
            let err = reconcile(&mut root, &settings()).unwrap_err();
            assert_eq!(error_kind(&err), Some(ErrorKind::Structural), "{xml}");
        }
    }

    fn server_config_in(dir: &Path) -> ServerConfig {
        let config = Configuration::from_pairs([
            (configs::TARGET_DIRECTORY, dir.to_string_lossy().to_string()),
            (configs::TOMCAT_FILE_SERVERXML, "conf/server.xml".to_string()),
            (configs::TOMCAT_CONNECTOR_PORT, "8080".to_string()),
            (configs::TOMCAT_CONNECTOR_PORT_SSL, "8443".to_string()),
            (
                configs::CERTIFICATE_SSL_PROTOCOL,
                "org.apache.coyote.http11.Http11NioProtocol".to_string(),
            ),
            (configs::CERTIFICATE_SSL_ALGORITHM, "RSA".to_string()),
            (configs::CERTIFICATE_SSL_KEYSTORE, "localhost.p12".to_string()),
        ]);
        ServerConfig::new(&config).unwrap()
    }

    #[test]
    fn test_configure_file_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("conf")).unwrap();
        let server = server_config_in(dir.path());
        fs::write(server.server_config_file(), STOCK_SERVER_XML).unwrap();

        let first = server.configure_ssl_connection().unwrap();
        assert_eq!(first.tls_connector, TlsConnectorChange::Created);
        assert_eq!(
            fs::read_to_string(server.backup_file()).unwrap(),
            STOCK_SERVER_XML
        );
        let once = fs::read_to_string(server.server_config_file()).unwrap();
        assert!(once.contains("conf/localhost.p12"));
        assert!(once.contains("${configurator.certificate.ssl.password}"));

        let second = server.configure_ssl_connection().unwrap();
        assert_eq!(second.tls_connector, TlsConnectorChange::Updated);
        let twice = fs::read_to_string(server.server_config_file()).unwrap();
        assert_eq!(once, twice);
        assert_eq!(fs::read_to_string(server.backup_file()).unwrap(), once);

        let root = Element::parse(twice.as_bytes()).unwrap();
        assert_eq!(xml_tree::elements_by_name(&root, ELEMENT_CONNECTOR).len(), 2);
        assert_eq!(xml_tree::elements_by_name(&root, ELEMENT_CERTIFICATE).len(), 1);
    }

    #[test]
    fn test_missing_server_file() {
        let dir = tempfile::tempdir().unwrap();
        let server = server_config_in(dir.path());
        let err = server.configure_ssl_connection().unwrap_err();
        assert_eq!(error_kind(&err), Some(ErrorKind::Io));
        assert!(!server.backup_file().exists());
    }

    #[test]
    fn test_unparsable_server_xml() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("conf")).unwrap();
        let server = server_config_in(dir.path());
        fs::write(server.server_config_file(), "<Server><Service>").unwrap();

        let err = server.configure_ssl_connection().unwrap_err();
        assert_eq!(error_kind(&err), Some(ErrorKind::Structural));
        assert!(err.to_string().contains("server.xml.backup"));
        // parsing happens on the backup, so the original is never rewritten
        assert_eq!(
            fs::read_to_string(server.server_config_file()).unwrap(),
            "<Server><Service>"
        );
        assert_eq!(
            fs::read_to_string(server.backup_file()).unwrap(),
            "<Server><Service>"
        );
    }

    #[test]
    fn test_missing_required_keys() {
        let config = Configuration::from_pairs([(configs::TARGET_DIRECTORY, "/tmp/tomcat")]);
        let err = ServerConfig::new(&config).unwrap_err();
        assert_eq!(error_kind(&err), Some(ErrorKind::Configuration));
        assert!(err.to_string().contains(configs::TOMCAT_CONNECTOR_PORT_SSL));
    }
}
