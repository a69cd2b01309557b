//! Tomcat TLS Configurator
//!
//! Installs Tomcat from a zip image and enables its TLS connector. With no
//! subcommand the full workflow runs; `install` and `remove` run just that
//! step, and `inspect` reports on the installed keystore.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use tomcat_tls_configurator::configs::{self, Configuration};
use tomcat_tls_configurator::process;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Base configuration file (Java properties syntax)
    #[arg(
        short,
        long,
        value_name = "FILE",
        env = "CONFIGURATOR_CONFIG",
        default_value = configs::DEFAULT_CONFIG_FILE
    )]
    config: PathBuf,

    /// Override a configuration key, e.g. -D configurator.tomcat.connector.port.ssl=9443
    #[arg(short = 'D', long = "define", value_name = "KEY=VALUE", value_parser = configs::parse_define)]
    defines: Vec<(String, String)>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Install, create or reuse the keystore, patch server.xml and catalina.properties
    Run,
    /// Only unpack the Tomcat image (if not already installed)
    Install,
    /// Open the installed keystore and print its certificate details
    Inspect,
    /// Delete the install directory
    Remove,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config =
        Configuration::load(&cli.config, &cli.defines).context("Failed to load configuration")?;
    tracing::debug!("Configuration: {:?}", config);

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            let summary = process::run(&mut config)?;
            println!("✓ Tomcat at {}", summary.install_directory.display());
            println!(
                "✓ Keystore {} ({:?})",
                summary.keystore.display(),
                summary.certificate_source
            );
            println!(
                "✓ TLS connector {:?}, {} redirect(s) set",
                summary.connector.tls_connector, summary.connector.redirects_set
            );
            println!(
                "✓ Password stored in {}",
                summary.catalina_properties.display()
            );
        }
        Command::Install => {
            let (directory, installed) = process::ensure_installed(&mut config)?;
            if installed {
                println!("✓ Tomcat installed at {}", directory.display());
            } else {
                println!("✓ Tomcat already installed at {}", directory.display());
            }
        }
        Command::Inspect => {
            let (keystore, bundle) = process::inspect(&config)?;
            println!("✓ Keystore {}", keystore.display());
            println!("  Subject:    {}", bundle.subject_text()?);
            println!("  Serial:     {}", bundle.serial_number()?.to_hex_str()?);
            println!("  Not before: {}", bundle.not_before());
            println!("  Not after:  {}", bundle.not_after());
            println!("  Key size:   {} bits", bundle.private_key.bits());
        }
        Command::Remove => {
            if process::remove(&config)? {
                println!("✓ Tomcat removed");
            } else {
                anyhow::bail!("Install directory could not be fully removed");
            }
        }
    }
    Ok(())
}
