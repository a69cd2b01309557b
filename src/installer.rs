//! Tomcat distribution install
//!
//! Unpacks the configured zip image into the target directory, optionally
//! stripping leading path segments (Tomcat zips wrap everything in an
//! `apache-tomcat-x.y.z/` folder). An install is recognized by the presence of
//! `conf/`, `server.xml` and `catalina.properties`.

use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};
use zip::ZipArchive;

use crate::certificate::CONF_DIRECTORY;
use crate::configs::{self, ConfigValidator, Configuration};
use crate::error::ConfiguratorError;

/// Counts of what an unpack did
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExpandStats {
    pub directories: usize,
    pub files: usize,
    pub skipped: usize,
}

#[derive(Debug)]
pub struct TomcatInstaller {
    target_dir: PathBuf,
    server_xml: PathBuf,
    catalina_properties: PathBuf,
}

impl ConfigValidator for TomcatInstaller {
    const COMPONENT: &'static str = "TomcatInstaller";
    const REQUIRED_KEYS: &'static [&'static str] = &[
        configs::TARGET_DIRECTORY,
        configs::TOMCAT_FILE_CATALINAPROPERTIES,
        configs::TOMCAT_FILE_SERVERXML,
    ];
}

impl TomcatInstaller {
    pub fn new(config: &Configuration) -> Result<Self> {
        configs::require::<Self>(config)?;
        let installer = Self {
            target_dir: config.target_directory()?,
            server_xml: PathBuf::from(config.require(configs::TOMCAT_FILE_SERVERXML)?),
            catalina_properties: PathBuf::from(
                config.require(configs::TOMCAT_FILE_CATALINAPROPERTIES)?,
            ),
        };
        tracing::info!(
            "Tomcat is currently {}",
            if installer.is_installed() {
                "Installed"
            } else {
                "Not Installed"
            }
        );
        Ok(installer)
    }

    /// Absolute install directory
    pub fn install_directory(&self) -> Result<PathBuf> {
        std::path::absolute(&self.target_dir).with_context(|| {
            format!(
                "Failed to resolve install directory {}",
                self.target_dir.display()
            )
        })
    }

    /// `conf/`, `server.xml` and `catalina.properties` all exist
    pub fn is_installed(&self) -> bool {
        self.target_dir.join(CONF_DIRECTORY).is_dir()
            && self.target_dir.join(&self.server_xml).exists()
            && self.target_dir.join(&self.catalina_properties).exists()
    }

    /// Unpack the configured image, overwriting existing files. Returns the
    /// absolute install directory.
    pub fn install(&self, config: &Configuration) -> Result<PathBuf> {
        let missing: Vec<&'static str> = [
            configs::TOMCAT_IMAGE_DIRECTORY,
            configs::TOMCAT_IMAGE_ZIP_FILE,
        ]
        .into_iter()
        .filter(|k| !config.contains_key(k))
        .collect();
        if !missing.is_empty() {
            tracing::warn!("Tomcat is not installed and no installation image was provided");
            return Err(ConfiguratorError::MissingConfiguration {
                component: Self::COMPONENT,
                keys: missing,
            }
            .into());
        }

        let install_source = Path::new(config.require(configs::TOMCAT_IMAGE_DIRECTORY)?)
            .join(config.require(configs::TOMCAT_IMAGE_ZIP_FILE)?);
        let strip = config.parse_or(configs::TOMCAT_IMAGE_ZIP_STRIPDIRECTORIES, 0usize)?;

        tracing::info!(
            "Installing {} into {} (strip {})",
            install_source.display(),
            self.target_dir.display(),
            strip
        );
        let stats = expand_zip_file(&install_source, &self.target_dir, true, strip)?;
        tracing::info!(
            "Unpacked {} files and {} directories, skipped {}",
            stats.files,
            stats.directories,
            stats.skipped
        );
        self.install_directory()
    }

    /// Delete everything at the install location
    pub fn remove(&self) -> Result<bool> {
        tracing::info!(
            "Deleting anything that can be found at {}",
            self.target_dir.display()
        );
        match fs::remove_dir_all(&self.target_dir) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => {
                tracing::warn!("Failed to delete {}: {}", self.target_dir.display(), e);
            }
            _ => {}
        }
        Ok(!self.target_dir.exists())
    }
}

/// Unpack `source` into `target_dir`.
///
/// `strip` leading path segments are removed from every entry; entries with
/// no segments left are skipped, as are entries whose path would escape
/// `target_dir`. Existing files are only replaced when `overwrite` is set.
pub fn expand_zip_file(
    source: &Path,
    target_dir: &Path,
    overwrite: bool,
    strip: usize,
) -> Result<ExpandStats> {
    if !source.exists() {
        return Err(ConfiguratorError::NotFound {
            what: "Installation image",
            path: source.to_path_buf(),
        }
        .into());
    }
    fs::create_dir_all(target_dir)
        .with_context(|| format!("Failed to create {}", target_dir.display()))?;

    let file =
        File::open(source).with_context(|| format!("Failed to open {}", source.display()))?;
    let mut archive = ZipArchive::new(file)
        .with_context(|| format!("Failed to read zip archive {}", source.display()))?;

    let mut stats = ExpandStats::default();
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let Some(entry_path) = entry.enclosed_name().map(|p| p.to_path_buf()) else {
            tracing::warn!("SKIPPING unsafe entry: {}", entry.name());
            stats.skipped += 1;
            continue;
        };

        let Some(relative) = strip_leading(&entry_path, strip) else {
            tracing::debug!("SKIPPING: {}", entry_path.display());
            stats.skipped += 1;
            continue;
        };
        let next_file = target_dir.join(relative);

        if next_file.exists() && !overwrite {
            tracing::debug!("SKIPPING: {}", next_file.display());
            stats.skipped += 1;
            continue;
        }

        if entry.is_dir() {
            fs::create_dir_all(&next_file)
                .with_context(|| format!("Failed to create {}", next_file.display()))?;
            tracing::debug!("MKDIR: {}", next_file.display());
            stats.directories += 1;
            continue;
        }

        if let Some(parent) = next_file.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
                tracing::debug!("MKDIR: {}", parent.display());
            }
        }

        tracing::debug!("EXPANDING: {}", next_file.display());
        let mut out = File::create(&next_file)
            .with_context(|| format!("Failed to create {}", next_file.display()))?;
        io::copy(&mut entry, &mut out)
            .with_context(|| format!("Failed to expand {}", next_file.display()))?;
        apply_mode(&next_file, entry.unix_mode())?;
        stats.files += 1;
    }
    Ok(stats)
}

/// Drop the first `strip` normal segments, or `None` if nothing would remain
fn strip_leading(path: &Path, strip: usize) -> Option<PathBuf> {
    let segments: Vec<_> = path
        .components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .collect();
    if strip >= segments.len() {
        return None;
    }
    Some(segments[strip..].iter().collect())
}

#[cfg(unix)]
fn apply_mode(path: &Path, mode: Option<u32>) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    if let Some(mode) = mode {
        fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o7777))
            .with_context(|| format!("Failed to set permissions on {}", path.display()))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn apply_mode(_path: &Path, _mode: Option<u32>) -> Result<()> {
    Ok(())
}
