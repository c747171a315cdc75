//! Export configuration and the builder that turns it into an [`Exporter`]

use crate::error::{ParcelError, Result};
use crate::exporter::Exporter;
use crate::format::DEFAULT_PART_SIZE;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Settings for one export session, usually loaded from a TOML file
///
/// ```toml
/// part_size = 104857600
/// archive_dir = "/backups/today"
/// config_dir = "/home/me/.config/app"
/// libraries = ["/home/me/Books", "/home/me/Papers"]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ParcelConfig {
    /// Maximum bytes per part before rolling over
    pub part_size: u64,

    /// Where the parts are written
    pub archive_dir: Option<PathBuf>,

    /// Application configuration directory, exported under `config_dir`
    pub config_dir: Option<PathBuf>,

    /// Directories exported as top-level libraries
    pub libraries: Vec<PathBuf>,
}

impl Default for ParcelConfig {
    fn default() -> Self {
        ParcelConfig {
            part_size: DEFAULT_PART_SIZE,
            archive_dir: None,
            config_dir: None,
            libraries: Vec::new(),
        }
    }
}

impl ParcelConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: ParcelConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        debug!("Loaded configuration from {:?}", path.as_ref());
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.part_size == 0 {
            return Err(ParcelError::Config("part_size must be positive".to_string()));
        }
        if let Some(dup) = first_duplicate(&self.libraries) {
            return Err(ParcelError::Config(format!(
                "library {:?} is listed twice",
                dup
            )));
        }
        Ok(())
    }

    /// Builder preloaded with this configuration's part size and directory
    pub fn exporter_builder(&self) -> ExporterBuilder {
        let builder = ExporterBuilder::new().part_size(self.part_size);
        match &self.archive_dir {
            Some(dir) => builder.path(dir),
            None => builder,
        }
    }
}

fn first_duplicate(paths: &[PathBuf]) -> Option<&PathBuf> {
    paths
        .iter()
        .enumerate()
        .find(|(i, p)| paths[..*i].contains(p))
        .map(|(_, p)| p)
}

/// Builder for customizing Exporter creation
///
/// # Examples
///
/// ```rust,no_run
/// use parcel_rs::ExporterBuilder;
///
/// # fn main() -> parcel_rs::Result<()> {
/// let exporter = ExporterBuilder::new()
///     .path("/backups/today")
///     .part_size(100 * 1024 * 1024)
///     .create_dir(true)
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ExporterBuilder {
    path: Option<PathBuf>,
    part_size: u64,
    create_dir: bool,
}

impl ExporterBuilder {
    pub fn new() -> Self {
        ExporterBuilder {
            path: None,
            part_size: DEFAULT_PART_SIZE,
            create_dir: false,
        }
    }

    /// Set the destination directory (required)
    pub fn path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Set the part size limit in bytes
    pub fn part_size(mut self, bytes: u64) -> Self {
        self.part_size = bytes;
        self
    }

    /// Create the destination directory if it does not exist
    pub fn create_dir(mut self, create: bool) -> Self {
        self.create_dir = create;
        self
    }

    /// Build the Exporter instance
    pub fn build(self) -> Result<Exporter> {
        let path = self
            .path
            .ok_or_else(|| ParcelError::Config("destination path must be set".to_string()))?;

        if self.create_dir {
            std::fs::create_dir_all(&path)?;
        }
        Exporter::new(path, self.part_size)
    }
}

impl Default for ExporterBuilder {
    fn default() -> Self {
        Self::new()
    }
}
