//! Parcel command line tool
//!
//! Export libraries and a configuration directory into a multi-part archive,
//! and verify, list, or restore such archives.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use parcel_rs::{
    export_session, import_session, DirLibraryExporter, Importer, ParcelConfig, Progress,
};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "parcel")]
#[command(about = "Multi-part archival export and import")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Export libraries and a configuration directory into DEST
    Export {
        /// Directory to write the parts into (created if missing)
        dest: PathBuf,

        /// Maximum bytes per part
        #[arg(long)]
        part_size: Option<u64>,

        /// Library directory to export (repeatable)
        #[arg(short = 'l', long = "library")]
        libraries: Vec<PathBuf>,

        /// Configuration directory to export
        #[arg(long)]
        config_dir: Option<PathBuf>,

        /// TOML settings file; command line options take precedence
        #[arg(short = 'c', long)]
        config: Option<PathBuf>,
    },

    /// Restore every library and the configuration directory into DEST
    Import {
        /// Directory holding the parts
        source: PathBuf,

        /// Directory to restore into
        dest: PathBuf,
    },

    /// Read every file and check its digest
    Verify {
        /// Directory holding the parts
        source: PathBuf,
    },

    /// List archived files with their location
    List {
        /// Directory holding the parts
        source: PathBuf,
    },
}

/// Prints coarse progress lines to stderr
struct ConsoleProgress {
    files: usize,
    bytes: u64,
}

impl Progress for ConsoleProgress {
    fn stage(&mut self, current: usize, total: usize, label: &str) {
        eprintln!("[{}/{}] {}", current, total, label);
    }

    fn file(&mut self, _name: &str, bytes: u64) {
        self.files += 1;
        self.bytes += bytes;
    }
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut progress = ConsoleProgress { files: 0, bytes: 0 };

    match args.command {
        Command::Export {
            dest,
            part_size,
            libraries,
            config_dir,
            config,
        } => {
            let mut settings = match &config {
                Some(path) => ParcelConfig::from_file(path)
                    .with_context(|| format!("loading settings from {:?}", path))?,
                None => ParcelConfig::default(),
            };
            settings.archive_dir = Some(dest);
            if let Some(size) = part_size {
                settings.part_size = size;
            }
            if !libraries.is_empty() {
                settings.libraries = libraries;
            }
            if config_dir.is_some() {
                settings.config_dir = config_dir;
            }
            settings.validate()?;

            let exporter = settings.exporter_builder().create_dir(true).build()?;
            let parts = export_session(
                exporter,
                &settings.libraries,
                settings.config_dir.as_deref(),
                &mut DirLibraryExporter,
                &mut progress,
            )
            .context("export failed")?;

            info!(
                "Exported {} files ({} bytes) into {} parts",
                progress.files,
                progress.bytes,
                parts.len()
            );
        }

        Command::Import { source, dest } => {
            let importer = open(&source)?;
            let summary = import_session(&importer, &dest, &mut progress)
                .with_context(|| format!("restoring into {:?}", dest))?;

            for (key, target) in &summary.libraries {
                println!("{} -> {}", key, target.display());
            }
            if let Some(target) = &summary.config_dir {
                println!("config_dir -> {}", target.display());
            }
            report_corrupted(&summary.corrupted);
        }

        Command::Verify { source } => {
            let importer = open(&source)?;
            let corrupted = importer.verify_all()?;
            if corrupted.is_empty() {
                println!(
                    "{} files in {} parts verified",
                    importer.records().len(),
                    importer.part_count()
                );
            } else {
                report_corrupted(&corrupted);
                std::process::exit(1);
            }
        }

        Command::List { source } => {
            let importer = open(&source)?;
            for (key, record) in importer.records() {
                println!(
                    "{}\tpart {}\toffset {}\t{} bytes",
                    key, record.part, record.offset, record.length
                );
            }
        }
    }

    Ok(())
}

fn open(source: &Path) -> Result<Importer> {
    Importer::open(source).with_context(|| format!("opening archive in {:?}", source))
}

fn report_corrupted(corrupted: &[String]) {
    if corrupted.is_empty() {
        return;
    }
    eprintln!("{} corrupted files:", corrupted.len());
    for description in corrupted {
        eprintln!("  {}", description);
    }
}
