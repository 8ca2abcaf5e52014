// SPDX-License-Identifier: GPL-3.0-only

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use ovmf_vars::document::Document;
use ovmf_vars::{image, Error};

/// UEFI OVMF variable store manipulation tool.
#[derive(Parser)]
#[command(name = "ovmf-vars", version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Dump an OVMF_VARS.fd image in human-readable form
    Dump {
        /// OVMF_VARS.fd file to dump
        input: PathBuf,
        /// Show deleted variables
        #[arg(short, long)]
        deleted: bool,
    },
    /// Export an OVMF_VARS.fd image as YAML
    Export {
        /// OVMF_VARS.fd file to export
        input: PathBuf,
        /// Output YAML file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Overwrite an existing output file
        #[arg(short, long)]
        force: bool,
    },
    /// Build an OVMF_VARS.fd image from YAML
    Compile {
        /// YAML file to compile
        input: PathBuf,
        /// Output OVMF_VARS.fd file
        output: PathBuf,
        /// Overwrite an existing output file
        #[arg(short, long)]
        force: bool,
    },
    /// Generate an empty OVMF_VARS.fd image
    GenerateBlank {
        /// Output OVMF_VARS.fd file
        output: PathBuf,
        /// Overwrite an existing output file
        #[arg(short, long)]
        force: bool,
    },
}

fn ensure_writable(path: &Path, force: bool) -> Result<(), Error> {
    if path.exists() && !force {
        Err(Error::OutputExists(path.to_path_buf()))
    } else {
        Ok(())
    }
}

fn main() -> Result<()> {
    match Args::parse().command {
        Command::Dump { input, deleted } => {
            let data = fs::read(&input)
                .with_context(|| format!("failed to read '{}'", input.display()))?;
            image::dump(&data, deleted, &mut io::stdout().lock())?;
        }
        Command::Export {
            input,
            output,
            force,
        } => {
            let data = fs::read(&input)
                .with_context(|| format!("failed to read '{}'", input.display()))?;
            let yaml = image::export(&data)?.to_yaml()?;
            match output {
                Some(path) => {
                    ensure_writable(&path, force)?;
                    fs::write(&path, yaml)
                        .with_context(|| format!("failed to write '{}'", path.display()))?;
                }
                None => print!("{yaml}"),
            }
        }
        Command::Compile {
            input,
            output,
            force,
        } => {
            ensure_writable(&output, force)?;
            let text = fs::read_to_string(&input)
                .with_context(|| format!("failed to read '{}'", input.display()))?;
            let document = Document::parse(&text)?;
            let data = image::compile(&document)?;
            fs::write(&output, data)
                .with_context(|| format!("failed to write '{}'", output.display()))?;
        }
        Command::GenerateBlank { output, force } => {
            ensure_writable(&output, force)?;
            let data = image::generate_blank()?;
            fs::write(&output, data)
                .with_context(|| format!("failed to write '{}'", output.display()))?;
        }
    }
    Ok(())
}
