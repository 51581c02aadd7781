// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `verticed config` subcommands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::{Subcommand, ValueEnum};
use colored::Colorize;
use std::path::{Path, PathBuf};

use vertice_core::domain::server_config::ServerConfigManifest;
use vertice_core::domain::service::SubsystemKind;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Print the effective server manifest
    Show {
        /// List the search locations and which one was loaded
        #[arg(long)]
        paths: bool,

        /// Print the effective manifest as YAML instead of the summary
        #[arg(long)]
        yaml: bool,
    },

    /// Check a server manifest without starting anything
    Validate {
        /// Manifest to check (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Write a starter server manifest
    Generate {
        /// Destination file
        #[arg(short, long, default_value = "./vertice-config.yaml")]
        output: PathBuf,

        /// Which starter manifest to write
        #[arg(long, value_enum, default_value_t = Template::Minimal)]
        template: Template,

        /// Replace the destination if it already exists
        #[arg(long)]
        force: bool,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Template {
    /// Defaults, with httpd on localhost:7777
    Minimal,
    /// Every subsystem, annotated
    Annotated,
}

impl Template {
    fn contents(self) -> &'static str {
        match self {
            Template::Minimal => include_str!("../../templates/config-minimal.yaml"),
            Template::Annotated => include_str!("../../templates/config-with-examples.yaml"),
        }
    }
}

/// Where the effective manifest came from
enum Source {
    Explicit(PathBuf),
    Discovered(PathBuf),
    Defaults,
}

impl Source {
    fn resolve(explicit: Option<PathBuf>) -> Self {
        match explicit {
            Some(path) => Source::Explicit(path),
            None => match ServerConfigManifest::discover_config() {
                Some(path) => Source::Discovered(path),
                None => Source::Defaults,
            },
        }
    }

    fn path(&self) -> Option<&Path> {
        match self {
            Source::Explicit(path) | Source::Discovered(path) => Some(path),
            Source::Defaults => None,
        }
    }

    fn describe(&self) -> String {
        match self {
            Source::Explicit(path) => format!("{} (--config)", path.display()),
            Source::Discovered(path) => path.display().to_string(),
            Source::Defaults => "built-in defaults".to_string(),
        }
    }
}

pub async fn handle_command(command: ConfigCommand, config_override: Option<PathBuf>) -> Result<()> {
    match command {
        ConfigCommand::Show { paths, yaml } => show(config_override, paths, yaml),
        ConfigCommand::Validate { file } => validate(file.or(config_override)).map(|_| ()),
        ConfigCommand::Generate {
            output,
            template,
            force,
        } => generate(&output, template, force),
    }
}

fn show(config_override: Option<PathBuf>, show_paths: bool, as_yaml: bool) -> Result<()> {
    let source = Source::resolve(config_override);

    if show_paths {
        print_search_paths(&source);
    }

    let manifest = ServerConfigManifest::load_or_default(source.path().map(Path::to_path_buf))
        .context("Failed to load server manifest")?;

    if as_yaml {
        print!("{}", serde_yaml::to_string(&manifest).context("Failed to render server manifest")?);
        return Ok(());
    }

    println!("{} {}  {}", "server".bold(), manifest.metadata.name, source.describe().dimmed());
    println!("{} {}", "subsystems".bold(), subsystem_summary(&manifest));
    println!();
    print!("{}", manifest.describe());

    Ok(())
}

fn print_search_paths(source: &Source) {
    println!("{}", "Manifest search order:".bold());
    if let Source::Explicit(path) = source {
        println!("  {:<18} {}  {}", "--config", path.display(), "loaded".green());
    }
    for (label, path) in ServerConfigManifest::search_paths() {
        let marker = if source.path() == Some(path.as_path()) {
            "loaded".green()
        } else if path.exists() {
            "shadowed".yellow()
        } else {
            "absent".dimmed()
        };
        println!("  {:<18} {}  {}", label, path.display(), marker);
    }
    println!();
}

/// `enabled, ... (skipped: disabled, ...)`
fn subsystem_summary(manifest: &ServerConfigManifest) -> String {
    let (enabled, skipped): (Vec<SubsystemKind>, Vec<SubsystemKind>) = SubsystemKind::ALL
        .into_iter()
        .partition(|kind| manifest.spec.is_enabled(*kind));
    let names = |kinds: &[SubsystemKind]| kinds.iter().map(|k| k.name()).collect::<Vec<_>>().join(", ");

    if skipped.is_empty() {
        names(&enabled)
    } else {
        format!("{} (skipped: {})", names(&enabled), names(&skipped))
    }
}

fn validate(config_path: Option<PathBuf>) -> Result<ServerConfigManifest> {
    let source = Source::resolve(config_path);

    let manifest = ServerConfigManifest::load_or_default(source.path().map(Path::to_path_buf))
        .with_context(|| format!("Failed to load {}", source.describe()))?;
    manifest
        .validate()
        .with_context(|| format!("{} is not a valid server manifest", source.describe()))?;

    println!(
        "{} {}: {}",
        "✓".green(),
        source.describe(),
        subsystem_summary(&manifest)
    );

    Ok(manifest)
}

fn generate(output: &Path, template: Template, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!("{} already exists, pass --force to replace it", output.display());
    }

    std::fs::write(output, template.contents())
        .with_context(|| format!("Failed to write {}", output.display()))?;

    println!("{} wrote {:?} manifest to {}", "✓".green(), template, output.display());
    println!("  start with: verticed --config {} start", output.display());

    Ok(())
}
