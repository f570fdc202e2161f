mod cli;
mod emitters;

use std::fs;
use std::path::Path;
use std::process::ExitCode;

use anyhow::{anyhow, Context};
use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
        .with(filter)
        .init();
}

fn create_parent_dir(path: &Path) -> anyhow::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display())),
        _ => Ok(()),
    }
}

fn run(cli: &cli::Cli) -> anyhow::Result<()> {
    let input = fs::read_to_string(&cli.input)
        .with_context(|| format!("failed to read {}", cli.input.display()))?;

    let (unit, registry) = spooky_idl::read_unit(&input)
        .with_context(|| format!("failed to compile {}", cli.input.display()))?;
    info!(
        structures = unit.structures.len(),
        interfaces = unit.interfaces.len(),
        types = registry.len(),
        "compiled definition file"
    );

    let header_include = cli
        .header
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| anyhow!("invalid header path {}", cli.header.display()))?;
    let output = emitters::generate(&unit, &registry, cli.role(), header_include)
        .context("failed to generate wrappers")?;

    create_parent_dir(&cli.source)?;
    create_parent_dir(&cli.header)?;

    fs::write(&cli.source, &output.source)
        .with_context(|| format!("failed to write {}", cli.source.display()))?;
    if let Err(error) = fs::write(&cli.header, &output.header) {
        // never leave a source without its header behind
        let _ = fs::remove_file(&cli.source);
        return Err(error).with_context(|| format!("failed to write {}", cli.header.display()));
    }

    debug!(source = %cli.source.display(), header = %cli.header.display(), "wrote wrappers");
    Ok(())
}

fn main() -> ExitCode {
    init_tracing();
    let cli = cli::Cli::parse();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::FAILURE
        }
    }
}
