use anyhow::{Context, bail};
use clap::Parser;
use esdlc::config::SystemConfig;
use esdlc::diagnostics;
use esdlc::emit::EmitOptions;
use esdlc::ir::Backend;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "esdlc")]
#[command(about = "Compile an Evolutionary System Definition Language definition")]
struct Cli {
    /// ESDL source file. May be omitted when the configuration holds the
    /// definition.
    file: Option<PathBuf>,

    /// JSON system configuration naming the external bindings
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = Backend::Direct)]
    backend: Backend,

    /// Optimisation level
    #[arg(short = 'O', default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=3))]
    optimise: u8,

    /// Emit profiling events around blocks and statements
    #[arg(long)]
    profile: bool,

    /// Print the definition as canonical ESDL instead of the program
    #[arg(long)]
    esdl: bool,

    /// More logging; repeat for more
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "esdlc=warn",
        1 => "esdlc=info",
        2 => "esdlc=debug",
        _ => "esdlc=trace",
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match &cli.config {
        Some(path) => SystemConfig::load(path)?,
        None => SystemConfig::default(),
    };
    let (name, source) = match &cli.file {
        Some(path) => (
            path.display().to_string(),
            fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))?,
        ),
        None => match config.definition() {
            Ok(definition) => ("system.definition".to_string(), definition.to_string()),
            Err(_) => bail!("no ESDL file given and the configuration has no definition"),
        },
    };
    info!(file = %name, "compiling");

    let compilation = esdlc::compile(&source, config.externals())?;
    let failed = diagnostics::print(&name, &source, &compilation.diagnostics)?;
    if failed {
        return Ok(ExitCode::FAILURE);
    }

    if cli.esdl {
        println!("{}", compilation.system.as_esdl());
        return Ok(ExitCode::SUCCESS);
    }

    let options = EmitOptions {
        backend: cli.backend,
        optimise: cli.optimise,
        profile: cli.profile,
    };
    let (program, context) = compilation.emit(&options)?;
    debug!(helpers = ?context, "execution context");
    print!("{program}");
    Ok(ExitCode::SUCCESS)
}
