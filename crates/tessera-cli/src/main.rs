use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use miette::{Context, IntoDiagnostic};

use tessera_spirv::Options;

/// Tessera: translate a SPIR-V shader and dump its IR
#[derive(Parser)]
#[command(name = "tessera", version, about)]
struct Cli {
    /// Input SPIR-V binary
    input: PathBuf,

    /// Name of the entry point to translate
    #[arg(short, long, default_value = "main")]
    entry: String,

    /// Log unknown capabilities and extensions instead of rejecting them
    #[arg(long)]
    permissive: bool,

    /// Keep critical edges instead of splitting them
    #[arg(long)]
    no_split_edges: bool,

    /// Output path for the IR dump (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Translate and verify without printing the IR
    #[arg(long)]
    dry_run: bool,
}

fn main() -> ExitCode {
    env_logger::init();
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> miette::Result<()> {
    let cli = Cli::parse();

    let bytes = std::fs::read(&cli.input)
        .into_diagnostic()
        .wrap_err_with(|| format!("failed to read {}", cli.input.display()))?;

    let options = Options {
        strict_capabilities: !cli.permissive,
        split_critical_edges: !cli.no_split_edges,
    };
    let shader = tessera_spirv::parse_bytes(&bytes, &cli.entry, &options)
        .map_err(|e| miette::miette!("{e}"))
        .wrap_err_with(|| format!("failed to translate `{}`", cli.entry))?;

    for (_, function) in shader.module.functions.iter() {
        function
            .verify()
            .map_err(|e| miette::miette!("{e}"))
            .wrap_err_with(|| {
                format!(
                    "IR verification failed in {}",
                    function.name.as_deref().unwrap_or("<anonymous>")
                )
            })?;
    }
    log::info!(
        "translated `{}`: {} functions, {} globals",
        cli.entry,
        shader.module.functions.len(),
        shader.module.globals.len()
    );

    if cli.dry_run {
        return Ok(());
    }

    let dump = tessera_ir::dump_module(&shader.module);
    match &cli.output {
        Some(path) => std::fs::write(path, dump)
            .into_diagnostic()
            .wrap_err_with(|| format!("failed to write {}", path.display()))?,
        None => print!("{dump}"),
    }
    Ok(())
}
