use clap::{Parser, Subcommand};
use miette::{GraphicalReportHandler, Result};
use sharpen_build::GeneratorConfig;
use sharpen_common::{Diagnostic, DiagnosticKind};
use sharpen_driver::{Driver, Generation};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sharpen")]
#[command(author, version, about = "Emit C# interop bindings from C and C++ ASTs")]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate C# source from AST files
    Generate {
        /// AST files written by the front-end
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Generator configuration (sharpen.toml)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Write every unit merged into one file
        #[arg(short, long, conflicts_with = "out_dir")]
        output: Option<PathBuf>,

        /// Write one file per unit into this directory
        #[arg(long)]
        out_dir: Option<PathBuf>,

        /// Worker threads
        #[arg(short, long, default_value_t = 1)]
        jobs: usize,
    },

    /// Report diagnostics without writing output
    Check {
        /// AST files written by the front-end
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Generator configuration (sharpen.toml)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Exit non-zero when any construct was skipped as unsupported
        #[arg(long)]
        deny_unsupported: bool,
    },

    /// Print the AST of a file
    Dump {
        /// AST file to dump
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))?;

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Generate {
            files,
            config,
            output,
            out_dir,
            jobs,
        } => {
            let driver = driver(config)?.with_jobs(jobs);
            let generation = driver.generate(&files);
            report(&generation);

            if let Some(dir) = out_dir {
                for path in driver.write_dir(&generation, &dir)? {
                    eprintln!("Wrote {}", path.display());
                }
            } else if let Some(output) = output {
                driver.write_merged(&generation, &output)?;
                eprintln!("Wrote {}", output.display());
            } else {
                print!("{}", generation.merged().render(driver.config()));
            }

            if generation.has_failures() {
                return Err(miette::miette!(
                    "{} of {} units failed",
                    generation.failures().count(),
                    generation.units.len()
                ));
            }
        }

        Commands::Check {
            files,
            config,
            deny_unsupported,
        } => {
            let driver = driver(config)?;
            let generation = driver.generate(&files);
            report(&generation);

            for (path, unit) in generation.emitted() {
                if unit.diagnostics.is_empty() {
                    println!("{}: OK", path.display());
                } else {
                    println!("{}: {} diagnostics", path.display(), unit.diagnostics.len());
                }
            }

            let unsupported = generation
                .diagnostics()
                .filter(|d| d.kind == DiagnosticKind::Unsupported)
                .count();
            if generation.has_failures() {
                return Err(miette::miette!(
                    "{} of {} units failed",
                    generation.failures().count(),
                    generation.units.len()
                ));
            }
            if deny_unsupported && unsupported > 0 {
                return Err(miette::miette!(
                    "{} unsupported constructs were skipped",
                    unsupported
                ));
            }
        }

        Commands::Dump { file } => {
            let unit = sharpen_clang::load_unit(&file)?;
            println!("{:#?}", unit);
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn driver(config: Option<PathBuf>) -> Result<Driver> {
    match config {
        Some(path) => Ok(Driver::from_config_file(path)?),
        None => Ok(Driver::new(GeneratorConfig::default())),
    }
}

/// Print every diagnostic and every failed unit to stderr.
fn report(generation: &Generation) {
    for diagnostic in generation.diagnostics() {
        print_diagnostic(diagnostic);
    }
    let handler = GraphicalReportHandler::new();
    for (path, err) in generation.failures() {
        let mut rendered = String::new();
        match handler.render_report(&mut rendered, err) {
            Ok(()) => eprint!("{}", rendered),
            Err(_) => eprintln!("{}: {}", path.display(), err),
        }
    }
}

fn print_diagnostic(diagnostic: &Diagnostic) {
    if let Some(location) = &diagnostic.location {
        eprint!("{}: ", location);
    }
    eprintln!("{:?}", miette::Report::new(diagnostic.clone()));
}
