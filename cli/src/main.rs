use anyhow::Result;
use clap::{Parser, Subcommand};
use cli::{check_file, CheckOptions};
use frontend::ElabOptions;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// More logging on stderr (repeat for trace output)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Elaborate a module serialized as JSON and print its signatures
    Check {
        file: PathBuf,
        /// Worker threads for independent declarations (0 = one per core)
        #[arg(short, long, default_value_t = 0)]
        jobs: usize,
        /// Reduction fuel per query (defaults to TYCK_FUEL or the built-in budget)
        #[arg(long)]
        fuel: Option<usize>,
        /// Print the normal form of a definition (repeatable)
        #[arg(long = "nf", value_name = "NAME")]
        normalize: Vec<String>,
    },
}

fn init_logging(verbose: u8) -> Result<()> {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    match cli.command {
        Commands::Check {
            file,
            jobs,
            fuel,
            normalize,
        } => {
            let options = CheckOptions {
                elab: ElabOptions { fuel, jobs },
                normalize,
            };
            let report = check_file(&file, &options)?;
            print!("{}", report.render());
            Ok(if report.has_errors() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            })
        }
    }
}
