use clap::{Parser, Subcommand};
use sia_events::cli::{EventArgs, RunError};
use sia_events::config::resolve_config_path;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Mutex;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "sia-events")]
#[command(about = "Fetch security events from the report API", long_about = None)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbose mode, repeat for more detail
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Debug mode, logs every page and request
    #[arg(long, short = 'd', global = true)]
    debug: bool,

    /// HTTP/S proxy as host:port, overrides api.proxy
    #[arg(long, global = true)]
    proxy: Option<String>,

    /// Log file, stderr if not set
    #[arg(long, short = 'l', global = true)]
    logfile: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch events for a window, or keep polling with --tail
    Event(EventArgs),
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Print the version
    Version,
}

#[derive(Subcommand)]
enum ConfigAction {
    Init {
        #[arg(long)]
        stdout: bool,
    },
    Validate,
}

fn init_tracing(cli: &Cli) -> std::io::Result<()> {
    let default_level = match (cli.debug, cli.verbose) {
        (true, _) | (_, 2..) => "sia_events=trace",
        (false, 1) => "sia_events=debug",
        (false, 0) => "sia_events=info",
    };

    // stdout carries event records, logs never go there
    let writer = match &cli.logfile {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            BoxMakeWriter::new(Mutex::new(file))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(cli.logfile.is_none()),
        )
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(&cli) {
        eprintln!("Error: cannot open log file: {}", e);
        return ExitCode::FAILURE;
    }

    let config_path = resolve_config_path(cli.config.as_deref());

    match cli.command {
        Commands::Event(args) => {
            match sia_events::cli::event::run(config_path, cli.proxy, args).await {
                Ok(_) => ExitCode::SUCCESS,
                Err(e) => report(e),
            }
        }
        Commands::Config { action } => {
            let result = match action {
                ConfigAction::Init { stdout } => sia_events::cli::config::init(stdout),
                ConfigAction::Validate => sia_events::cli::config::validate(config_path),
            };
            match result {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    ExitCode::FAILURE
                }
            }
        }
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
    }
}

fn report(error: RunError) -> ExitCode {
    tracing::error!(error = %error, "Event retrieval failed");
    eprintln!("Error: {}", error);
    ExitCode::from(error.exit_code())
}
