use clap::Parser;
use foxhunt_relay::{params, Output, RunOptions};
use std::path::PathBuf;
use std::process::ExitCode;

/// Relay ADF bearings and GPS fixes from a serial line as JSON reports
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Serial port of the ADF unit (overrides the config file)
    #[arg(short, long)]
    port: Option<String>,

    /// Baud rate (overrides the config file)
    #[arg(short, long)]
    baud: Option<u32>,

    /// Config file, defaults to ~/.config/foxhunt-relay/config.json
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Generate synthetic ADF and GPS lines instead of reading a port
    #[arg(long)]
    simulate: bool,

    /// `stdout` or a directory for per-report JSON files
    #[arg(short, long)]
    output: Option<Output>,

    /// List serial ports and exit
    #[arg(long)]
    list_ports: bool,
}

// RUST_LOG fixes the filter when set; otherwise everything passes env_logger
// and the trace toggles move the max level at runtime
fn init_logging() {
    let from_env = std::env::var_os(env_logger::DEFAULT_FILTER_ENV).is_some();
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Trace)
        .parse_default_env()
        .init();
    if !from_env {
        log::set_max_level(params::BASE_LOG_LEVEL);
    }
}

fn main() -> ExitCode {
    init_logging();

    let cli = Cli::parse();
    let options = RunOptions {
        port: cli.port,
        baud_rate: cli.baud,
        config: cli.config,
        simulate: cli.simulate,
        output: cli.output,
        list_ports: cli.list_ports,
    };

    match foxhunt_relay::run(options) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            eprintln!("foxhunt-relay: {}", e);
            ExitCode::FAILURE
        }
    }
}
