// Foxhunt Relay - ADF bearing and GPS fix fusion for radio direction finding

pub mod bearing;
pub mod commands;
pub mod config;
pub mod dispatch;
pub mod nmea;
pub mod params;
pub mod relay;
pub mod report;
pub mod sentence;
pub mod serial;
pub mod simulate;
pub mod sink;

use commands::AppState;
use config::AppConfig;
use relay::Relay;
use serial::SerialError;
use simulate::Simulator;
use sink::{FileSink, JsonLinesSink, ReportSink};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use dispatch::{Dispatched, Dispatcher, FixPolicy};
pub use report::FusedReport;

const SIMULATION_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Serial(#[from] SerialError),
}

/// Where reports go
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    Stdout,
    Directory(PathBuf),
}

impl std::str::FromStr for Output {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "stdout" | "-" => Output::Stdout,
            dir => Output::Directory(PathBuf::from(dir)),
        })
    }
}

/// Startup options, usually from the command line
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub port: Option<String>,
    pub baud_rate: Option<u32>,
    pub config: Option<PathBuf>,
    pub simulate: bool,
    pub output: Option<Output>,
    pub list_ports: bool,
}

/// Load config, pick the sink, then relay lines until the source ends
pub fn run(options: RunOptions) -> Result<(), RunError> {
    if options.list_ports {
        for port in serial::list_ports()? {
            let marker = if port.is_likely_device { "*" } else { " " };
            println!(
                "{} {} ({}{})",
                marker,
                port.port_name,
                port.port_type,
                port.product.map(|p| format!(", {}", p)).unwrap_or_default()
            );
        }
        return Ok(());
    }

    let config_path = options.config.clone().unwrap_or_else(config::default_config_path);
    let mut config = AppConfig::load_or_default(&config_path);
    if let Some(port) = &options.port {
        config.port = Some(port.clone());
    }
    if let Some(baud_rate) = options.baud_rate {
        config.baud_rate = baud_rate;
    }

    log::info!("Foxhunt relay starting as {}", config.device_id);

    let sink = build_sink(&config, options.output.as_ref());
    let relay = Arc::new(Relay::new(&config, sink));
    let state = AppState::new(config, relay);

    if options.simulate {
        simulate::run_simulation(&state.reader, Simulator::default(), SIMULATION_INTERVAL);
    } else {
        let port = state.config.port.clone().ok_or(SerialError::NoPort)?;
        state.reader.connect(&port, state.config.baud_rate)?;
    }

    state.reader.wait();
    log::info!("Foxhunt relay stopped");
    Ok(())
}

fn build_sink(config: &AppConfig, output: Option<&Output>) -> Box<dyn ReportSink> {
    let output = match output {
        Some(output) => output.clone(),
        None => match &config.results_dir {
            Some(dir) => Output::Directory(dir.clone()),
            None => Output::Stdout,
        },
    };

    match output {
        Output::Stdout => {
            log::info!("Reports go to stdout");
            Box::new(JsonLinesSink::new(config.device_id.clone(), std::io::stdout()))
        }
        Output::Directory(dir) => {
            log::info!("Reports directory: {}", dir.display());
            Box::new(FileSink::new(config.device_id.clone(), dir))
        }
    }
}
