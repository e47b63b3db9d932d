use clap::{Parser, ValueEnum};
use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;
use trackelev::enhancer::{
    DEFAULT_CHUNK_SIZE, DEFAULT_ERROR_THRESHOLD, DEFAULT_WARNING_THRESHOLD,
};
use trackelev::lookup::DEFAULT_ENDPOINT;
use trackelev::{Enhancer, EnhancerConfig, Format};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "trackelev",
    about = "Add elevation data to the trackpoints of a TCX or GPX file"
)]
struct Cli {
    #[arg(help = "Input track file")]
    input: PathBuf,

    #[arg(help = "Output track file")]
    output: PathBuf,

    #[arg(help = "Elevation service API key")]
    api_key: String,

    #[arg(long, value_enum, default_value_t = FormatArg::Tcx)]
    format: FormatArg,

    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE, help = "Coordinates per lookup request")]
    chunk_size: usize,

    #[arg(long, default_value_t = 0, help = "Cap on unique coordinates (0 = no cap)")]
    max_points: usize,

    #[arg(long, default_value_t = DEFAULT_WARNING_THRESHOLD)]
    warning_threshold: f64,

    #[arg(long, default_value_t = DEFAULT_ERROR_THRESHOLD)]
    error_threshold: f64,

    #[arg(long, default_value = DEFAULT_ENDPOINT)]
    endpoint: String,

    #[arg(long, default_value_t = 500, help = "Pause after each lookup request, in milliseconds")]
    delay_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FormatArg {
    Tcx,
    Gpx,
    /// Infer from the input file extension
    Guess,
}

impl FormatArg {
    fn format(self) -> Option<Format> {
        match self {
            FormatArg::Tcx => Some(Format::Tcx),
            FormatArg::Gpx => Some(Format::Gpx),
            FormatArg::Guess => None,
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let config = EnhancerConfig::new(cli.input, cli.output, cli.api_key)
        .format(cli.format.format())
        .chunk_size(cli.chunk_size)
        .max_points(cli.max_points)
        .thresholds(cli.warning_threshold, cli.error_threshold)
        .endpoint(cli.endpoint)
        .request_delay(Duration::from_millis(cli.delay_ms));

    let mut enhancer = Enhancer::new(config)?;
    enhancer.run()?;
    Ok(())
}
