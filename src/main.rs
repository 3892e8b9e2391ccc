use std::{
    fs::File,
    io::{self, BufReader, BufWriter, Read},
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use groundlink::{
    config::StationConfig,
    console::{self, ConsoleOptions},
    env_utils, export,
    link::MemoryWire,
    logging::{ReportLog, ReportSink},
    port_detect, GroundStation,
};

#[derive(Debug, Parser)]
#[command(name = "groundlink")]
#[command(about = "Test stand ground-control link")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List serial ports that look like the stand controller.
    Ports,
    /// Open the link and run the operator console.
    Monitor(MonitorArgs),
    /// Send one command frame and exit.
    Send(SendArgs),
    /// Convert a data log into CSV.
    ExportCsv(ExportArgs),
}

#[derive(Debug, Args)]
struct LinkArgs {
    #[arg(long)]
    port: Option<String>,
    #[arg(long)]
    baud: Option<u32>,
    #[arg(long)]
    config: Option<PathBuf>,
    /// Console output only, no log files.
    #[arg(long)]
    no_log: bool,
}

#[derive(Debug, Args)]
struct MonitorArgs {
    #[command(flatten)]
    link: LinkArgs,
    /// Feed a captured telemetry file instead of opening a port.
    #[arg(long)]
    replay: Option<PathBuf>,
    /// Stop after this many seconds.
    #[arg(long)]
    duration: Option<u64>,
}

#[derive(Debug, Args)]
struct SendArgs {
    #[command(flatten)]
    link: LinkArgs,
    pins: String,
}

#[derive(Debug, Args)]
struct ExportArgs {
    input: PathBuf,
    #[arg(long)]
    output: Option<PathBuf>,
}

fn open_log(config: &StationConfig, no_log: bool) -> Result<ReportLog> {
    if no_log {
        return Ok(ReportLog::console());
    }
    ReportLog::from_env(Some(config.log_dir.as_path()))
}

fn run_ports() -> Result<()> {
    let candidates = port_detect::list_candidates();
    if candidates.is_empty() {
        println!("no serial ports found");
        return Ok(());
    }
    let detected = port_detect::detect_port();
    for candidate in candidates {
        let marker = if detected.as_deref() == Some(candidate.as_str()) {
            " (auto)"
        } else {
            ""
        };
        println!("{candidate}{marker}");
    }
    Ok(())
}

fn run_monitor(args: MonitorArgs) -> Result<()> {
    let config = StationConfig::load_or_default(args.link.config.as_deref())?;
    let log = open_log(&config, args.link.no_log)?;
    let baud = env_utils::baud_from_env(args.link.baud)?;
    let mut station = GroundStation::new(config, log);

    match &args.replay {
        Some(path) => {
            let wire = MemoryWire::new();
            wire.push_inbound(&read_capture(path)?);
            station.configure(&format!("replay:{}", path.display()), baud)?;
            station.connect_with(Box::new(wire.transport()))?;
        }
        None => {
            let port = env_utils::require_port(args.link.port.as_deref())?;
            station.configure(&port, baud)?;
            station.connect()?;
        }
    }

    let options = ConsoleOptions {
        duration: args.duration.map(Duration::from_secs),
        exit_on_eof: false,
    };
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let result = console::run(
        &mut station,
        BufReader::new(io::stdin()),
        &mut out,
        options,
    );
    station.shutdown();
    result
}

fn read_capture(path: &Path) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    File::open(path)
        .with_context(|| format!("opening capture {}", path.display()))?
        .read_to_end(&mut bytes)?;
    Ok(bytes)
}

fn run_send(args: SendArgs) -> Result<()> {
    let config = StationConfig::load_or_default(args.link.config.as_deref())?;
    let log = open_log(&config, args.link.no_log)?;
    let port = env_utils::require_port(args.link.port.as_deref())?;
    let baud = env_utils::baud_from_env(args.link.baud)?;

    let mut station = GroundStation::new(config, log);
    station.configure(&port, baud)?;
    station.connect()?;
    let sent = station.send_command(&args.pins);
    station.shutdown();
    sent?;
    Ok(())
}

fn run_export(args: ExportArgs) -> Result<()> {
    let input = File::open(&args.input)
        .with_context(|| format!("opening data log {}", args.input.display()))?;
    let reader = BufReader::new(input);
    let rows = match &args.output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("creating {}", path.display()))?;
            export::export_csv(reader, BufWriter::new(file))?
        }
        None => export::export_csv(reader, io::stdout().lock())?,
    };
    let mut log = ReportLog::console();
    if rows == 0 {
        log.warn(&format!("no pressure rows found in {}", args.input.display()));
    } else if let Some(path) = &args.output {
        log.system(&format!("Exported {rows} rows to {}", path.display()));
    }
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Ports => run_ports(),
        Commands::Monitor(args) => run_monitor(args),
        Commands::Send(args) => run_send(args),
        Commands::ExportCsv(args) => run_export(args),
    }
}

fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        eprintln!("error: {err:?}");
        std::process::exit(1);
    }
}
