use anyhow::{bail, Context, Result};
use clap::Parser;
use env_logger::{Builder, Env};
use linkwatch_core::{
    AppConfig, ControlLine, LinkError, PulseLine, Runtime, SerialService, SystemClock, Watchdog,
};
use linkwatch_decode::BaudRate;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Serial port to supervise
    #[arg(short, long)]
    port: Option<String>,

    /// Baud rate, fixed for the whole session
    #[arg(short, long)]
    baud: Option<BaudRate>,

    /// Config file - `<config dir>/linkwatch/config.json` by default
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Line held low during break recovery: break, rts or dtr
    #[arg(long)]
    control_line: Option<ControlLine>,

    /// Modem-status line watched for activity pulses: cts, dsr, dcd, ri or off
    #[arg(long)]
    pulse_line: Option<PulseLine>,

    /// List available serial ports and exit
    #[arg(short, long)]
    list_ports: bool,

    /// Print counters as JSON on exit
    #[arg(long)]
    stats: bool,
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("linkwatch").join("config.json"))
}

fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = match (&args.config, default_config_path()) {
        (Some(path), _) => AppConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        (None, Some(path)) => AppConfig::load_or_default(&path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        (None, None) => AppConfig::default(),
    };

    if let Some(port) = &args.port {
        config.serial.port_name = port.clone();
    }
    if let Some(baud) = args.baud {
        config.serial.baud_rate = baud;
    }
    if let Some(line) = args.control_line {
        config.serial.control_line = line;
    }
    if let Some(line) = args.pulse_line {
        config.serial.pulse_line = line;
    }
    config.validate()?;
    Ok(config)
}

fn list_ports() -> Result<()> {
    let ports = SerialService::list_ports().context("failed to enumerate serial ports")?;
    if ports.is_empty() {
        println!("no serial ports found");
    }
    for port in ports {
        println!("{port}");
    }
    Ok(())
}

fn main() -> Result<()> {
    Builder::from_env(Env::default().default_filter_or(log::LevelFilter::Info.as_str()))
        .format_target(false)
        .init();

    let args = Args::parse();
    if args.list_ports {
        return list_ports();
    }

    let config = load_config(&args)?;
    if config.serial.port_name.is_empty() {
        bail!("no serial port given; pass --port or set serial.port_name in the config file");
    }

    let service = SerialService::open(config.serial.clone())
        .with_context(|| format!("failed to open {}", config.serial.port_name))?;
    let watchdog = Arc::new(Watchdog::new(
        config.watchdog.clone(),
        service.link(),
        service.control(),
    ));
    let mut runtime = Runtime::new(SystemClock::new(), &watchdog);
    log::info!(
        "supervising {} (control: {:?}, pulse: {:?})",
        config.serial.port_name,
        config.serial.control_line,
        config.serial.pulse_line
    );

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        ctrlc::set_handler(move || {
            stop.store(true, Ordering::Release);
        })
        .context("failed to install Ctrl-C handler")?;
    }

    let outcome = runtime.run(service.events(), &stop);
    // joins the worker, which releases the control line
    drop(service);

    if args.stats {
        println!("{}", serde_json::to_string_pretty(&watchdog.stats())?);
    }

    match outcome {
        Ok(()) | Err(LinkError::Disconnected) => {
            log::info!("link closed");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
