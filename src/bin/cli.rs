//! Command-line front end for the device link.

use anyhow::{bail, Context, Result};
use biotel_link::builder::LinkBuilder;
use biotel_link::config::DownloadOptions;
use biotel_link::core::{BulkProgressListener, Progress};
use biotel_link::facade::DeviceFacade;
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Attr {
    SerialNo,
    Vendor,
    Model,
    FirmwareVersion,
    BluetoothMac,
    BatteryLevel,
    HeartRate,
    ChargeState,
    Temperature,
    CurrentTime,
}

#[derive(Debug, Parser)]
#[command(name = "biotel-cli", version, about = "Command-line client for the device link")]
struct Cli {
    /// Serial port to connect to. If omitted, auto-detection is attempted.
    #[arg(long)]
    port: Option<String>,

    /// Print one attribute and exit.
    #[arg(long, value_enum)]
    get: Option<Attr>,

    /// Print every known attribute and exit.
    #[arg(long)]
    get_all: bool,

    /// Set the device clock to the host's current time.
    #[arg(long)]
    set_time: bool,

    /// Set the on-device trace verbosity level.
    #[arg(long)]
    set_trace_level: Option<u8>,

    /// List files on the device.
    #[arg(long)]
    list_files: bool,

    /// Download a file by name, showing a progress bar.
    #[arg(long)]
    download_file: Option<String>,

    /// Size in bytes of the file being downloaded (required with --download-file).
    #[arg(long)]
    size: Option<u64>,

    /// Tracing filter directive, e.g. "debug" or "biotel_link=trace".
    #[arg(long, default_value = "tracing=info")]
    log_level: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(cli.log_level.clone()))
        .init();

    let core = match &cli.port {
        Some(port) => LinkBuilder::new()
            .with_serial(port)
            .connect()
            .with_context(|| format!("connecting to {port}"))?,
        None => LinkBuilder::new()
            .with_auto_detect()
            .connect()
            .context("auto-detecting a device")?,
    };
    let facade = DeviceFacade::new(core);

    if cli.get_all {
        print_all_attributes(&facade)?;
        return Ok(());
    }
    if let Some(attr) = cli.get {
        print_attribute(&facade, attr)?;
        return Ok(());
    }
    if cli.set_time {
        facade.set_current_timestamp().context("setting device clock")?;
        println!("device clock updated");
        return Ok(());
    }
    if let Some(level) = cli.set_trace_level {
        facade.set_trace_level(level).context("setting trace level")?;
        println!("trace level set to {level}");
        return Ok(());
    }
    if cli.list_files {
        for file in facade.list_files().context("listing files")? {
            println!("{}\t{} bytes", file.name, file.size);
        }
        return Ok(());
    }
    if let Some(name) = cli.download_file {
        let size = cli
            .size
            .ok_or_else(|| anyhow::anyhow!("--size is required with --download-file"))?;
        let path = download_with_progress(&facade, &name, size)?;
        println!("saved to {}", path.display());
        return Ok(());
    }

    bail!("no command given; see --help");
}

fn print_attribute(facade: &DeviceFacade, attr: Attr) -> Result<()> {
    match attr {
        Attr::SerialNo => println!("{}", facade.get_serial_no()?),
        Attr::Vendor => println!("{}", facade.get_vendor()?),
        Attr::Model => println!("{}", facade.get_model()?),
        Attr::FirmwareVersion => println!("{}", facade.get_firmware_version()?),
        Attr::BluetoothMac => println!("{}", facade.get_bluetooth_mac()?),
        Attr::BatteryLevel => println!("{}", facade.get_battery_level()?),
        Attr::HeartRate => println!("{}", facade.get_heart_rate()?),
        Attr::ChargeState => println!("{}", facade.get_charge_state()?),
        Attr::Temperature => println!("{:.1}", facade.get_temperature()?),
        Attr::CurrentTime => println!("{}", facade.get_current_time()?),
    }
    Ok(())
}

fn print_all_attributes(facade: &DeviceFacade) -> Result<()> {
    println!("serial_no:\t{}", facade.get_serial_no()?);
    println!("vendor:\t\t{}", facade.get_vendor()?);
    println!("model:\t\t{}", facade.get_model()?);
    println!("firmware:\t{}", facade.get_firmware_version()?);
    println!("bluetooth_mac:\t{}", facade.get_bluetooth_mac()?);
    println!("battery:\t{}%", facade.get_battery_level()?);
    println!("heart_rate:\t{} bpm", facade.get_heart_rate()?);
    println!("charging:\t{}", facade.get_charge_state()?);
    println!("temperature:\t{:.1}C", facade.get_temperature()?);
    println!("current_time:\t{}", facade.get_current_time()?);
    Ok(())
}

struct IndicatifProgress(ProgressBar);

impl BulkProgressListener for IndicatifProgress {
    fn on_progress(&self, progress: Progress) {
        self.0.set_length(progress.total_bytes);
        self.0.set_position(progress.bytes_received);
        self.0.set_message(format!("{:.0} KB/s", progress.kbps));
    }

    fn on_complete(&self, _path: &std::path::Path, kbps: f64) {
        self.0.finish_with_message(format!("done, {kbps:.0} KB/s"));
    }

    fn on_failed(&self, err: &biotel_link::Error) {
        self.0.abandon_with_message(format!("failed: {err}"));
    }
}

fn download_with_progress(facade: &DeviceFacade, name: &str, size: u64) -> Result<PathBuf> {
    let bar = ProgressBar::new(size);
    bar.set_style(
        ProgressStyle::with_template("{bar:40.cyan/blue} {bytes}/{total_bytes} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    facade.set_bulk_progress_listener(Arc::new(IndicatifProgress(bar.clone())));
    facade
        .download_file(name, size, DownloadOptions::default())
        .map(|(path, _kbps)| path)
        .context("downloading file")
        .inspect(|_| bar.finish())
}
