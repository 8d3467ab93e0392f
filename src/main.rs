use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use bcr_master::{
    bcl,
    bcr::{self, device::for_each_preset, Bcr2000, DeviceHandle, Preset},
    config::{Loader, SavedDevice, Settings},
    detect,
    files::{self, FileKind},
    midi::PortPair,
    transfer::Completion,
    transport::MidiTransport,
};

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Program a Behringer BCR2000 with BCL",
    long_about = "Translates between BCL text and BCR2000 SysEx dumps,\n\
    sends presets to the device and reports the errors it finds."
)]
struct Cli {
    /// More logs, repeat for even more.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors.
    #[arg(short, long, global = true)]
    quiet: bool,

    /// MIDI input port leading to the device.
    #[arg(long, value_name = "PORT", global = true)]
    input: Option<String>,

    /// MIDI output port leading to the device, defaults to the input port name.
    #[arg(long, value_name = "PORT", global = true)]
    output: Option<String>,

    /// Device timeouts for this run, in milliseconds.
    #[arg(long, value_name = "MS", global = true)]
    timeout: Option<u64>,

    /// Use this configuration file.
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the MIDI ports.
    Ports,
    /// Look for a BCR2000 on all the MIDI ports & remember it.
    Detect,
    /// Check the syntax of a BCL file.
    Check { file: PathBuf },
    /// Send a BCL or SysEx file to the device & report its errors.
    Send { file: PathBuf },
    /// Receive a preset from the device.
    Dump {
        /// Preset number 1 to 32, or `edit` for the edit buffer.
        preset: Preset,
        /// Save to this `.bcl` or `.syx` file instead of printing.
        #[arg(short = 'o', long = "to", value_name = "FILE")]
        to: Option<PathBuf>,
    },
    /// List the names of the presets stored in the device.
    Presets,
    /// Convert between `.bcl` and `.syx`.
    Convert {
        source: PathBuf,
        target: PathBuf,
        /// Send canonical statements only, without comments or invalid lines.
        #[arg(long)]
        compact: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.quiet {
        log::LevelFilter::Error
    } else {
        match cli.verbose {
            0 => log::LevelFilter::Info,
            1 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    };
    env_logger::Builder::new().filter_level(level).init();

    if let Err(err) = run(cli) {
        log::error!("Error: {err}");
        for cause in err.chain().skip(1) {
            log::error!("\t{cause}");
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let loader = match &cli.config {
        Some(path) => Loader::with_path(path),
        None => Loader::new()?,
    };
    let mut settings = loader.load_or_create()?;

    if let Some(timeout) = cli.timeout {
        settings.identity_timeout_ms = timeout;
        settings.reply_timeout_ms = timeout;
        settings.dump_timeout_ms = timeout;
        settings.validate();
    }

    match &cli.command {
        Command::Ports => ports(&settings),
        Command::Detect => {
            let detected = detect_device(&settings)?;
            settings.device = Some(SavedDevice::from(&detected.handle));
            loader.save(&settings)
        }
        Command::Check { file } => check(file),
        Command::Send { file } => send(&cli, &settings, file),
        Command::Dump { preset, to } => dump(&cli, &settings, *preset, to.as_deref()),
        Command::Presets => presets(&cli, &settings),
        Command::Convert {
            source,
            target,
            compact,
        } => convert(source, target, *compact),
    }
}

fn ports(settings: &Settings) -> Result<()> {
    let transport = MidiTransport::try_new(&settings.client_name)?;

    println!("Inputs:");
    for port in transport.ins() {
        println!("  {port}");
    }
    println!("Outputs:");
    for port in transport.outs() {
        println!("  {port}");
    }

    Ok(())
}

fn detect_device(settings: &Settings) -> Result<detect::Detected<MidiTransport>> {
    let candidates = detect::midi_candidates(&settings.client_name)?;
    let timeout = Duration::from_millis(settings.identity_timeout_ms);

    let detection = detect::auto_detect(candidates, bcr_master::transfer::new_timer(), timeout);
    for report in &detection.reports {
        println!("{report}");
    }

    Ok(detection.device()?)
}

/// Opens a session with the device designated by the command line,
/// the saved device or found by auto-detection.
fn open_session(cli: &Cli, settings: &Settings) -> Result<Bcr2000<MidiTransport>> {
    let config = settings.session_config();

    if let Some(input) = &cli.input {
        let output = cli.output.as_deref().unwrap_or(input);
        let ports = PortPair::new(input.as_str(), output);
        let transport = detect::connect(&settings.client_name, &ports)?;
        let device_id = settings
            .device
            .as_ref()
            .filter(|saved| saved.to_handle().ports == ports)
            .map_or(bcr::ANY_DEVICE, |saved| saved.device_id);

        return Ok(Bcr2000::new(
            transport,
            DeviceHandle::new(ports, device_id),
            config,
        ));
    }

    if let Some(saved) = &settings.device {
        let handle = saved.to_handle();
        match detect::connect(&settings.client_name, &handle.ports) {
            Ok(transport) => return Ok(Bcr2000::new(transport, handle, config)),
            Err(err) => log::warn!("Saved device unavailable: {err}. Auto-detecting"),
        }
    }

    let detected = detect_device(settings)?;
    Ok(Bcr2000::new(detected.transport, detected.handle, config))
}

fn check(file: &Path) -> Result<()> {
    let text = files::load_document(file)?;
    let parsed = bcl::parse(&text);

    for diagnostic in &parsed.diagnostics {
        println!("{}:{diagnostic}", file.display());
    }

    let blocks = parsed
        .commands
        .iter()
        .filter(|command| matches!(command.kind, bcl::CommandKind::Block(_)))
        .count();
    println!(
        "{} commands ({blocks} blocks, {} statements), {} diagnostics",
        parsed.commands.len(),
        parsed.commands.len() - blocks,
        parsed.diagnostics.len(),
    );

    if !parsed.is_clean() {
        bail!("{} has syntax errors", file.display());
    }

    Ok(())
}

fn send(cli: &Cli, settings: &Settings, file: &Path) -> Result<()> {
    let text = files::load_document(file)?;
    let session = open_session(cli, settings)?;

    let batch = session
        .send_bcl(&text)
        .wait()
        .context("Sending failed")?;

    if batch.completion == Completion::TimedOut {
        log::warn!(
            "Device stopped answering: {} of {} messages answered",
            batch.answered,
            batch.sent,
        );
    }

    if batch.is_empty() {
        println!("No errors");
        return Ok(());
    }

    println!("{:>4} {:>5} {:>4}  {:<26} line", "row", "line", "code", "error");
    for (row, error) in batch.errors.iter().enumerate() {
        println!(
            "{row:>4} {:>5} {:>4}  {:<26} {}",
            error.line_number, error.error_code, error.error_text, error.line_text,
        );
    }

    bail!("Device reported {} errors", batch.len());
}

fn dump(cli: &Cli, settings: &Settings, preset: Preset, output: Option<&Path>) -> Result<()> {
    // Check the output before talking to the device.
    let kind = output.map(FileKind::from_path).transpose()?;

    let session = open_session(cli, settings)?;
    let dump = session
        .request_dump(preset)
        .wait()
        .with_context(|| format!("Receiving {preset} failed"))?;

    match (output, kind) {
        (Some(path), Some(FileKind::Syx)) => files::save_syx(path, dump.messages())?,
        (Some(path), _) => files::save_bcl(path, &dump.to_bcl())?,
        (None, _) => println!("{}", dump.to_bcl()),
    }

    Ok(())
}

fn presets(cli: &Cli, settings: &Settings) -> Result<()> {
    let session = open_session(cli, settings)?;

    for_each_preset(&session, |preset, dump| {
        let name = dump.preset_name().unwrap_or_default();
        println!("{:<10} {name}", preset.to_string());
    })?;

    Ok(())
}

fn convert(input: &Path, output: &Path, compact: bool) -> Result<()> {
    let text = files::load_document(input)?;

    match FileKind::from_path(output)? {
        FileKind::Bcl => files::save_bcl(output, &text)?,
        FileKind::Syx => {
            let encoded = if compact {
                let parsed = bcl::parse(&text);
                for diagnostic in &parsed.diagnostics {
                    log::warn!("{}:{diagnostic}", input.display());
                }
                bcr::encode_commands(&parsed.commands, bcr::ANY_DEVICE)
            } else {
                bcr::encode_verbatim(&text, bcr::ANY_DEVICE)
            };

            for diagnostic in &encoded.diagnostics {
                log::warn!("{}:{diagnostic}", input.display());
            }

            files::save_syx(output, &encoded.messages)?;
        }
    }

    Ok(())
}
