use anyhow::{bail, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use oblivion_erase::backend::{DeviceCommands, SystemCommands};
use oblivion_erase::config::Settings;
use oblivion_erase::orchestrator::{
    self, describe_erase_support, OperationReport, Orchestrator,
};
use oblivion_erase::{
    ConfirmationToken, EraseMethod, EraseRequest, MethodParams, NvmFormatOptions,
    OverwritePattern, ProgressMode, RequestedMethod, UtilExitCode,
};
use std::path::Path;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "oblivion")]
#[command(about = "Storage device erase utility with capability-based method selection")]
#[command(version = "1.0.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Skip the root privilege check (DANGEROUS!)
    #[arg(long, global = true)]
    unsafe_mode: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List block devices
    List {
        /// Also probe and show erase capabilities per device
        #[arg(short, long)]
        detailed: bool,
    },

    /// Erase one or more devices
    Erase {
        /// Device paths (e.g. /dev/sda), erased strictly in order
        #[arg(required = true)]
        devices: Vec<String>,

        /// Erase method, or "fastest" to take the best supported one
        #[arg(short, long, default_value = "fastest")]
        method: String,

        /// Confirmation token acknowledging the destructive effect
        #[arg(long)]
        confirm: Option<String>,

        /// Start the operation and return instead of waiting for completion
        #[arg(long)]
        poll: bool,

        /// Overwrite pass count
        #[arg(long)]
        passes: Option<u32>,

        /// Overwrite fill pattern
        #[arg(long, value_enum, default_value = "zeros")]
        pattern: PatternArg,

        /// First LBA to erase (range-capable methods only)
        #[arg(long)]
        start_lba: Option<u64>,

        /// Number of LBAs to erase; 0 means through the last LBA
        #[arg(long)]
        lba_range: Option<u64>,

        /// Overwrite for a fixed duration (e.g. "90s", "10m") instead of a range
        #[arg(long)]
        duration: Option<String>,

        /// 32-character PSID from the drive label (tcg-revert-sp)
        #[arg(long)]
        psid: Option<String>,

        /// SID credential (tcg-revert); the MSID is used when omitted
        #[arg(long)]
        sid: Option<String>,

        /// ATA security password; a fixed default is used when omitted
        #[arg(long)]
        ata_password: Option<String>,

        /// NVM format protection type (0-3)
        #[arg(long)]
        protection_type: Option<u8>,

        /// Place protection information first in the metadata
        #[arg(long)]
        pi_first: bool,

        /// Transfer metadata as part of an extended LBA
        #[arg(long)]
        extended_metadata: bool,

        /// Fast format path: unmount, lock and count down before formatting
        #[arg(long)]
        fast_format: bool,

        /// Restore the factory max LBA before erasing
        #[arg(long)]
        restore_max_lba: bool,
    },

    /// Show the erase methods a device supports, fastest first
    ShowSupport {
        /// Device path
        device: String,

        /// Machine-readable JSON output
        #[arg(long)]
        json: bool,
    },

    /// Drop the OS view of a device's contents after an out-of-band erase
    RefreshFsCache {
        /// Device path
        device: String,
    },

    /// Toggle the ATA Write-Read-Verify feature
    WriteReadVerify {
        /// Device path
        device: String,

        /// Disable the feature instead of enabling it
        #[arg(long)]
        disable: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PatternArg {
    Zeros,
    Ones,
    Random,
}

impl From<PatternArg> for OverwritePattern {
    fn from(arg: PatternArg) -> Self {
        match arg {
            PatternArg::Zeros => OverwritePattern::Zeros,
            PatternArg::Ones => OverwritePattern::Ones,
            PatternArg::Random => OverwritePattern::Random,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_signal_handlers()?;

    if cli.debug {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        env_logger::init();
    }

    let settings = Settings::load()?;
    if !settings.color {
        colored::control::set_override(false);
    }

    if !cli.unsafe_mode && !is_root() {
        eprintln!("{}", "Error: this program requires root privileges.".red());
        eprintln!("Please run with sudo or as root.");
        std::process::exit(UtilExitCode::NeedsElevatedPrivileges as i32);
    }

    let code = match cli.command {
        Commands::List { detailed } => list_devices(detailed)?,
        Commands::Erase {
            devices,
            method,
            confirm,
            poll,
            passes,
            pattern,
            start_lba,
            lba_range,
            duration,
            psid,
            sid,
            ata_password,
            protection_type,
            pi_first,
            extended_metadata,
            fast_format,
            restore_max_lba,
        } => {
            for device in &devices {
                check_device_path(device);
            }
            let request = build_request(
                &settings,
                &method,
                confirm.as_deref(),
                poll,
                MethodParams {
                    overwrite_passes: passes.or(Some(settings.overwrite_passes)),
                    overwrite_pattern: pattern.into(),
                    start_lba,
                    lba_range,
                    overwrite_duration: duration
                        .as_deref()
                        .map(parse_duration)
                        .transpose()?,
                    psid,
                    sid,
                    ata_password: ata_password.map(|p| p.into_bytes()),
                    nvm_options: NvmFormatOptions {
                        protection_type,
                        protection_location_first: pi_first.then_some(true),
                        metadata_extended: extended_metadata.then_some(true),
                    },
                    fast_format,
                    restore_max_lba,
                },
            )?;
            erase_devices(&devices, request).await?
        }
        Commands::ShowSupport { device, json } => {
            check_device_path(&device);
            show_support(&device, json)?
        }
        Commands::RefreshFsCache { device } => {
            check_device_path(&device);
            refresh_cache(&device)?
        }
        Commands::WriteReadVerify { device, disable } => {
            check_device_path(&device);
            let backend = SystemCommands::new();
            let (_, code) = orchestrator::set_write_read_verify(&backend, &device, !disable)?;
            code
        }
    };

    std::process::exit(code as i32);
}

fn build_request(
    settings: &Settings,
    method: &str,
    confirm: Option<&str>,
    poll: bool,
    params: MethodParams,
) -> Result<EraseRequest> {
    let requested = if method == "fastest" {
        RequestedMethod::Fastest
    } else {
        match EraseMethod::from_cli_name(method) {
            Some(m) => RequestedMethod::Explicit(m),
            None => bail!(
                "unknown method '{}'; valid methods: fastest, {}",
                method,
                EraseMethod::ALL
                    .iter()
                    .map(|m| m.cli_name())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }
    };

    let token = match confirm {
        None => ConfirmationToken::None,
        Some(literal) => match ConfirmationToken::from_literal(literal) {
            Some(token) => token,
            // An unknown literal is a command-line mistake, not a weaker
            // confirmation level.
            None => bail!("unrecognized confirmation token '{}'", literal),
        },
    };

    let mut request = EraseRequest::new(requested, token);
    request.params = params;
    request.mode = if poll {
        ProgressMode::PollForProgress
    } else {
        settings.progress_mode.into()
    };
    Ok(request)
}

async fn erase_devices(devices: &[String], request: EraseRequest) -> Result<UtilExitCode> {
    let blocking = request.mode == ProgressMode::Blocking;
    let backend = SystemCommands::new();
    let orchestrator = Orchestrator::new(&backend, request);

    let spinner = if blocking {
        let bar = ProgressBar::new_spinner();
        bar.set_style(ProgressStyle::with_template("{spinner} {msg}")?);
        bar.set_message("erasing...");
        bar.enable_steady_tick(Duration::from_millis(120));
        Some(bar)
    } else {
        None
    };

    let reports = orchestrator.run_all(devices).await;
    if let Some(bar) = spinner {
        bar.finish_and_clear();
    }

    for report in &reports {
        print_report(report);
    }

    // Multi-device invocations report the first non-success code.
    Ok(reports
        .iter()
        .map(OperationReport::exit_code)
        .find(|c| *c != UtilExitCode::Success)
        .unwrap_or(UtilExitCode::Success))
}

fn print_report(report: &OperationReport) {
    match (&report.error, report.outcome) {
        (Some(error), _) => {
            eprintln!("{} {}: {}", "✗".red(), report.device_path, error);
        }
        (None, Some(outcome)) => {
            let code = UtilExitCode::from_outcome(outcome);
            let mark = if code == UtilExitCode::Success {
                "✓".green()
            } else {
                "✗".red()
            };
            println!(
                "{} {}: {:?} ({})",
                mark,
                report.device_path,
                outcome,
                report
                    .selected_method
                    .map(|m| m.cli_name())
                    .unwrap_or("no method")
            );
        }
        (None, None) => {
            eprintln!("{} {}: no outcome recorded", "✗".red(), report.device_path);
        }
    }
    for advisory in &report.advisories {
        println!("  {}", advisory.yellow());
    }
}

fn list_devices(detailed: bool) -> Result<UtilExitCode> {
    let backend = SystemCommands::new();
    let mut found = false;

    for entry in std::fs::read_dir("/sys/block")? {
        let name = entry?.file_name();
        let name = name.to_string_lossy();
        if !(name.starts_with("sd") || name.starts_with("nvme") || name.starts_with("vd")) {
            continue;
        }
        found = true;
        let path = format!("/dev/{}", name);
        match backend.open_device(&path) {
            Ok(mut device) => {
                println!(
                    "{}  {}  serial {}  {} blocks of {} bytes",
                    device.path.bold(),
                    device.model,
                    device.serial,
                    device.max_lba + 1,
                    device.block_size
                );
                if detailed {
                    let snapshot = oblivion_erase::capability::probe(&backend, &device);
                    print_support(&snapshot);
                }
                backend.close_device(&mut device);
            }
            Err(e) => println!("{}  unavailable: {}", path.bold(), e),
        }
    }

    if !found {
        println!("No block devices found.");
    }
    Ok(UtilExitCode::Success)
}

fn show_support(device: &str, json: bool) -> Result<UtilExitCode> {
    let backend = SystemCommands::new();
    let snapshot = describe_erase_support(&backend, device)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        println!("{}", device.bold());
        print_support(&snapshot);
    }
    Ok(UtilExitCode::Success)
}

fn print_support(snapshot: &oblivion_erase::capability::CapabilitySnapshot) {
    if snapshot.supported_in_priority_order.is_empty() {
        println!("  no supported erase methods");
    }
    for (i, method) in snapshot.supported_in_priority_order.iter().enumerate() {
        if i == 0 {
            println!("  {} {}", method.cli_name().green(), "(fastest)".dimmed());
        } else {
            println!("  {}", method.cli_name().green());
        }
    }
    for method in &snapshot.unsupported {
        println!("  {} {}", method.cli_name().dimmed(), "(unsupported)".dimmed());
    }
    if let Some(estimate) = snapshot.estimated_overwrite_time {
        println!(
            "  full overwrite estimate: {}",
            humantime::format_duration(estimate)
        );
    }
}

fn refresh_cache(device: &str) -> Result<UtilExitCode> {
    let backend = SystemCommands::new();
    let report = orchestrator::refresh_filesystem_cache(&backend, device)?;
    if report.cache_refreshed {
        println!("{}: filesystem cache refreshed", device);
    }
    for advisory in &report.advisories {
        println!("  {}", advisory.yellow());
    }
    Ok(UtilExitCode::Success)
}

/// Reject device arguments that do not name an absolute /dev node. A
/// relative or traversing path could resolve to a different device than
/// the operator inspected.
fn check_device_path(path: &str) {
    let p = Path::new(path);
    if !p.is_absolute() || path.contains("..") || !path.starts_with("/dev/") {
        eprintln!(
            "{} '{}' is not an absolute /dev path",
            "Error:".red(),
            path
        );
        std::process::exit(UtilExitCode::InsecureFilePath as i32);
    }
}

fn parse_duration(s: &str) -> Result<Duration> {
    Ok(humantime::parse_duration(s)?)
}

fn is_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

fn setup_signal_handlers() -> Result<()> {
    use signal_hook::{consts::SIGINT, iterator::Signals};

    let mut signals = Signals::new([SIGINT])?;

    std::thread::spawn(move || {
        for sig in signals.forever() {
            if sig == SIGINT {
                eprintln!("\nInterrupt received, stopping after the current step...");
                oblivion_erase::set_interrupted();
            }
        }
    });

    Ok(())
}
