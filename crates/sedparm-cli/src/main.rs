use clap::Parser;
use sedparm::{
    DriveInfo, FactoryOptions, SanitizeOperation, SanitizeOptions, SanitizeSupport, SmartHealth,
    SystemFactory, TcgSupport,
};

#[derive(Debug, Parser)]
#[command(name = "sedparm", about = "Privileged drive management: identity, sanitize, TCG Opal")]
struct Args {
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, clap::Subcommand)]
enum Command {
    /// List physical drives.
    List,
    /// Show one drive in detail.
    Info { device: String },
    /// Show mounted volumes, optionally filtered to one drive.
    Volumes {
        #[arg(long)]
        device: Option<String>,
    },
    /// Start a sanitize operation.
    Sanitize(SanitizeArgs),
    /// Poll sanitize progress.
    SanitizeStatus { device: String },
    /// Factory-revert a self-encrypting drive. Destroys all data.
    Revert(RevertArgs),
    /// Print the drive's factory default credential (MSID).
    Msid { device: String },
}

#[derive(Debug, clap::Args)]
struct SanitizeArgs {
    device: String,
    #[arg(long, value_parser = ["crypto", "block", "overwrite"])]
    method: String,
    /// Overwrite passes (1-15).
    #[arg(long, default_value_t = 1)]
    passes: u8,
    /// Overwrite pattern as hex, e.g. DEADBEEF.
    #[arg(long, default_value = "0")]
    pattern: String,
    #[arg(long)]
    no_deallocate: bool,
    /// Required: sanitizing destroys the drive's data.
    #[arg(long)]
    yes: bool,
}

#[derive(Debug, clap::Args)]
struct RevertArgs {
    device: String,
    /// The PSID printed on the drive label.
    #[arg(long, conflicts_with = "sid")]
    psid: Option<String>,
    /// The SID credential (owner password).
    #[arg(long)]
    sid: Option<String>,
    /// Required: reverting destroys the drive's data.
    #[arg(long)]
    yes: bool,
}

fn main() {
    let args = Args::parse();
    simple_logger::SimpleLogger::new()
        .with_level(if args.verbose {
            log::LevelFilter::Trace
        } else {
            log::LevelFilter::Warn
        })
        .init()
        .unwrap();

    let factory = SystemFactory::new(FactoryOptions::default());
    let code = match args.cmd {
        Command::List => list(&factory),
        Command::Info { device } => info(&factory, &device),
        Command::Volumes { device } => volumes(&factory, device.as_deref()),
        Command::Sanitize(args) => sanitize(&factory, &args),
        Command::SanitizeStatus { device } => sanitize_status(&factory, &device),
        Command::Revert(args) => revert(&factory, &args),
        Command::Msid { device } => msid(&factory, &device),
    };
    std::process::exit(code);
}

fn support_str(s: SanitizeSupport) -> &'static str {
    match s {
        SanitizeSupport::Unsupported => "no",
        SanitizeSupport::Supported => "yes",
        SanitizeSupport::SupportedRequiresUnfreeze => "yes (requires unfreeze)",
    }
}

fn describe(info: &DriveInfo) {
    println!("{}", info.device_path);
    if let Some(err) = info.open_error {
        println!("  open failed: {err}");
        return;
    }
    println!("  model:    {}", info.model);
    println!("  serial:   {}", info.serial);
    println!("  firmware: {}", info.firmware_revision);
    println!(
        "  capacity: {} bytes, {}",
        info.total_capacity,
        if info.is_ssd { "ssd" } else { "rotational" }
    );
    println!(
        "  sanitize: crypto={} block={} overwrite={}",
        support_str(info.sanitize_crypto_erase),
        support_str(info.sanitize_block_erase),
        support_str(info.sanitize_overwrite),
    );
    match info.tcg.support {
        TcgSupport::Undetermined => println!("  tcg:      undetermined"),
        TcgSupport::Unsupported => println!("  tcg:      not supported"),
        TcgSupport::Supported => {
            println!(
                "  tcg:      tper={} locking={} opal1={} opal2={} enterprise={}",
                info.tcg.tper,
                info.tcg.locking,
                info.tcg.opal_v100,
                info.tcg.opal_v200,
                info.tcg.enterprise
            );
        }
    }
}

fn list(factory: &SystemFactory) -> i32 {
    match factory.enumerate_drives() {
        Ok(drives) => {
            for drive in &drives {
                describe(drive);
            }
            0
        }
        Err(err) => {
            eprintln!("enumeration failed: {err}");
            1
        }
    }
}

fn info(factory: &SystemFactory, device: &str) -> i32 {
    let mut drive = factory.open(device);
    describe(drive.info());
    if drive.is_open() {
        match drive.read_ata_smart_status() {
            Ok(SmartHealth::Ok) => println!("  smart:    ok"),
            Ok(SmartHealth::ThresholdExceeded) => println!("  smart:    THRESHOLD EXCEEDED"),
            Err(_) => {}
        }
        if let Ok(log) = drive.read_nvme_smart_log() {
            println!(
                "  smart:    temp={}K spare={}% power-on={}h",
                log.composite_temperature(),
                log.available_spare(),
                log.power_on_hours()
            );
        }
    }
    if drive.is_open() { 0 } else { 1 }
}

fn volumes(factory: &SystemFactory, device: Option<&str>) -> i32 {
    let volumes = match factory.enumerate_volumes() {
        Ok(volumes) => volumes,
        Err(err) => {
            eprintln!("volume enumeration failed: {err}");
            return 1;
        }
    };
    let selected = match device {
        Some(device) => {
            let drive = factory.open(device);
            factory.volumes_for_drive(drive.info(), &volumes)
        }
        None => volumes,
    };
    for volume in &selected {
        println!(
            "{} [{}] {}",
            volume.device_path,
            volume.filesystem,
            volume.mount_points.join(", ")
        );
    }
    0
}

fn sanitize(factory: &SystemFactory, args: &SanitizeArgs) -> i32 {
    if !args.yes {
        eprintln!("refusing to sanitize without --yes");
        return 2;
    }
    let operation = match args.method.as_str() {
        "crypto" => SanitizeOperation::CryptoScramble,
        "block" => SanitizeOperation::BlockErase,
        _ => SanitizeOperation::Overwrite,
    };
    let pattern = match u32::from_str_radix(args.pattern.trim_start_matches("0x"), 16) {
        Ok(pattern) => pattern,
        Err(_) => {
            eprintln!("bad overwrite pattern: {}", args.pattern);
            return 2;
        }
    };
    let mut options = SanitizeOptions::new(operation);
    options.overwrite_pass = args.passes;
    options.overwrite_pattern = pattern;
    options.no_deallocate = args.no_deallocate;

    let mut drive = factory.open(&args.device);
    match drive.sanitize(&options) {
        Ok(_) => {
            println!("sanitize started");
            0
        }
        Err(err) => {
            eprintln!("sanitize failed: {err}");
            1
        }
    }
}

fn sanitize_status(factory: &SystemFactory, device: &str) -> i32 {
    let mut drive = factory.open(device);
    match drive.sanitize(&SanitizeOptions::new(SanitizeOperation::Status)) {
        Ok(status) => {
            match status.progress {
                Some(progress) => println!(
                    "state: {:?}, progress {:.1}%",
                    status.states,
                    progress * 100.0
                ),
                None => println!("state: {:?}", status.states),
            }
            if let Ok(estimates) = drive.sanitize_estimates() {
                log::debug!("estimates: {estimates:?}");
            }
            0
        }
        Err(err) => {
            eprintln!("status read failed: {err}");
            1
        }
    }
}

fn revert(factory: &SystemFactory, args: &RevertArgs) -> i32 {
    if !args.yes {
        eprintln!("refusing to revert without --yes");
        return 2;
    }
    let (credential, is_psid) = match (&args.psid, &args.sid) {
        (Some(psid), _) => (psid.as_str(), true),
        (None, Some(sid)) => (sid.as_str(), false),
        (None, None) => {
            eprintln!("either --psid or --sid is required");
            return 2;
        }
    };

    let mut drive = factory.open(&args.device);
    let mut tcg = match drive.tcg_device() {
        Ok(tcg) => tcg,
        Err(err) => {
            eprintln!("no TCG device: {err}");
            return 1;
        }
    };
    match tcg.revert_tper(credential, is_psid, false) {
        Ok(()) => {
            println!("revert completed; all data destroyed");
            0
        }
        Err(err) => {
            eprintln!("revert failed: {err}");
            1
        }
    }
}

fn msid(factory: &SystemFactory, device: &str) -> i32 {
    let mut drive = factory.open(device);
    let mut tcg = match drive.tcg_device() {
        Ok(tcg) => tcg,
        Err(err) => {
            eprintln!("no TCG device: {err}");
            return 1;
        }
    };
    match tcg.default_password() {
        Ok(msid) => {
            println!("{}", String::from_utf8_lossy(&msid));
            0
        }
        Err(err) => {
            eprintln!("MSID read failed: {err}");
            1
        }
    }
}
