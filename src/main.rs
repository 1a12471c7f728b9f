use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use printcam::{CapabilitySet, PrintcamConfig, PrintcamOrchestrator};

#[derive(Parser, Debug)]
#[command(name = "printcam")]
#[command(about = "Embedded media streaming server for networked 3D printers")]
#[command(version)]
#[command(
    long_about = "Captures frames from a USB camera and the printer's framebuffer, \
transcodes them through the hardware codec layer, and serves multipart-JPEG and \
FLV/H.264 streams to HTTP clients with bounded latency and memory."
)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        default_value = "printcam.toml",
        help = "Path to TOML configuration file"
    )]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(
        long,
        help = "Validate configuration file and exit without starting the system"
    )]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Dry run mode - initialize but don't start components
    #[arg(
        long,
        help = "Perform dry run - initialize components but don't start them"
    )]
    dry_run: bool,

    /// Drive the pipeline from synthetic sources (no hardware required)
    #[arg(
        long,
        help = "Use synthetic camera/codec capabilities for bench and debug runs"
    )]
    synthetic: bool,

    /// Override log format (json, pretty, compact)
    #[arg(
        long,
        value_name = "FORMAT",
        help = "Log output format: json, pretty, or compact"
    )]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config();
        return Ok(());
    }

    init_logging(&args)?;

    info!("Starting printcam v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = match PrintcamConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        eprintln!("Configuration validation failed: {}", e);
        std::process::exit(1);
    }

    if args.validate_config {
        println!("Configuration is valid");
        return Ok(());
    }

    let caps = if args.synthetic {
        info!("Running with synthetic capture and codec capabilities");
        CapabilitySet::synthetic(&config)
    } else {
        match CapabilitySet::probe(&config) {
            Ok(caps) => caps,
            Err(e) => {
                error!("Hardware initialization failed: {}", e);
                std::process::exit(1);
            }
        }
    };

    let orchestrator = match PrintcamOrchestrator::new(config, caps).await {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            error!("Failed to initialize system: {}", e);
            std::process::exit(1);
        }
    };

    if args.dry_run {
        info!("Dry run complete - all components initialized");
        println!("Dry run completed successfully");
        return Ok(());
    }

    let exit_code = match orchestrator.run().await {
        Ok(code) => code,
        Err(e) => {
            error!("System error during execution: {}", e);
            1
        }
    };

    info!("printcam exited with code {}", exit_code);
    std::process::exit(exit_code);
}

fn init_logging(args: &Args) -> Result<()> {
    use tracing_subscriber::{
        fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
    };

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("printcam={}", log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .boxed(),
        Some("pretty") => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer().with_target(true).boxed()
        }
        None => fmt::layer()
            .with_target(true)
            .with_thread_ids(args.debug)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();

    Ok(())
}

/// Print default configuration in TOML format
fn print_default_config() {
    println!("# Printcam Configuration File");
    println!("# These are the built-in defaults; override in TOML or env vars");
    println!();

    let default_config = PrintcamConfig::default();
    match toml::to_string_pretty(&default_config) {
        Ok(toml_str) => println!("{}", toml_str),
        Err(e) => eprintln!("Failed to render default config: {}", e),
    }
}
