//! drivermgr - Main entry point
//!
//! Command-line front end over the driver management session.

use anyhow::{Context, Result};
use drivermgr::cli::{Cli, Commands};
use drivermgr::config::DriverManagerConfig;
use drivermgr::hardware::{DeviceClass, parse_devices};
use drivermgr::process_guard;
use drivermgr::{
    Action, Category, Filter, HardwareProbe, LspciProbe, OperationEvent, OperationState, Package,
    Session,
};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Initialize the logger with appropriate settings
fn init_logger(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    // RUST_LOG overrides the default level
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Main application entry point
fn main() -> Result<()> {
    let cli = Cli::parse_args();

    init_logger(cli.verbose);
    info!("drivermgr starting up");

    // Keep apt children alive through Ctrl+C; exit once they finish
    if let Err(e) = process_guard::init_signal_handlers() {
        warn!("Failed to initialize signal handlers: {}", e);
    }
    debug!("Signal handlers initialized");

    let config = DriverManagerConfig::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Commands::List {
            category,
            recommended,
            json,
        } => run_list(&config, category, recommended, json),
        Commands::Recommend => run_recommend(&config),
        Commands::Install { package } => run_operation(&config, &package, Action::Install),
        Commands::Remove { package } => run_operation(&config, &package, Action::Remove),
        Commands::Status { package } => run_status(&config, &package),
        Commands::Config => {
            let json = serde_json::to_string_pretty(&config)
                .context("Failed to serialize configuration")?;
            println!("{}", json);
            Ok(())
        }
    }
}

/// Exit unless running as root. Mutating commands need it; the engine assumes it.
fn require_root() {
    if !nix::unistd::geteuid().is_root() {
        error!("Mutating command run without root privileges");
        eprintln!("✗ Error: This command requires root privileges.");
        eprintln!("  Please run with sudo.");
        std::process::exit(1);
    }
}

fn run_list(
    config: &DriverManagerConfig,
    category: Option<Category>,
    recommended_only: bool,
    json: bool,
) -> Result<()> {
    let mut session = Session::from_config(config);
    if recommended_only {
        session.set_filter(Filter::RecommendedOnly);
    }

    let categories: Vec<Category> = match category {
        Some(c) => vec![c],
        None => session.catalog().categories().collect(),
    };

    let mut listing: Vec<(Category, Vec<Package>)> = Vec::new();
    for category in categories {
        let packages = session.select_category(category).to_vec();
        if !packages.is_empty() {
            listing.push((category, packages));
        }
    }

    if json {
        let packages: Vec<&Package> = listing.iter().flat_map(|(_, p)| p.iter()).collect();
        let out = serde_json::to_string_pretty(&packages).context("Failed to serialize packages")?;
        println!("{}", out);
        return Ok(());
    }

    if listing.is_empty() {
        println!("No driver packages found.");
    }
    for (category, packages) in &listing {
        println!("{}:", category);
        for package in packages {
            println!("  {}", package.status_label());
        }
    }
    Ok(())
}

fn run_recommend(config: &DriverManagerConfig) -> Result<()> {
    let probe = LspciProbe::new(config);
    match probe.enumerate() {
        Ok(lines) => {
            println!("Detected devices:");
            for device in parse_devices(&lines) {
                if device.device_class != DeviceClass::Unknown {
                    println!("  [{} / {}] {}", device.device_class, device.vendor, device.line);
                }
            }
        }
        Err(e) => eprintln!("✗ Error detecting hardware: {}", e),
    }

    let session = Session::from_config(config);
    println!("Recommended packages:");
    if session.recommended().is_empty() {
        println!("  (none)");
    }
    for name in session.recommended() {
        match session.package(name) {
            Some(package) => println!("  {} [{}]", package.status_label(), package.category),
            None => println!("  {} (not available)", name),
        }
    }
    Ok(())
}

fn run_status(config: &DriverManagerConfig, name: &str) -> Result<()> {
    let mut session = Session::from_config(config);
    let Some(package) = session.package(name) else {
        eprintln!("✗ {} is not a known driver package", name);
        std::process::exit(1);
    };
    let permissions = session.select_package(name)?;

    println!("{}", package.status_label());
    println!("  Category:    {}", package.category);
    println!("  Installed:   {}", if package.installed { "yes" } else { "no" });
    println!("  Recommended: {}", if package.recommended { "yes" } else { "no" });
    let allowed = match (permissions.install, permissions.remove) {
        (true, _) => "install",
        (_, true) => "remove",
        _ => "none",
    };
    println!("  Available action: {}", allowed);
    Ok(())
}

fn run_operation(config: &DriverManagerConfig, name: &str, action: Action) -> Result<()> {
    require_root();

    let mut session = Session::from_config(config);
    let requested = match action {
        Action::Install => session.request_install(name),
        Action::Remove => session.request_remove(name),
    };
    if let Err(rejection) = requested {
        eprintln!("✗ {}", rejection);
        std::process::exit(1);
    }

    session.wait_for_operation(|event| match event {
        OperationEvent::Progress { line, .. } => println!("{}", line),
        OperationEvent::Terminal { .. } => {}
        OperationEvent::CleanupStarted { .. } => println!("Running apt-get autoremove --purge..."),
        OperationEvent::Cleanup { report, .. } => {
            if report.success {
                println!("{}", report.message);
            } else {
                eprintln!("⚠ {}", report.message);
            }
        }
    });

    let Some(operation) = session.current_operation() else {
        anyhow::bail!("No operation was recorded for {}", name);
    };
    let message = operation.message().unwrap_or_default().trim_end();
    match operation.state() {
        OperationState::Succeeded => {
            println!("✓ {}", message);
            Ok(())
        }
        _ => {
            eprintln!("✗ {}", message);
            std::process::exit(1);
        }
    }
}
