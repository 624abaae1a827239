//! layerfs - pull an image and assemble a runtime bundle
//!
//! ## Usage
//!
//! ```sh
//! layerfs create [--store DIR] [--insecure] [--platform OS/ARCH] <image-location> <id>
//! layerfs version
//! layerfs help
//! ```
//!
//! The bundle's runtime spec is printed as JSON on stdout. Logs go to
//! stderr and are controlled by `RUST_LOG` (default `warn`).

use layerfs::constants::{IMAGE_PULL_TIMEOUT, OCI_RUNTIME_SPEC_VERSION, STORE_ENV_VAR};
use layerfs::{CopyDriver, Platform, Puller, SourceContext};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

// =============================================================================
// Constants
// =============================================================================

/// Returns the store used when neither `--store` nor the environment set one.
fn default_store() -> PathBuf {
    if let Some(store) = std::env::var_os(STORE_ENV_VAR).filter(|s| !s.is_empty()) {
        return PathBuf::from(store);
    }
    dirs::home_dir()
        .map(|h| h.join(".layerfs").join("store"))
        .unwrap_or_else(|| PathBuf::from(".layerfs/store"))
}

// =============================================================================
// CLI Parsing
// =============================================================================

#[derive(Debug)]
enum Command {
    Create {
        image: String,
        id: String,
        store: Option<PathBuf>,
        insecure: bool,
        platform: Option<Platform>,
    },
    Version,
    Help,
}

fn parse_args() -> Result<Command, String> {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        return Ok(Command::Help);
    }

    match args[1].as_str() {
        "create" => {
            let mut store = None;
            let mut insecure = false;
            let mut platform = None;
            let mut positional = Vec::new();
            let mut i = 2;
            while i < args.len() {
                match args[i].as_str() {
                    "--store" | "-s" => {
                        let value = args.get(i + 1).ok_or("--store requires a path")?;
                        store = Some(PathBuf::from(value));
                        i += 2;
                    }
                    "--platform" | "-p" => {
                        let value = args.get(i + 1).ok_or("--platform requires OS/ARCH")?;
                        platform = Some(value.parse::<Platform>().map_err(|e| e.to_string())?);
                        i += 2;
                    }
                    "--insecure" => {
                        insecure = true;
                        i += 1;
                    }
                    flag if flag.starts_with("--") => {
                        return Err(format!("unknown option: {}", flag));
                    }
                    value => {
                        positional.push(value.to_string());
                        i += 1;
                    }
                }
            }

            let [image, id]: [String; 2] = positional
                .try_into()
                .map_err(|_| "create requires <image-location> <id>".to_string())?;

            Ok(Command::Create {
                image,
                id,
                store,
                insecure,
                platform,
            })
        }
        "version" | "--version" | "-v" => Ok(Command::Version),
        "help" | "--help" | "-h" => Ok(Command::Help),
        unknown => Err(format!("unknown command: {}", unknown)),
    }
}

// =============================================================================
// Commands
// =============================================================================

fn cmd_create(
    image: String,
    id: String,
    store: Option<PathBuf>,
    insecure: bool,
    platform: Option<Platform>,
) -> Result<(), String> {
    let store = store.unwrap_or_else(default_store);
    let driver = CopyDriver::new(store).map_err(|e| e.to_string())?;

    let context = SourceContext {
        insecure_skip_tls_verify: insecure,
        platform: platform.unwrap_or_else(Platform::detect),
        timeout: IMAGE_PULL_TIMEOUT,
    };

    let puller = Puller::new(driver, context);
    let spec = puller
        .pull_location(&image, &id)
        .map_err(|e| e.to_string())?;

    let json = serde_json::to_string_pretty(&spec).map_err(|e| e.to_string())?;
    println!("{}", json);
    Ok(())
}

fn cmd_version() {
    println!("layerfs version {}", env!("CARGO_PKG_VERSION"));
    println!("spec: {}", OCI_RUNTIME_SPEC_VERSION);
}

fn cmd_help() {
    println!(
        r#"layerfs - pull container images into runtime bundles

USAGE:
    layerfs <command> [options]

COMMANDS:
    create <image-location> <id>  Pull an image and build bundle <id>
    version                       Show version info
    help                          Show this help

OPTIONS:
    --store, -s <dir>         Layer and bundle store (default: ${store_var} or ~/.layerfs/store)
    --platform, -p <os/arch>  Platform to select from multi-platform images
    --insecure                Accept invalid registry TLS certificates

LOCATIONS:
    docker://[host[:port]]/name[:tag|@digest]
    oci:///path/to/layout[:tag]

EXAMPLES:
    layerfs create docker:///busybox:latest box
    layerfs create docker://localhost:5000/app:1.0 app --insecure
    layerfs create oci:///var/images/alpine:3.19 alpine --store ./store
"#,
        store_var = STORE_ENV_VAR
    );
}

// =============================================================================
// Main
// =============================================================================

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    init_logging();

    match parse_args() {
        Ok(cmd) => {
            let result = match cmd {
                Command::Create {
                    image,
                    id,
                    store,
                    insecure,
                    platform,
                } => cmd_create(image, id, store, insecure, platform),
                Command::Version => {
                    cmd_version();
                    Ok(())
                }
                Command::Help => {
                    cmd_help();
                    Ok(())
                }
            };

            match result {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    eprintln!("error: {}", e);
                    ExitCode::FAILURE
                }
            }
        }
        Err(e) => {
            eprintln!("error: {}", e);
            cmd_help();
            ExitCode::FAILURE
        }
    }
}
