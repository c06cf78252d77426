//! CLI entry point for the HLS packager
//!
//! Parses command line arguments, loads configuration, checks the external
//! tools and packages every video in the input directory.

use clap::Parser;
use hls_packager::config::Config;
use hls_packager::{run_preflight, AssetReport, Ffmpeg, Ffprobe, Packager};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

/// HLS Packager - adaptive-bitrate HLS packages from a folder of videos
#[derive(Parser, Debug)]
#[command(name = "hls-packager")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (config.toml). Defaults plus
    /// environment overrides are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory holding the source videos
    #[arg(short, long, default_value = "./input")]
    input: PathBuf,

    /// Directory receiving one folder per asset
    #[arg(short, long, default_value = "./output")]
    output: PathBuf,

    /// Skip preflight checks (ffmpeg/ffprobe availability and version)
    #[arg(long, default_value = "false")]
    skip_checks: bool,

    /// Print the asset reports as JSON on stdout
    #[arg(long, default_value = "false")]
    json: bool,

    /// Debug logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    // RUST_LOG wins over the flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if verbose {
            "hls_packager=debug,hls_packager_cli=debug".to_string()
        } else {
            "hls_packager=info,hls_packager_cli=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_summary(reports: &[AssetReport]) {
    for report in reports {
        let renditions = report
            .renditions
            .iter()
            .map(|r| match r.bandwidth_bytes {
                Some(bw) => format!("{}={}", r.resolution, bw),
                None => format!("{}=failed", r.resolution),
            })
            .collect::<Vec<_>>()
            .join(" ");

        if report.is_success() {
            println!("OK    {} [{}]", report.asset, renditions);
        } else {
            println!(
                "FAIL  {} [{}]: {}",
                report.asset,
                renditions,
                report.error.as_deref().unwrap_or("unknown error")
            );
        }
    }

    let packaged = reports.iter().filter(|r| r.is_success()).count();
    println!("{}/{} assets packaged", packaged, reports.len());
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = match &args.config {
        Some(path) => Config::load(path),
        None => Config::from_env(),
    };
    let config = match config {
        Ok(config) => Arc::new(config),
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if args.skip_checks {
        tracing::warn!("skipping preflight checks (--skip-checks enabled)");
    } else {
        match run_preflight(&config) {
            Ok(versions) => tracing::info!(
                ffmpeg = %versions.ffmpeg,
                ffprobe = %versions.ffprobe,
                "preflight passed"
            ),
            Err(e) => {
                eprintln!("Preflight check failed: {}", e);
                return ExitCode::FAILURE;
            }
        }
    }

    let packager = Packager::new(
        Ffprobe::new(&config.runtime.ffprobe),
        Ffmpeg::new(&config.runtime.ffmpeg),
        Arc::clone(&config),
    );

    tracing::info!(
        input = %args.input.display(),
        output = %args.output.display(),
        renditions = config.renditions.len(),
        "packaging"
    );

    let reports = match packager.run(&args.input, &args.output).await {
        Ok(reports) => reports,
        Err(e) => {
            eprintln!("Packaging failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if args.json {
        match serde_json::to_string_pretty(&reports) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Failed to serialize reports: {}", e);
                return ExitCode::FAILURE;
            }
        }
    } else {
        print_summary(&reports);
    }

    if reports.iter().all(AssetReport::is_success) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
