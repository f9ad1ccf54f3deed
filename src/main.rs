mod args;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use futures::future::join_all;

use sftp_bridge::config::paths;
use sftp_bridge::transfer::LoggingHandler;
use sftp_bridge::{BridgeConfig, PollOutcome, SftpBridge};

use args::{Args, Command};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    let log_dir = match &args.log_dir {
        Some(dir) => std::fs::create_dir_all(dir).ok().map(|_| dir.clone()),
        None => paths::ensure_log_dir().ok(),
    };
    let _guard = sftp_bridge::logging::init_logging(log_dir.clone(), args.verbose);
    if let Some(dir) = &log_dir {
        tracing::debug!("Logging to {}", dir.display());
    }

    let config = match &args.config {
        Some(path) => BridgeConfig::load_from(path),
        None => BridgeConfig::load(),
    }
    .context("Failed to load configuration")?;

    let bridge = SftpBridge::new(&config).context("Failed to set up bridge")?;
    tracing::info!(?bridge, "Bridge ready");

    match args.command {
        Command::Run => run(bridge).await,
        Command::Upload { files } => upload(&bridge, files).await,
        Command::Poll => poll(bridge).await,
    }
}

async fn run(bridge: SftpBridge) -> anyhow::Result<ExitCode> {
    bridge.add_handler(Arc::new(LoggingHandler));
    bridge.start();

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    tracing::info!("Shutting down");

    bridge.stop().await;
    Ok(ExitCode::SUCCESS)
}

async fn upload(bridge: &SftpBridge, files: Vec<std::path::PathBuf>) -> anyhow::Result<ExitCode> {
    let results = join_all(files.iter().map(|file| bridge.upload(file))).await;

    let mut failed = 0;
    for (file, result) in files.iter().zip(results) {
        match result {
            Ok(record) => println!(
                "{} -> {} ({} bytes)",
                file.display(),
                record.remote_path,
                record.size
            ),
            Err(e) => {
                tracing::error!(file = %file.display(), "Upload failed: {}", e);
                eprintln!("{}: {}", file.display(), e);
                failed += 1;
            }
        }
    }

    bridge.stop().await;
    Ok(if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn poll(bridge: SftpBridge) -> anyhow::Result<ExitCode> {
    bridge.add_handler(Arc::new(LoggingHandler));
    let outcome = bridge.poll_now().await.context("Polling failed")?;
    bridge.stop().await;

    if let PollOutcome::Completed(report) = outcome {
        println!(
            "downloaded {}, skipped {}, filtered {}, failed {}",
            report.downloaded, report.skipped_seen, report.filtered_out, report.failed
        );
        if report.failed > 0 {
            return Ok(ExitCode::FAILURE);
        }
    }
    Ok(ExitCode::SUCCESS)
}
