//! chunkfs CLI
//!
//! Uploads and downloads files through the coordinator and shows cluster
//! status.

use anyhow::{Context, Result};
use bytes::Bytes;
use chunkfs_client::CoordinatorClient;
use chunkfs_common::now_millis;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "chunkfs-cli")]
#[command(about = "chunkfs command line client")]
#[command(version)]
struct Args {
    /// Coordinator endpoint
    #[arg(short, long, env = "CHUNKFS_ENDPOINT", default_value = "http://127.0.0.1:5000")]
    endpoint: String,

    /// Timeout for status and ping calls, in seconds
    #[arg(long, default_value = "5")]
    timeout: u64,

    /// Log level
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show storage nodes and stored files
    Status,
    /// Upload a file
    Upload {
        /// File to upload
        path: PathBuf,
    },
    /// Download a file by id
    Download {
        /// File id (upload filename without extension)
        file_id: String,
        /// Output path; defaults to the original filename
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Check that the coordinator is up
    Ping,
}

/// Format bytes as a human-readable size string.
fn format_size(bytes: u64) -> String {
    const GIB: u64 = 1024 * 1024 * 1024;
    const MIB: u64 = 1024 * 1024;
    const KIB: u64 = 1024;

    if bytes >= GIB {
        format!("{:.1} GiB", bytes as f64 / GIB as f64)
    } else if bytes >= MIB {
        format!("{:.1} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.1} KiB", bytes as f64 / KIB as f64)
    } else {
        format!("{bytes} B")
    }
}

/// Format a millisecond age as `12s ago` / `3m ago` / `2h ago`
fn format_age(age_ms: u64) -> String {
    let secs = age_ms / 1000;
    if secs < 60 {
        format!("{secs}s ago")
    } else if secs < 3600 {
        format!("{}m ago", secs / 60)
    } else {
        format!("{}h ago", secs / 3600)
    }
}

/// Format a Unix millisecond timestamp in local time
fn format_timestamp(millis: u64) -> String {
    i64::try_from(millis)
        .ok()
        .and_then(chrono::DateTime::from_timestamp_millis)
        .map_or_else(
            || "-".to_string(),
            |t| {
                t.with_timezone(&chrono::Local)
                    .format("%Y-%m-%d %H:%M:%S")
                    .to_string()
            },
        )
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let client = CoordinatorClient::new(args.endpoint.clone(), Duration::from_secs(args.timeout))
        .map_err(|e| anyhow::anyhow!("Failed to create client: {}", e))?;

    match args.command {
        Commands::Ping => {
            let pong = client
                .ping()
                .await
                .with_context(|| format!("coordinator at {} is not reachable", args.endpoint))?;
            println!(
                "{} ({}, clock skew {} ms)",
                pong.status,
                client.base_url(),
                i128::from(pong.time) - i128::from(now_millis())
            );
        }
        Commands::Status => {
            let status = client.status().await?;

            println!("Storage Nodes");
            println!("=============");
            if status.datanodes.is_empty() {
                println!("No storage nodes registered");
            } else {
                println!("{:<24} {:<8} {:<20} {:<12}", "NODE ID", "STATE", "LAST HEARTBEAT", "AGE");
                println!("{}", "-".repeat(66));
                for node in status.datanodes.values() {
                    println!(
                        "{:<24} {:<8} {:<20} {:<12}",
                        node.node_id,
                        node.state.to_string(),
                        format_timestamp(node.last_heartbeat),
                        format_age(node.age_ms)
                    );
                }
            }

            println!();
            println!("Files");
            println!("=====");
            if status.files.is_empty() {
                println!("No files stored");
            } else {
                println!(
                    "{:<24} {:<32} {:>12} {:>7} {:<20}",
                    "FILE ID", "FILENAME", "SIZE", "CHUNKS", "UPLOADED"
                );
                println!("{}", "-".repeat(98));
                for file in status.files.values() {
                    let degraded = file
                        .chunks
                        .iter()
                        .filter(|c| c.committed_count() < c.replicas.len())
                        .count();
                    println!(
                        "{:<24} {:<32} {:>12} {:>7} {:<20}{}",
                        file.file_id.as_str(),
                        file.filename,
                        format_size(file.size_bytes),
                        file.chunks.len(),
                        format_timestamp(file.uploaded_at),
                        if degraded > 0 {
                            format!("  ({degraded} degraded)")
                        } else {
                            String::new()
                        }
                    );
                }
            }
        }
        Commands::Upload { path } => {
            let data = tokio::fs::read(&path)
                .await
                .with_context(|| format!("failed to read {}", path.display()))?;
            let filename = path
                .file_name()
                .and_then(|n| n.to_str())
                .with_context(|| format!("{} has no usable file name", path.display()))?;
            debug!("Uploading {} ({} bytes)", filename, data.len());

            let report = client.upload(filename, Bytes::from(data)).await?;
            println!("{}", report.message);
            println!();
            println!("File ID:   {}", report.file_id);
            println!("Filename:  {}", report.filename);
            println!("Size:      {}", format_size(report.size_bytes));
            println!("Chunks:    {}", report.chunks);
            println!(
                "Replicas:  {} committed, {} failed",
                report.replicas_committed, report.replicas_failed
            );
            if report.degraded_chunks > 0 {
                println!(
                    "Warning: {} chunk(s) are missing at least one replica",
                    report.degraded_chunks
                );
            }
            if report.unreplicated_chunks > 0 {
                println!(
                    "Warning: {} chunk(s) were not stored on any node",
                    report.unreplicated_chunks
                );
            }
            if report.replaced {
                println!("Note: replaced an earlier upload with the same file id");
            }
        }
        Commands::Download { file_id, output } => {
            let file = client.download(&file_id).await?;
            let output = output
                .or_else(|| file.filename.map(PathBuf::from))
                .unwrap_or_else(|| PathBuf::from(&file_id));
            tokio::fs::write(&output, &file.bytes)
                .await
                .with_context(|| format!("failed to write {}", output.display()))?;
            println!(
                "Downloaded {} ({}) to {}",
                file_id,
                format_size(file.bytes.len() as u64),
                output.display()
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KiB");
        assert_eq!(format_size(5_000_000), "4.8 MiB");
    }

    #[test]
    fn test_format_age() {
        assert_eq!(format_age(4_500), "4s ago");
        assert_eq!(format_age(150_000), "2m ago");
        assert_eq!(format_age(7_200_000), "2h ago");
    }

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from(["chunkfs-cli", "download", "report", "-o", "/tmp/r.pdf"])
            .unwrap();
        match args.command {
            Commands::Download { file_id, output } => {
                assert_eq!(file_id, "report");
                assert_eq!(output, Some(PathBuf::from("/tmp/r.pdf")));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
