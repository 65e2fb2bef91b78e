//! `read` and `size` — talk to the file service directly.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use tokio_util::sync::CancellationToken;

use fileops_client::{run_transfer, FileOpsClient, TransferRequest};
use fileops_core::config::ClientConfig;
use fileops_core::latency::TransferReport;
use fileops_core::wire::CodecId;
use fileops_core::TracingObserver;

#[derive(Args, Debug)]
pub struct ReadArgs {
    /// JSON transfer profile; flags below override its fields
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Server address, host:port
    #[arg(long)]
    pub addr: Option<String>,

    /// File to read on the server
    #[arg(long)]
    pub path: Option<String>,

    #[arg(long)]
    pub offset: Option<u64>,

    #[arg(long)]
    pub block_size: Option<u64>,

    /// Bytes to read (default: to end of file)
    #[arg(long)]
    pub size: Option<u64>,

    /// Stream the range instead of one request per block
    #[arg(long)]
    pub stream: bool,

    #[arg(long)]
    pub codec: Option<CodecId>,

    /// Write the received bytes here
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct SizeArgs {
    #[arg(long)]
    pub addr: String,

    #[arg(long)]
    pub path: String,

    #[arg(long, default_value_t = CodecId::Binary)]
    pub codec: CodecId,
}

fn resolve(args: &ReadArgs) -> Result<ClientConfig> {
    let mut config = match &args.config {
        Some(file) => ClientConfig::load(file)?,
        None => {
            let (Some(addr), Some(path)) = (&args.addr, &args.path) else {
                bail!("either --config or both --addr and --path are required");
            };
            ClientConfig::new(addr.clone(), path.clone())
        }
    };

    if let Some(addr) = &args.addr {
        config.addr = addr.clone();
    }
    if let Some(path) = &args.path {
        config.path = path.clone();
    }
    if let Some(offset) = args.offset {
        config.offset = offset;
    }
    if let Some(block_size) = args.block_size {
        config.block_size = block_size;
    }
    if args.size.is_some() {
        config.size = args.size;
    }
    if args.stream {
        config.stream = true;
    }
    if let Some(codec) = args.codec {
        config.codec = codec;
    }

    config.validate()?;
    Ok(config)
}

pub async fn cmd_read(args: ReadArgs) -> Result<()> {
    let config = resolve(&args)?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupt received, cancelling transfer");
                cancel.cancel();
            }
        });
    }

    let mut client = FileOpsClient::connect(&config.addr, config.codec)
        .await?
        .with_cancellation(cancel);

    let mut request = TransferRequest::from(&config);
    request.keep_data = args.output.is_some();

    match run_transfer(&mut client, &request, &TracingObserver).await {
        Ok(outcome) => {
            if let (Some(out), Some(data)) = (&args.output, &outcome.data) {
                tokio::fs::write(out, data)
                    .await
                    .with_context(|| format!("failed to write {}", out.display()))?;
            }
            print_report(&config, &outcome.report, args.json)?;
            Ok(())
        }
        Err(failure) => {
            print_report(&config, &failure.report, args.json)?;
            Err(anyhow::Error::new(failure)).context("transfer failed")
        }
    }
}

fn print_report(config: &ClientConfig, report: &TransferReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&report.summary())?);
        return Ok(());
    }

    let summary = report.summary();
    let micros = |v: Option<u64>| v.map_or_else(|| "n/a".to_string(), |us| format!("{us}µs"));

    println!("═══════════════════════════════════════");
    println!("  Transfer {}", config.path);
    println!("═══════════════════════════════════════");
    println!("  Mode         : {}", if config.stream { "streaming" } else { "unary" });
    println!("  Codec        : {}", config.codec);
    println!("  Block size   : {} bytes", config.block_size);
    println!("  Calls        : {}", summary.calls);
    println!("  Bytes        : {}", summary.bytes);
    println!("  Average      : {}", micros(summary.average_us));
    println!("  Min / Max    : {} / {}", micros(summary.min_us), micros(summary.max_us));
    println!("  Calls total  : {}µs", summary.calls_total_us);
    println!("  Wall clock   : {}µs", summary.wall_clock_us);
    if let Some(rate) = summary.throughput_bytes_per_sec {
        println!("  Throughput   : {:.1} MiB/s", rate / (1024.0 * 1024.0));
    }
    Ok(())
}

pub async fn cmd_size(args: SizeArgs) -> Result<()> {
    let mut client = FileOpsClient::connect(&args.addr, args.codec).await?;
    client.open(&args.path).await?;
    let size = client.size(&args.path).await;
    client.close(&args.path).await?;
    println!("{}", size?);
    Ok(())
}
