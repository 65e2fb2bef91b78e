//! fileops-ctl — command-line interface for fileopsd.

mod cmd;

use anyhow::Result;
use clap::{Parser, Subcommand};

use fileops_core::wire::DEFAULT_API_PORT;

#[derive(Parser, Debug)]
#[command(name = "fileops-ctl", version, about = "Read files from and inspect a fileopsd server")]
struct Cli {
    /// Status API port on 127.0.0.1
    #[arg(long, global = true, default_value_t = DEFAULT_API_PORT)]
    port: u16,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Transfer a byte range and report per-block latency
    Read(cmd::read::ReadArgs),
    /// Print the size of a file on the server
    Size(cmd::read::SizeArgs),
    /// Daemon status
    Status,
    /// List sessions, closed ones included
    Sessions,
    /// Close the session for a path
    CloseSession {
        path: String,
    },
    /// Ask the daemon to shut down
    Shutdown,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Read(args) => cmd::read::cmd_read(args).await,
        Command::Size(args) => cmd::read::cmd_size(args).await,
        Command::Status => cmd::status::cmd_status(cli.port).await,
        Command::Sessions => cmd::status::cmd_sessions(cli.port).await,
        Command::CloseSession { path } => cmd::status::cmd_close_session(cli.port, &path).await,
        Command::Shutdown => cmd::status::cmd_shutdown(cli.port).await,
    }
}
