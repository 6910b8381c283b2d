#![forbid(unsafe_code)]

use std::path::PathBuf;

use clap::Parser;
use lsptrace::TraceProxy;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "lsptrace-proxy")]
#[command(about = "Transparent tracing proxy for language servers")]
struct Cli {
    /// File that receives one JSON trace record per line.
    #[arg(long, default_value = "out.lsptrace")]
    trace_output: PathBuf,

    /// Route diagnostic logs to this file instead of stderr.
    #[arg(long)]
    debug_output: Option<PathBuf>,

    /// Intercept the server's Unix-socket handshake instead of tracing stdio.
    #[arg(long)]
    named_pipes: bool,

    /// Language server command followed by its arguments, passed through
    /// verbatim.
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    server_cmd: Vec<String>,
}

// Diagnostics never go to stdout: in stdio mode it carries the LSP stream.
fn init_logging(debug_output: Option<&PathBuf>) -> Result<(), std::io::Error> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match debug_output {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(err) = init_logging(cli.debug_output.as_ref()) {
        eprintln!("FATAL: failed to open debug log: {err}");
        std::process::exit(1);
    }

    let Some((server_cmd, server_args)) = cli.server_cmd.split_first() else {
        eprintln!("FATAL: no language server command given");
        std::process::exit(1);
    };

    let proxy = TraceProxy::builder(server_cmd, &cli.trace_output)
        .args(server_args.iter().cloned())
        .handle_named_pipes(cli.named_pipes)
        .build();

    let status = tokio::select! {
        result = proxy.run() => match result {
            Ok(status) => status,
            Err(err) => {
                eprintln!("FATAL: {err}");
                std::process::exit(1);
            }
        },
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted, shutting down");
            std::process::exit(1);
        }
    };

    std::process::exit(status.code().unwrap_or(1));
}
