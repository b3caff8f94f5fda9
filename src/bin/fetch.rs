use std::io::Write;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::Parser;
use tracing::debug;

use tickhttp::client::{HttpRequest, Progress};
use tickhttp::transport::tcp::TcpDialer;

/// Fetch one URL with the tick-driven client.
#[derive(Debug, Parser)]
#[command(version)]
struct Args {
    /// http://host[:port]/path
    url: String,

    /// Tick period in ms
    #[arg(short, long, default_value_t = 10)]
    interval: u64,

    /// Give up after this many ticks
    #[arg(short = 'n', long, default_value_t = 1000)]
    max_ticks: u64,

    /// Print the status line and headers before the body
    #[arg(short = 'I', long)]
    include: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut client = HttpRequest::new(TcpDialer);
    client
        .configure_url(&args.url)
        .with_context(|| format!("configuring request for {}", args.url))?;

    let mut ticker = tokio::time::interval(Duration::from_millis(args.interval.max(1)));

    for tick in 0..args.max_ticks {
        ticker.tick().await;

        let (progress, state) = client.request();
        debug!(tick, code = progress.code(), ?state, "Tick");

        match progress {
            Progress::Done => {
                let response = client.response();
                let mut out = std::io::stdout().lock();

                if args.include {
                    writeln!(out, "{} {}", response.status.code, response.status.reason)?;
                    let mut headers: Vec<_> = response.headers.iter().collect();
                    headers.sort();
                    for (name, value) in headers {
                        writeln!(out, "{name}: {value}")?;
                    }
                    writeln!(out)?;
                }
                out.write_all(&response.body)?;
                out.flush()?;
                return Ok(());
            }
            Progress::Failed(e) => bail!("request failed ({}): {e}", e.code()),
            Progress::Unconfigured => bail!("request not configured"),
            Progress::Advanced | Progress::Pending => {}
        }
    }

    bail!("no response after {} ticks", args.max_ticks)
}
