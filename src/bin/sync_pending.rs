use std::{error::Error, path::PathBuf, process::exit, time::Duration};

use clap::Parser;
use reqwest::Url;
use tracing_subscriber::{EnvFilter, fmt};

use kasir_saku::{
    TRANSACTIONS_API,
    client::{PendingTransactions, ReqwestNetwork, replay_pending},
};

/// Send the transactions a device queued while offline to a Kasir Saku server.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// File path to the device's pending transaction queue.
    #[arg(long)]
    queue_path: PathBuf,

    /// The address of the server, e.g. "https://localhost:3000".
    #[arg(long)]
    server_url: Url,

    /// How long to wait for each request, in seconds.
    #[arg(long, default_value_t = 30)]
    timeout: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let args = Args::parse();

    if !args.queue_path.is_file() {
        eprintln!("No queue exists at {:#?}, nothing to sync.", args.queue_path);
        exit(1);
    }

    let queue = PendingTransactions::open(&args.queue_path)?;
    let network = ReqwestNetwork::new(args.server_url.clone(), Duration::from_secs(args.timeout))?;
    let endpoint = args.server_url.join(TRANSACTIONS_API)?;

    let report = replay_pending(&network, &endpoint, &queue).await?;

    println!(
        "Sent {}, discarded {}, still queued {}.",
        report.sent, report.discarded, report.retained
    );

    if report.retained > 0 {
        exit(2);
    }

    Ok(())
}
