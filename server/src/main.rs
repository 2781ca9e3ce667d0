use clap::Parser;
use log::info;
use server::network::Server;
use shared::TICK_RATE;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Maximum number of concurrent players
    #[arg(short, long, default_value = "32")]
    max_clients: usize,

    /// Seconds of silence before a client is dropped
    #[arg(long, default_value = "5")]
    client_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let address = format!("{}:{}", args.host, args.port);
    let tick_duration = Duration::from_secs_f64(1.0 / TICK_RATE as f64);

    info!(
        "Starting arena server on {} at {} ticks/s (max {} players)",
        address, TICK_RATE, args.max_clients
    );

    let mut server = Server::new(
        &address,
        tick_duration,
        args.max_clients,
        Duration::from_secs(args.client_timeout_secs),
    )
    .await?;

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
