use clap::Parser;
use log::{error, info};
use server::network::Server;
use server::room::DEFAULT_ROOM;
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

    /// Maximum number of concurrent clients
    #[arg(short, long, default_value = "32")]
    max_clients: usize,

    /// Seconds of silence before a client is dropped
    #[arg(short, long, default_value = "5")]
    timeout_secs: u64,

    /// Room code announced in the logs
    #[arg(short, long, default_value = DEFAULT_ROOM)]
    room: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    env_logger::init();

    let args = Args::parse();
    let address = format!("{}:{}", args.host, args.port);

    info!("Starting relay on {}", address);
    info!(
        "Max clients: {}, timeout: {}s",
        args.max_clients, args.timeout_secs
    );

    let mut server = Server::new(
        &address,
        args.max_clients,
        Duration::from_secs(args.timeout_secs),
        &args.room,
    )
    .await?;

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Relay stopped with error: {}", e);
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
