use clap::Parser;
use log::info;
use server::network::Server;
use std::net::IpAddr;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to accept control connections on
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port to accept control connections on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Address the broadcast endpoint binds to
    #[arg(long, default_value = "0.0.0.0")]
    datagram_host: IpAddr,
}

/// Parses command-line arguments, binds both endpoints and serves until Ctrl+C.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let address = format!("{}:{}", args.host, args.port);

    info!("Starting server...");
    let server = Server::bind(&address, args.datagram_host).await?;
    info!("Broadcasting from {}", server.broadcast_addr());

    server.run_until_ctrl_c().await?;

    info!("Server stopped");
    Ok(())
}
