use clap::Parser;
use lobby_client::network::Client;
use lobby_shared::{parse_address, DEFAULT_SERVER_PORT};
use log::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Matchmaking server address, ip[:port]
    #[arg(short = 's', long, default_value = "127.0.0.1:27055")]
    server: String,

    /// Nickname to take after connecting
    #[arg(short = 'n', long)]
    nick: Option<String>,

    /// Wait for /start_game instead of connecting as soon as a match is ready
    #[arg(long)]
    no_auto_start: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let server = parse_address(&args.server, DEFAULT_SERVER_PORT)?;

    info!("Starting client...");
    if args.no_auto_start {
        info!("Auto start disabled, use /start_game once a match is ready");
    }

    let mut client = Client::new(server, args.nick, !args.no_auto_start).await?;
    client.run().await?;

    info!("Client stopped");
    Ok(())
}
