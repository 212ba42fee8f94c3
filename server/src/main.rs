use clap::Parser;
use lobby_server::config::{parse_quorum, rcon_timeout_for, tick_interval_for, ServerConfig};
use lobby_server::console::{ConsoleQueue, HELP};
use lobby_server::network::Server;
use lobby_server::rcon::SourceRcon;
use lobby_server::transport::UdpServerTransport;
use lobby_shared::{parse_address, DEFAULT_SERVER_PORT};
use log::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// IP address to listen on
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_SERVER_PORT)]
    port: u16,

    /// Players in a lobby required to start the game
    #[arg(short, long, default_value = "2")]
    quorum: String,

    /// Dispatch loop rate in Hz
    #[arg(short, long, default_value = "100")]
    tick_rate: u32,

    /// Game server to launch matches on, ip[:port] (repeatable)
    #[arg(short = 'g', long = "game-server")]
    game_servers: Vec<String>,

    /// RCON password of the game servers
    #[arg(long, default_value = "")]
    rcon_password: String,

    /// Connect, read and write timeout for RCON in milliseconds
    #[arg(long, default_value = "2000")]
    rcon_timeout_ms: u64,

    /// Do not read operator commands from stdin
    #[arg(long)]
    no_console: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let mut config = ServerConfig {
        quorum: parse_quorum(&args.quorum)?,
        rcon_password: args.rcon_password,
        rcon_timeout: rcon_timeout_for(args.rcon_timeout_ms)?,
        tick_interval: tick_interval_for(args.tick_rate)?,
        ..ServerConfig::default()
    };
    for game_server in &args.game_servers {
        let target = config.add_game_server(game_server)?;
        info!("Game server {} registered", target.socket_addr());
    }
    if config.game_servers.is_empty() {
        warn!("No game server registered yet; add one with /game_sip <ip[:port]>");
    }

    let bind_addr = parse_address(&args.host, args.port)?;
    let transport = UdpServerTransport::bind(bind_addr).await?;
    let remote = SourceRcon::new(config.rcon_timeout);

    let console = ConsoleQueue::new();
    if !args.no_console {
        console.spawn_stdin_reader()?;
        for line in HELP.lines() {
            info!("{}", line);
        }
    }

    let mut server = Server::new(transport, config, remote, console);
    server.run().await?;

    info!("Server stopped");
    Ok(())
}
