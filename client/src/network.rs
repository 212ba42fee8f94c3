use crate::input::{ClientCommand, HELP};
use crate::session::{LobbySession, Reaction};
use lobby_shared::{
    Message, TransportFrame, CONNECTION_TIMEOUT, CONNECT_RETRY_INTERVAL, HEARTBEAT_INTERVAL,
    MAX_DATAGRAM_SIZE, TRANSPORT_VERSION,
};
use log::{debug, error, info, warn};
use std::io::BufRead;
use std::net::SocketAddr;
use std::time::Instant;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};

pub struct Client {
    socket: UdpSocket,
    server_addr: SocketAddr,
    connected: bool,
    last_heard: Instant,
    last_heartbeat: Instant,

    session: LobbySession,
    nickname: Option<String>,
}

impl Client {
    pub async fn new(
        server_addr: SocketAddr,
        nickname: Option<String>,
        auto_start: bool,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let bind_addr: SocketAddr = if server_addr.is_ipv4() {
            "0.0.0.0:0".parse()?
        } else {
            "[::]:0".parse()?
        };
        let socket = UdpSocket::bind(bind_addr).await?;

        Ok(Client {
            socket,
            server_addr,
            connected: false,
            last_heard: Instant::now(),
            last_heartbeat: Instant::now(),
            session: LobbySession::new(auto_start),
            nickname,
        })
    }

    async fn send_frame(&self, frame: &TransportFrame) -> Result<(), Box<dyn std::error::Error>> {
        let data = frame.to_bytes()?;
        self.socket.send_to(&data, self.server_addr).await?;
        Ok(())
    }

    async fn send_message(&self, message: &Message) -> Result<(), Box<dyn std::error::Error>> {
        if !self.connected {
            warn!("Not connected yet, dropping {:?}", message.tag());
            return Ok(());
        }
        self.send_frame(&TransportFrame::Data(message.encode())).await
    }

    /// Shows the reaction's lines and sends its replies. Returns false once
    /// the player asked to quit.
    async fn apply(&mut self, reaction: Reaction) -> Result<bool, Box<dyn std::error::Error>> {
        for line in &reaction.display {
            println!("{}", line);
        }
        for message in &reaction.replies {
            self.send_message(message).await?;
        }
        Ok(!reaction.quit)
    }

    /// Returns false when the server ended the session
    async fn handle_frame(
        &mut self,
        frame: TransportFrame,
    ) -> Result<bool, Box<dyn std::error::Error>> {
        match frame {
            TransportFrame::Accept => {
                if !self.connected {
                    self.connected = true;
                    info!("Connected to matchmaking server {}", self.server_addr);
                    println!("{}", HELP);

                    if let Some(nickname) = self.nickname.take() {
                        self.send_message(&Message::chat(format!("/nick {}", nickname)))
                            .await?;
                    }
                }
            }

            TransportFrame::Data(bytes) => match Message::decode(&bytes) {
                Ok(message) => {
                    let reaction = self.session.handle_message(message);
                    self.apply(reaction).await?;
                }
                Err(e) => warn!("Failed to decode message from server: {}", e),
            },

            TransportFrame::Heartbeat => {}

            TransportFrame::Close { reason } => {
                info!("Server closed the connection: {}", reason);
                self.connected = false;
                return Ok(false);
            }

            TransportFrame::Connect { .. } => warn!("Unexpected connect frame from server"),
        }

        Ok(true)
    }

    /// Connect retries, heartbeats and timeout detection
    async fn on_timer(&mut self) -> Result<bool, Box<dyn std::error::Error>> {
        let now = Instant::now();

        if now.duration_since(self.last_heard) > CONNECTION_TIMEOUT {
            if self.connected {
                error!("Lost connection to matchmaking server");
            } else {
                error!("Could not reach matchmaking server at {}", self.server_addr);
            }
            self.connected = false;
            return Ok(false);
        }

        if !self.connected {
            debug!("Sending connect request to {}", self.server_addr);
            self.send_frame(&TransportFrame::Connect {
                version: TRANSPORT_VERSION,
            })
            .await?;
        } else if now.duration_since(self.last_heartbeat) >= HEARTBEAT_INTERVAL {
            self.last_heartbeat = now;
            self.send_frame(&TransportFrame::Heartbeat).await?;
        }

        Ok(true)
    }

    fn spawn_stdin_reader(line_tx: mpsc::UnboundedSender<String>) {
        std::thread::spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                match line {
                    Ok(line) => {
                        if line_tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        error!("Failed to read input: {}", e);
                        break;
                    }
                }
            }
        });
    }

    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let (line_tx, mut line_rx) = mpsc::unbounded_channel();
        Self::spawn_stdin_reader(line_tx);

        let mut timer = interval(CONNECT_RETRY_INTERVAL);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];
        let mut running = true;

        info!("Connecting to matchmaking server at {}", self.server_addr);
        self.last_heard = Instant::now();

        while running {
            tokio::select! {
                result = self.socket.recv_from(&mut buffer) => {
                    match result {
                        Ok((len, addr)) if addr == self.server_addr => {
                            match TransportFrame::from_bytes(&buffer[..len]) {
                                Ok(frame) => {
                                    self.last_heard = Instant::now();
                                    running = self.handle_frame(frame).await?;
                                }
                                Err(e) => warn!("Failed to decode frame: {}", e),
                            }
                        }
                        Ok((_, addr)) => debug!("Ignoring datagram from {}", addr),
                        Err(e) => error!("Error receiving datagram: {}", e),
                    }
                },

                _ = timer.tick() => {
                    running = self.on_timer().await?;
                },

                line = line_rx.recv() => {
                    let command = match line {
                        Some(line) if line.trim().is_empty() => continue,
                        Some(line) => ClientCommand::parse(&line),
                        None => ClientCommand::Quit,
                    };
                    let reaction = self.session.handle_command(command);
                    running = self.apply(reaction).await?;
                },

                _ = &mut ctrl_c => {
                    let reaction = self.session.handle_command(ClientCommand::Quit);
                    self.apply(reaction).await?;
                    running = false;
                }
            }
        }

        if self.connected {
            self.send_frame(&TransportFrame::Close {
                reason: "Goodbye".to_string(),
            })
            .await?;
        }

        Ok(())
    }
}
