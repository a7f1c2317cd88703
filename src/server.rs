//! Multi-client server: dispatcher + per-peer session handlers.
//!
//! # Architecture
//!
//! ```text
//!                       ┌───────────────────────────────┐
//!   UDP datagrams ────▶ │  Server (dispatcher)          │
//!                       │  routes by source address     │
//!                       └──────┬──────────────┬─────────┘
//!                      mpsc    │              │    mpsc
//!                   ┌──────────▼───┐   ┌──────▼───────┐
//!                   │ SessionHandler│  │ SessionHandler│  … one task per peer
//!                   │ (own FSM +    │  │               │
//!                   │  Simulator)   │  │               │
//!                   └───────┬───────┘  └──────┬───────┘
//!                           └───── shared Arc<Socket> (send only)
//! ```
//!
//! The dispatcher owns the only receive path and never inspects datagram
//! contents: it routes raw bytes to the handler for their source address,
//! spawning one (with a private ordered channel) the first time an address
//! appears.  Handlers run independently, so one peer's stalls cannot block
//! another's traffic; they share no mutable state beyond the outbound
//! socket.  A handler removes itself from the session map when it closes.
//!
//! Each handler wakes every [`ServerConfig::idle_poll`] even with no input
//! to drive its FIN retry deadline — the only background timer in the
//! system.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex};
use tokio::time::timeout;

use crate::packet::{flags, Packet, HEADER_LEN};
use crate::simulator::{Simulator, SimulatorConfig};
use crate::socket::Socket;
use crate::state::ServerState;

/// Datagrams buffered per peer before the dispatcher awaits.
const SESSION_QUEUE_DEPTH: usize = 64;

/// Tunables for the server and its session handlers.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Probability that a DATA packet is silently dropped (fault injection).
    pub loss_rate: f64,
    /// Probability that one byte of an inbound datagram is flipped.
    pub corruption_rate: f64,
    /// Fixed RNG seed for the impairment simulator; `None` uses OS entropy.
    pub seed: Option<u64>,
    /// Idle wakeup interval for handlers (drives the FIN retry check).
    pub idle_poll: Duration,
    /// Delay before an unacknowledged server FIN is resent.
    pub fin_retry_interval: Duration,
    /// FIN resends before the handler force-closes.
    pub max_fin_retries: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            loss_rate: 0.0,
            corruption_rate: 0.0,
            seed: None,
            idle_poll: Duration::from_millis(100),
            fin_retry_interval: Duration::from_millis(300),
            max_fin_retries: 5,
        }
    }
}

type SessionMap = Arc<Mutex<HashMap<SocketAddr, mpsc::Sender<Vec<u8>>>>>;

/// The dispatcher: owns the socket, fans datagrams out by source address.
pub struct Server {
    socket: Arc<Socket>,
    config: ServerConfig,
    sessions: SessionMap,
}

impl Server {
    /// Bind the server socket.
    pub async fn bind(addr: SocketAddr, config: ServerConfig) -> io::Result<Self> {
        let socket = Arc::new(Socket::bind(addr).await?);
        log::info!(
            "server listening on {} (loss={}, corruption={})",
            socket.local_addr,
            config.loss_rate,
            config.corruption_rate
        );
        Ok(Self {
            socket,
            config,
            sessions: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.socket.local_addr
    }

    /// Number of live session handlers.
    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Receive datagrams forever, routing each to its peer's handler.
    pub async fn run(&self) -> io::Result<()> {
        loop {
            let (data, addr) = self.socket.recv().await?;

            let tx = {
                let sessions = self.sessions.lock().await;
                sessions.get(&addr).cloned()
            };
            let tx = match tx {
                Some(tx) => tx,
                None => self.spawn_session(addr).await,
            };

            match tx.try_send(data) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    // One peer's full queue must not stall dispatch for
                    // everyone else.  Dropping is safe: the protocol treats
                    // loss as recoverable via the sender's timeout.
                    log::warn!("session queue for {addr} full; dropping datagram");
                }
                Err(TrySendError::Closed(rejected)) => {
                    // The handler closed between lookup and send; treat this
                    // as a fresh connection attempt from the same address.
                    let tx = self.spawn_session(addr).await;
                    let _ = tx.try_send(rejected);
                }
            }
        }
    }

    /// Create a handler task for `peer` and register its channel.
    async fn spawn_session(&self, peer: SocketAddr) -> mpsc::Sender<Vec<u8>> {
        let (tx, rx) = mpsc::channel(SESSION_QUEUE_DEPTH);

        let sim_config = SimulatorConfig {
            loss_rate: self.config.loss_rate,
            corruption_rate: self.config.corruption_rate,
        };
        let simulator = match self.config.seed {
            Some(seed) => Simulator::seeded(sim_config, seed),
            None => Simulator::new(sim_config),
        };

        let handler = SessionHandler::new(
            Arc::clone(&self.socket),
            peer,
            simulator,
            self.config.clone(),
        );

        self.sessions.lock().await.insert(peer, tx.clone());
        log::info!("new session from {peer}");

        let sessions = Arc::clone(&self.sessions);
        tokio::spawn(async move {
            handler.run(rx).await;
            sessions.lock().await.remove(&peer);
            log::info!("session with {peer} closed");
        });

        tx
    }
}

// ---------------------------------------------------------------------------
// SessionHandler
// ---------------------------------------------------------------------------

/// Receive-side state machine for one remote peer.
///
/// Consumes datagrams from its private channel strictly in arrival order;
/// different peers' handlers run fully in parallel.
struct SessionHandler {
    socket: Arc<Socket>,
    peer: SocketAddr,
    simulator: Simulator,
    config: ServerConfig,

    state: ServerState,
    /// Our randomized initial sequence number for the handshake.
    isn: u32,
    /// Next in-order byte offset expected from the peer.
    expected: u32,
    /// In-order data packets accepted, for logging.
    total_packets: u64,

    /// Teardown retry state, armed when our FIN goes out.
    fin: Option<Packet>,
    final_ack: u32,
    fin_sent_at: Option<Instant>,
    fin_retries: u32,
}

impl SessionHandler {
    fn new(
        socket: Arc<Socket>,
        peer: SocketAddr,
        simulator: Simulator,
        config: ServerConfig,
    ) -> Self {
        Self {
            socket,
            peer,
            simulator,
            config,
            state: ServerState::Listen,
            isn: rand::random(),
            expected: 0,
            total_packets: 0,
            fin: None,
            final_ack: 0,
            fin_sent_at: None,
            fin_retries: 0,
        }
    }

    /// Process datagrams until the session closes or the dispatcher drops
    /// the channel.  Periodic idle wakeups drive the FIN retry deadline.
    async fn run(mut self, mut rx: mpsc::Receiver<Vec<u8>>) {
        while self.state != ServerState::Closed {
            match timeout(self.config.idle_poll, rx.recv()).await {
                Ok(Some(datagram)) => {
                    if let Err(e) = self.process(datagram).await {
                        log::error!("[{}] send failed: {e}", self.peer);
                        break;
                    }
                }
                Ok(None) => break, // dispatcher gone
                Err(_elapsed) => self.check_fin_retry().await,
            }
        }
    }

    /// Handle one raw datagram: impairment, checksum, flag dispatch.
    async fn process(&mut self, mut datagram: Vec<u8>) -> io::Result<()> {
        if datagram.len() < HEADER_LEN {
            return Ok(());
        }

        if let Some(pos) = self.simulator.maybe_corrupt(&mut datagram) {
            log::warn!("[{}] simulated corruption at byte {pos}", self.peer);
        }

        let pkt = match Packet::decode(&datagram) {
            Ok(pkt) => pkt,
            Err(e) => {
                // Corrupted frame: the duplicate ACK is the only negative
                // signal the protocol has.
                log::warn!("[{}] {e}; sending duplicate ACK", self.peer);
                return self.send_ack(self.expected).await;
            }
        };
        let h = pkt.header.clone();

        if h.flags & flags::SYN != 0 && !self.state.is_established() {
            log::info!("[{}] ← SYN seq={}", self.peer, h.seq);
            let syn_ack = Packet::control(self.isn, h.seq.wrapping_add(1), flags::SYN | flags::ACK);
            self.socket.send(&syn_ack, self.peer).await?;
            self.state = ServerState::SynReceived;
            log::info!("[{}] → SYN-ACK seq={} ack={}", self.peer, self.isn, h.seq.wrapping_add(1));
        } else if h.flags & flags::ACK != 0
            && !self.state.is_established()
            && h.ack == self.isn.wrapping_add(1)
        {
            self.state = ServerState::Established;
            self.expected = 0;
            log::info!("[{}] handshake complete", self.peer);
        } else if h.flags & flags::DATA != 0 && self.state == ServerState::Established {
            if self.simulator.should_drop() {
                log::warn!("[{}] simulated loss of DATA seq={}", self.peer, h.seq);
                return Ok(());
            }
            if h.seq == self.expected {
                let len = pkt.payload.len() as u32;
                self.expected = self.expected.wrapping_add(len);
                self.total_packets += 1;
                log::info!(
                    "[{}] ← DATA pkt={} seq={} len={}; → ACK {}",
                    self.peer,
                    h.pkt_num,
                    h.seq,
                    len,
                    self.expected
                );
                self.send_ack(self.expected).await?;
            } else {
                // Out-of-order or duplicate: never buffered, re-ACK the
                // unchanged expected value.
                log::warn!(
                    "[{}] ← DATA seq={} (expected {}); duplicate ACK",
                    self.peer,
                    h.seq,
                    self.expected
                );
                self.send_ack(self.expected).await?;
            }
        } else if h.flags & flags::FIN != 0 && self.state.is_established() {
            log::info!("[{}] ← FIN seq={}", self.peer, h.seq);
            self.send_ack(h.seq.wrapping_add(1)).await?;

            // Send our own FIN immediately and arm the retry timer.  A
            // retransmitted peer FIN lands here again and resets the budget.
            let fin = Packet::control(0, h.seq.wrapping_add(1), flags::FIN);
            self.final_ack = fin.header.seq.wrapping_add(1);
            self.socket.send(&fin, self.peer).await?;
            self.fin = Some(fin);
            self.fin_sent_at = Some(Instant::now());
            self.fin_retries = 0;
            self.state = ServerState::FinWait;
            log::info!("[{}] → FIN, waiting for final ACK", self.peer);
        } else if h.flags & flags::ACK != 0
            && self.state == ServerState::FinWait
            && h.ack == self.final_ack
        {
            log::info!(
                "[{}] ← final ACK after {} data packet(s); closing",
                self.peer,
                self.total_packets
            );
            self.state = ServerState::Closed;
        }
        // Anything else is a protocol violation for the current state and is
        // silently ignored; the sender's timeout recovers.

        Ok(())
    }

    /// Resend the FIN when its ACK is overdue; force-close once the retry
    /// budget is spent.
    async fn check_fin_retry(&mut self) {
        if self.state != ServerState::FinWait {
            return;
        }
        let Some(sent_at) = self.fin_sent_at else {
            return;
        };
        if sent_at.elapsed() < self.config.fin_retry_interval {
            return;
        }

        if self.fin_retries >= self.config.max_fin_retries {
            log::warn!(
                "[{}] final ACK never arrived after {} FIN retries; force-closing",
                self.peer,
                self.fin_retries
            );
            self.state = ServerState::Closed;
            return;
        }

        if let Some(fin) = &self.fin {
            if let Err(e) = self.socket.send(fin, self.peer).await {
                log::error!("[{}] FIN resend failed: {e}", self.peer);
            }
        }
        self.fin_retries += 1;
        self.fin_sent_at = Some(Instant::now());
        log::warn!(
            "[{}] resent FIN ({}/{})",
            self.peer,
            self.fin_retries,
            self.config.max_fin_retries
        );
    }

    /// Send a pure ACK carrying the given cumulative value.
    async fn send_ack(&self, ack: u32) -> io::Result<()> {
        self.socket
            .send(&Packet::control(0, ack, flags::ACK), self.peer)
            .await
    }
}
