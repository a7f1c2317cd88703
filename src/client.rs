//! Client session: handshake, windowed transfer, teardown.
//!
//! A [`Client`] drives one complete connection against the server:
//!
//! 1. **Handshake** — send SYN, resend on timeout until a matching SYN-ACK
//!    arrives, then confirm with ACK ([`Client::connect`]).
//! 2. **Transfer** — issue data packets with randomized payload sizes while
//!    the outstanding byte span fits the window, poll for cumulative ACKs
//!    with a short bounded wait, and retransmit the **entire** unacknowledged
//!    window whenever the oldest outstanding packet exceeds the adaptive
//!    timeout (Go-Back-N).
//! 3. **Teardown** — send FIN (retried on timeout), wait for the peer's FIN,
//!    answer it with the final ACK, then linger briefly to re-answer a
//!    retransmitted FIN whose ACK was lost.
//!
//! The whole session is one sequential loop: there is no background task,
//! and every suspension is an explicitly bounded receive.  Data
//! retransmission is deliberately unbounded — under total loss the transfer
//! phase never completes and never errors (the teardown FIN retry budget on
//! the server side is the only bounded retry in the protocol).

use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::time::timeout;

use crate::packet::{flags, Packet};
use crate::report::RttReport;
use crate::rtt::RttEstimator;
use crate::socket::Socket;
use crate::state::ClientState;
use crate::window::SendWindow;

/// Tunables for one client session.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Total number of data packets to deliver.
    pub total_packets: u32,
    /// Sliding-window capacity in bytes.
    pub window_bytes: u32,
    /// Inclusive bounds for the randomized payload size.
    pub payload_min: u32,
    pub payload_max: u32,
    /// How long to wait for a SYN-ACK before resending SYN.
    pub handshake_timeout: Duration,
    /// Bounded wait per ACK poll during the transfer phase.
    pub ack_poll: Duration,
    /// How long to wait for the ACK of our FIN before resending it.
    pub fin_ack_timeout: Duration,
    /// Bounded wait per poll while waiting for the peer's FIN.
    pub peer_fin_timeout: Duration,
    /// Grace period after the final ACK during which a re-observed peer FIN
    /// is answered again.
    pub linger: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            total_packets: 30,
            window_bytes: 400,
            payload_min: 40,
            payload_max: 80,
            handshake_timeout: Duration::from_secs(2),
            ack_poll: Duration::from_millis(100),
            fin_ack_timeout: Duration::from_secs(1),
            peer_fin_timeout: Duration::from_secs(5),
            linger: Duration::from_secs(30),
        }
    }
}

impl ClientConfig {
    /// Reject configurations that can never make progress.
    ///
    /// The window must hold at least one packet of the smallest payload
    /// size: otherwise no packet ever fits and the transfer loop would poll
    /// forever with nothing in flight.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.payload_min > self.payload_max {
            return Err(ConfigError::PayloadBoundsInverted {
                min: self.payload_min,
                max: self.payload_max,
            });
        }
        if self.window_bytes < self.payload_min {
            return Err(ConfigError::WindowTooSmall {
                window: self.window_bytes,
                payload_min: self.payload_min,
            });
        }
        Ok(())
    }
}

/// Rejected [`ClientConfig`] values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// `payload_min` exceeds `payload_max`.
    PayloadBoundsInverted { min: u32, max: u32 },
    /// The window cannot hold even the smallest payload.
    WindowTooSmall { window: u32, payload_min: u32 },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::PayloadBoundsInverted { min, max } => {
                write!(f, "payload size bounds inverted: min {min} > max {max}")
            }
            ConfigError::WindowTooSmall {
                window,
                payload_min,
            } => write!(
                f,
                "window of {window} bytes cannot hold even one {payload_min}-byte payload"
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

/// One client-side connection attempt.
#[derive(Debug)]
pub struct Client {
    socket: Socket,
    server: SocketAddr,
    config: ClientConfig,
    state: ClientState,
    isn: u32,
    window: SendWindow,
    rtt: RttEstimator,
    report: RttReport,
    /// Transmissions including retransmissions, for the end-of-run log.
    total_sent: u64,
}

impl Client {
    /// Perform the three-way handshake and return an established session.
    ///
    /// Resends SYN indefinitely on timeout; checksum-invalid replies are
    /// silently discarded and recovered via the same timeout.  A
    /// configuration the transfer loop could never complete with is
    /// rejected up front as [`io::ErrorKind::InvalidInput`].
    pub async fn connect(
        socket: Socket,
        server: SocketAddr,
        config: ClientConfig,
    ) -> io::Result<Self> {
        config
            .validate()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let mut client = Self {
            socket,
            server,
            isn: rand::random(),
            state: ClientState::Init,
            window: SendWindow::new(config.window_bytes),
            rtt: RttEstimator::new(),
            report: RttReport::new(config.total_packets),
            total_sent: 0,
            config,
        };
        client.handshake().await?;
        Ok(client)
    }

    /// Current FSM state.
    pub fn state(&self) -> ClientState {
        self.state
    }

    /// Run the transfer phase followed by the teardown, consuming the
    /// session.  Returns the per-packet RTT report.
    pub async fn run(mut self) -> io::Result<RttReport> {
        self.transfer().await?;
        self.teardown().await?;

        log::info!(
            "[client] session closed; {} transmissions for {} packets",
            self.total_sent,
            self.config.total_packets
        );
        if let Some(summary) = self.report.summary() {
            log::info!("[client] {summary}");
        }
        Ok(self.report)
    }

    // -----------------------------------------------------------------------
    // Handshake
    // -----------------------------------------------------------------------

    async fn handshake(&mut self) -> io::Result<()> {
        let syn = Packet::control(self.isn, 0, flags::SYN);
        self.socket.send(&syn, self.server).await?;
        self.state = ClientState::SynSent;
        log::info!("[client] → SYN seq={}", self.isn);

        let peer_seq = loop {
            match timeout(self.config.handshake_timeout, self.recv_valid()).await {
                Ok(Ok(pkt)) => {
                    let h = &pkt.header;
                    if h.flags & flags::SYN != 0
                        && h.flags & flags::ACK != 0
                        && h.ack == self.isn.wrapping_add(1)
                    {
                        log::info!("[client] ← SYN-ACK seq={} ack={}", h.seq, h.ack);
                        break h.seq;
                    }
                }
                Ok(Err(e)) => return Err(e),
                Err(_elapsed) => {
                    log::warn!("[client] SYN-ACK timeout, resending SYN");
                    self.socket.send(&syn, self.server).await?;
                }
            }
        };

        let ack = Packet::control(
            self.isn.wrapping_add(1),
            peer_seq.wrapping_add(1),
            flags::ACK,
        );
        self.socket.send(&ack, self.server).await?;
        self.state = ClientState::Established;
        log::info!("[client] → ACK, connection established");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Windowed transfer
    // -----------------------------------------------------------------------

    async fn transfer(&mut self) -> io::Result<()> {
        let mut rng = StdRng::from_entropy();
        let mut next_pkt = 1u32;

        while next_pkt <= self.config.total_packets || self.window.has_unacked() {
            // Fill the window with new packets while budget and capacity allow.
            while next_pkt <= self.config.total_packets {
                let size = rng.gen_range(self.config.payload_min..=self.config.payload_max);
                if !self.window.fits(size) {
                    break;
                }
                let start = self.window.record_sent(next_pkt, size, Instant::now());
                let pkt = Packet::data(start, next_pkt, data_payload(next_pkt, size as usize));
                self.socket.send(&pkt, self.server).await?;
                self.total_sent += 1;
                log::debug!(
                    "[client] → DATA pkt={} bytes {}..={} window {}/{}",
                    next_pkt,
                    start,
                    start + size - 1,
                    self.window.next_offset() - self.window.base(),
                    self.config.window_bytes
                );
                next_pkt += 1;
            }

            self.poll_acks().await?;
            self.retransmit_on_timeout().await?;
        }
        Ok(())
    }

    /// Wait up to `ack_poll` for one valid packet and apply its ACK.
    async fn poll_acks(&mut self) -> io::Result<()> {
        match timeout(self.config.ack_poll, self.recv_valid()).await {
            Ok(Ok(pkt)) => {
                if pkt.header.flags & flags::ACK != 0 {
                    self.handle_ack(pkt.header.ack);
                }
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_elapsed) => Ok(()),
        }
    }

    /// Apply a cumulative ACK: record RTT samples, adapt the timeout.
    fn handle_ack(&mut self, ack: u32) {
        let now = Instant::now();
        for (pkt_num, sample) in self.window.on_ack(ack, now) {
            self.report.record(pkt_num, sample);
            self.rtt.record_sample(sample);
            log::debug!(
                "[client] ← ACK covers pkt={} rtt={:.2}ms timeout={:?}",
                pkt_num,
                sample.as_secs_f64() * 1000.0,
                self.rtt.timeout()
            );
        }
    }

    /// Go-Back-N: when the oldest unacknowledged packet has waited longer
    /// than the adaptive timeout, resend every unacknowledged packet.
    async fn retransmit_on_timeout(&mut self) -> io::Result<()> {
        let Some(oldest) = self.window.oldest_unacked_sent_at() else {
            return Ok(());
        };
        if oldest.elapsed() < self.rtt.timeout() {
            return Ok(());
        }

        let pending: Vec<(u32, u32, u32)> = self
            .window
            .unacked()
            .map(|(num, info)| (num, info.start, info.size))
            .collect();
        log::warn!(
            "[client] timeout ({:?}) — retransmitting {} packet(s)",
            self.rtt.timeout(),
            pending.len()
        );
        for (num, start, size) in pending {
            let pkt = Packet::data(start, num, data_payload(num, size as usize));
            self.socket.send(&pkt, self.server).await?;
            self.total_sent += 1;
        }
        self.window.mark_retransmitted(Instant::now());
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Teardown
    // -----------------------------------------------------------------------

    async fn teardown(&mut self) -> io::Result<()> {
        let fin_seq = self.window.next_offset();
        let fin = Packet::control(fin_seq, 0, flags::FIN);
        self.socket.send(&fin, self.server).await?;
        self.state = ClientState::FinWait1;
        log::info!("[client] → FIN seq={fin_seq}");

        // Wait for the ACK of our FIN, resending on timeout.
        loop {
            match timeout(self.config.fin_ack_timeout, self.recv_valid()).await {
                Ok(Ok(pkt)) => {
                    if pkt.header.flags & flags::ACK != 0
                        && pkt.header.ack == fin_seq.wrapping_add(1)
                    {
                        log::info!("[client] ← ACK of FIN");
                        break;
                    }
                }
                Ok(Err(e)) => return Err(e),
                Err(_elapsed) => {
                    log::warn!("[client] FIN not acknowledged, resending");
                    self.socket.send(&fin, self.server).await?;
                }
            }
        }
        self.state = ClientState::FinWait2;

        // Wait for the peer's FIN.
        let peer_fin = loop {
            match timeout(self.config.peer_fin_timeout, self.recv_valid()).await {
                Ok(Ok(pkt)) if pkt.header.flags & flags::FIN != 0 => break pkt,
                Ok(Ok(_)) => {}
                Ok(Err(e)) => return Err(e),
                Err(_elapsed) => log::warn!("[client] still waiting for peer FIN"),
            }
        };
        log::info!("[client] ← FIN seq={}", peer_fin.header.seq);

        let last_ack = Packet::control(
            peer_fin.header.ack,
            peer_fin.header.seq.wrapping_add(1),
            flags::ACK,
        );
        self.socket.send(&last_ack, self.server).await?;
        self.state = ClientState::TimeWait;
        log::info!("[client] → final ACK, lingering {:?}", self.config.linger);

        // The peer's FIN may be retransmitted if our final ACK was lost;
        // stay reachable and answer it again until the linger expires.
        let mut deadline = Instant::now() + self.config.linger;
        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            match timeout(deadline - now, self.recv_valid()).await {
                Ok(Ok(pkt)) if pkt.header.flags & flags::FIN != 0 => {
                    log::info!("[client] ← duplicate FIN, resending final ACK");
                    let ack = Packet::control(
                        pkt.header.ack,
                        pkt.header.seq.wrapping_add(1),
                        flags::ACK,
                    );
                    self.socket.send(&ack, self.server).await?;
                    deadline = Instant::now() + self.config.linger;
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => return Err(e),
                Err(_elapsed) => break,
            }
        }

        self.state = ClientState::Closed;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Receive the next checksum-valid packet from the server.
    ///
    /// Datagrams from other peers and frames that fail to decode are
    /// silently discarded; callers bound this with a timeout.
    async fn recv_valid(&self) -> io::Result<Packet> {
        loop {
            let (buf, addr) = self.socket.recv().await?;
            if addr != self.server {
                continue;
            }
            match Packet::decode(&buf) {
                Ok(pkt) => return Ok(pkt),
                Err(e) => log::debug!("[client] discarding bad frame: {e}"),
            }
        }
    }
}

/// Build a data payload: 4-byte big-endian packet number, zero-padded to
/// `size` bytes.
fn data_payload(pkt_num: u32, size: usize) -> Vec<u8> {
    let mut payload = vec![0u8; size];
    let tag = pkt_num.to_be_bytes();
    let n = size.min(tag.len());
    payload[..n].copy_from_slice(&tag[..n]);
    payload
}
